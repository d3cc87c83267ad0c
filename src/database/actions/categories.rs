use sqlx::PgConnection;

use crate::{
    error::{ApiError, QueryError},
    form::{CategoryInput, Validate},
    schema::{Category, Id},
};

pub async fn list_categories(conn: &mut PgConnection) -> Result<Vec<Category>, ApiError> {
    let list: Vec<Category> =
        sqlx::query_as("SELECT id, name, description FROM categories ORDER BY name, id")
            .fetch_all(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_category(id: Id, conn: &mut PgConnection) -> Result<Option<Category>, ApiError> {
    let row: Option<Category> =
        sqlx::query_as("SELECT id, name, description FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn category_exists(id: Id, conn: &mut PgConnection) -> Result<bool, ApiError> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row.0)
}

pub async fn create_category(
    input: &CategoryInput,
    conn: &mut PgConnection,
) -> Result<Category, ApiError> {
    input.validate()?;

    let row: Category = sqlx::query_as(
        "
        INSERT INTO categories (name, description)
        VALUES ($1, $2)
        RETURNING id, name, description
    ",
    )
    .bind(&input.name)
    .bind(&input.description)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn update_category(
    id: Id,
    input: &CategoryInput,
    conn: &mut PgConnection,
) -> Result<Category, ApiError> {
    input.validate()?;

    let row: Option<Category> = sqlx::query_as(
        "
        UPDATE categories SET name = $1, description = $2
        WHERE id = $3
        RETURNING id, name, description
    ",
    )
    .bind(&input.name)
    .bind(&input.description)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    row.ok_or_else(|| ApiError::not_found("Category not found"))
}

/// Categories still referenced by a recipe are never deleted.
pub async fn delete_category(id: Id, conn: &mut PgConnection) -> Result<(), ApiError> {
    let in_use: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM recipes WHERE category_id = $1)")
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    if in_use.0 {
        return Err(ApiError::conflict(
            "Cannot delete category that is being used by recipes",
        ));
    }

    let query = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(ApiError::not_found("Category not found"));
    }
    Ok(())
}
