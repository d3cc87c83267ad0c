use sqlx::PgConnection;

use crate::{
    error::{ApiError, QueryError},
    form::{search_pattern, IngredientInput, Validate},
    schema::{Id, Ingredient},
};

pub async fn list_ingredients(
    search: Option<&str>,
    conn: &mut PgConnection,
) -> Result<Vec<Ingredient>, ApiError> {
    let list: Vec<Ingredient> = sqlx::query_as(
        "
        SELECT id, name, unit FROM ingredients
        WHERE $1::TEXT IS NULL OR name ILIKE $1
        ORDER BY name, id
    ",
    )
    .bind(search_pattern(search))
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_ingredient(
    id: Id,
    conn: &mut PgConnection,
) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> =
        sqlx::query_as("SELECT id, name, unit FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

/// Case-insensitive lookup by name.
pub async fn find_ingredient(
    name: &str,
    conn: &mut PgConnection,
) -> Result<Option<Ingredient>, ApiError> {
    let row: Option<Ingredient> =
        sqlx::query_as("SELECT id, name, unit FROM ingredients WHERE LOWER(name) = LOWER($1)")
            .bind(name.trim())
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

async fn name_taken(
    name: &str,
    except: Option<Id>,
    conn: &mut PgConnection,
) -> Result<bool, ApiError> {
    let row: (bool,) = sqlx::query_as(
        "
        SELECT EXISTS(
            SELECT 1 FROM ingredients
            WHERE LOWER(name) = LOWER($1) AND ($2::INT IS NULL OR id <> $2)
        )
    ",
    )
    .bind(name.trim())
    .bind(except)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(row.0)
}

pub async fn create_ingredient(
    input: &IngredientInput,
    conn: &mut PgConnection,
) -> Result<Ingredient, ApiError> {
    input.validate()?;

    if name_taken(&input.name, None, conn).await? {
        return Err(ApiError::conflict(
            "An ingredient with this name already exists",
        ));
    }

    insert_ingredient(&input.name, input.unit.as_deref(), conn).await
}

pub async fn insert_ingredient(
    name: &str,
    unit: Option<&str>,
    conn: &mut PgConnection,
) -> Result<Ingredient, ApiError> {
    let row: Ingredient = sqlx::query_as(
        "INSERT INTO ingredients (name, unit) VALUES ($1, $2) RETURNING id, name, unit",
    )
    .bind(name.trim())
    .bind(unit)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).with_conflict("An ingredient with this name already exists"))?;

    log::debug!("Created ingredient {} ({})", row.name, row.id);
    Ok(row)
}

pub async fn update_ingredient(
    id: Id,
    input: &IngredientInput,
    conn: &mut PgConnection,
) -> Result<Ingredient, ApiError> {
    input.validate()?;

    if name_taken(&input.name, Some(id), conn).await? {
        return Err(ApiError::conflict(
            "An ingredient with this name already exists",
        ));
    }

    let row: Option<Ingredient> = sqlx::query_as(
        "UPDATE ingredients SET name = $1, unit = $2 WHERE id = $3 RETURNING id, name, unit",
    )
    .bind(input.name.trim())
    .bind(&input.unit)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).with_conflict("An ingredient with this name already exists"))?;

    row.ok_or_else(|| ApiError::not_found("Ingredient not found"))
}

pub async fn delete_ingredient(id: Id, conn: &mut PgConnection) -> Result<(), ApiError> {
    let in_use: (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM recipe_ingredients WHERE ingredient_id = $1)")
            .bind(id)
            .fetch_one(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    if in_use.0 {
        return Err(ApiError::conflict(
            "Cannot delete ingredient that is being used by recipes",
        ));
    }

    let query = sqlx::query("DELETE FROM ingredients WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(ApiError::not_found("Ingredient not found"));
    }
    Ok(())
}
