use sqlx::PgConnection;

use crate::{
    error::{ApiError, QueryError},
    form::{TagInput, Validate},
    schema::{Id, Tag},
};

pub async fn list_tags(conn: &mut PgConnection) -> Result<Vec<Tag>, ApiError> {
    let list: Vec<Tag> = sqlx::query_as("SELECT id, name, color FROM tags ORDER BY name, id")
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_tag(id: Id, conn: &mut PgConnection) -> Result<Option<Tag>, ApiError> {
    let row: Option<Tag> = sqlx::query_as("SELECT id, name, color FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

/// Returns the ids of `ids` that have no tag row.
pub async fn missing_tags(ids: &[Id], conn: &mut PgConnection) -> Result<Vec<Id>, ApiError> {
    let found: Vec<(Id,)> = sqlx::query_as("SELECT id FROM tags WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(ids
        .iter()
        .filter(|id| !found.iter().any(|row| row.0 == **id))
        .copied()
        .collect())
}

async fn name_taken(
    name: &str,
    except: Option<Id>,
    conn: &mut PgConnection,
) -> Result<bool, ApiError> {
    let row: (bool,) = sqlx::query_as(
        "
        SELECT EXISTS(
            SELECT 1 FROM tags
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

pub async fn create_tag(input: &TagInput, conn: &mut PgConnection) -> Result<Tag, ApiError> {
    input.validate()?;

    if name_taken(&input.name, None, conn).await? {
        return Err(ApiError::conflict("A tag with this name already exists"));
    }

    let row: Tag =
        sqlx::query_as("INSERT INTO tags (name, color) VALUES ($1, $2) RETURNING id, name, color")
            .bind(input.name.trim())
            .bind(input.color_or_default())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| QueryError::from(e).with_conflict("A tag with this name already exists"))?;

    Ok(row)
}

pub async fn update_tag(id: Id, input: &TagInput, conn: &mut PgConnection) -> Result<Tag, ApiError> {
    input.validate()?;

    if name_taken(&input.name, Some(id), conn).await? {
        return Err(ApiError::conflict("A tag with this name already exists"));
    }

    let row: Option<Tag> = sqlx::query_as(
        "UPDATE tags SET name = $1, color = $2 WHERE id = $3 RETURNING id, name, color",
    )
    .bind(input.name.trim())
    .bind(input.color_or_default())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).with_conflict("A tag with this name already exists"))?;

    row.ok_or_else(|| ApiError::not_found("Tag not found"))
}

pub async fn delete_tag(id: Id, conn: &mut PgConnection) -> Result<(), ApiError> {
    let in_use: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM recipe_tags WHERE tag_id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    if in_use.0 {
        return Err(ApiError::conflict(
            "Cannot delete tag that is being used by recipes",
        ));
    }

    let query = sqlx::query("DELETE FROM tags WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(ApiError::not_found("Tag not found"));
    }
    Ok(())
}
