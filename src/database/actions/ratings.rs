use sqlx::PgConnection;

use crate::{
    error::{ApiError, QueryError},
    form::{CreateRatingInput, UpdateRatingInput, Validate},
    jwt::SessionData,
    permissions::{ActionType, Resource},
    schema::{Id, RatingAverage, RatingSummary, RatingView},
};

use super::recipe_exists;

const RATING_VIEW_SELECT: &str = "
    SELECT r.id, r.recipe_id, r.user_id, u.username, r.rating, r.review, r.created_at
    FROM recipe_ratings r
    INNER JOIN users u ON u.id = r.user_id
";

pub async fn list_recipe_ratings(
    recipe_id: Id,
    conn: &mut PgConnection,
) -> Result<Vec<RatingView>, ApiError> {
    let list: Vec<RatingView> = sqlx::query_as(&format!(
        "{RATING_VIEW_SELECT} WHERE r.recipe_id = $1 ORDER BY r.created_at DESC, r.id DESC"
    ))
    .bind(recipe_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(list)
}

pub async fn get_rating(id: Id, conn: &mut PgConnection) -> Result<Option<RatingView>, ApiError> {
    let row: Option<RatingView> =
        sqlx::query_as(&format!("{RATING_VIEW_SELECT} WHERE r.id = $1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

/// A recipe without ratings averages to 0 here, unlike the recipe view.
pub async fn get_rating_average(
    recipe_id: Id,
    conn: &mut PgConnection,
) -> Result<RatingAverage, ApiError> {
    let totals: (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(rating), 0)::BIGINT, COUNT(*) FROM recipe_ratings WHERE recipe_id = $1",
    )
    .bind(recipe_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    let summary = RatingSummary::from_totals(totals.0, totals.1);

    Ok(RatingAverage {
        recipe_id,
        average_rating: summary.average.unwrap_or(0.0),
        total_ratings: summary.count,
    })
}

pub async fn create_rating(
    user_id: Id,
    input: &CreateRatingInput,
    conn: &mut PgConnection,
) -> Result<RatingView, ApiError> {
    input.validate()?;

    if !recipe_exists(input.recipe_id, conn).await? {
        return Err(ApiError::not_found("Recipe not found"));
    }

    let duplicate = "You have already rated this recipe. Use PUT to update your rating.";
    let already_rated: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM recipe_ratings WHERE recipe_id = $1 AND user_id = $2)",
    )
    .bind(input.recipe_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;
    if already_rated.0 {
        return Err(ApiError::conflict(duplicate));
    }

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipe_ratings (recipe_id, user_id, rating, review)
        VALUES ($1, $2, $3, $4)
        RETURNING id
    ",
    )
    .bind(input.recipe_id)
    .bind(user_id)
    .bind(input.rating)
    .bind(&input.review)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).with_conflict(duplicate))?;

    get_rating(id.0, conn)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Rating {} vanished after insert", id.0)))
}

async fn rating_owner(id: Id, conn: &mut PgConnection) -> Result<Option<Id>, ApiError> {
    let row: Option<(Id,)> =
        sqlx::query_as("SELECT user_id FROM recipe_ratings WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row.map(|r| r.0))
}

pub async fn update_rating(
    id: Id,
    session: &SessionData,
    input: &UpdateRatingInput,
    conn: &mut PgConnection,
) -> Result<RatingView, ApiError> {
    input.validate()?;

    let owner = rating_owner(id, conn).await?;
    session.authorize(Resource::Rating, ActionType::Update, owner)?;

    sqlx::query("UPDATE recipe_ratings SET rating = $1, review = $2 WHERE id = $3")
        .bind(input.rating)
        .bind(&input.review)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    get_rating(id, conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Rating not found"))
}

pub async fn delete_rating(
    id: Id,
    session: &SessionData,
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    let owner = rating_owner(id, conn).await?;
    session.authorize(Resource::Rating, ActionType::Delete, owner)?;

    sqlx::query("DELETE FROM recipe_ratings WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}
