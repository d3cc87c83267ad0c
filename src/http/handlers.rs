use std::{future::Future, sync::Arc};

use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use warp::{
    http::StatusCode,
    reject::Rejection,
    reply::{self, Reply},
};

use crate::{
    actions::{self, RecipeFilter},
    error::ApiError,
    form::{
        CategoryInput, CreateRatingInput, IngredientInput, LoginRequest, RecipeInput,
        RegisterRequest, TagInput, UpdateRatingInput, UpdateUserInput,
    },
    jwt::{SessionData, TokenService},
    pagination::PageRequest,
    schema::Id,
};

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct RecipeQuery {
    pub category_id: Option<Id>,
    pub search_term: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub search_term: Option<String>,
}

/// Runs a write on its own task. A client hanging up drops the handler
/// future but not the task, so the transaction always ends in a commit or a
/// rollback.
async fn detached<T, F>(task: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    tokio::spawn(task).await.map_err(|e| {
        log::error!("Write task did not finish: {e}");
        ApiError::Internal(format!("{e}"))
    })?
}

fn created<T: serde::Serialize>(value: &T) -> reply::WithStatus<reply::Json> {
    reply::with_status(reply::json(value), StatusCode::CREATED)
}

// Auth

pub async fn login(
    input: LoginRequest,
    tokens: Arc<TokenService>,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let response = actions::login_user(&input, &tokens, &mut conn).await?;

    Ok(reply::json(&response))
}

pub async fn register(
    input: RegisterRequest,
    tokens: Arc<TokenService>,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let response = detached(async move {
        let mut tr = pool.begin().await?;
        let response = actions::register_user(&input, &tokens, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(response)
    })
    .await?;

    Ok(reply::json(&response))
}

/// Tokens are stateless, the client forgets its own.
pub async fn logout() -> Result<impl Reply, Rejection> {
    Ok(reply::json(&json!({ "message": "Logged out" })))
}

// Recipes

pub async fn list_recipes(query: RecipeQuery, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;

    let filter = RecipeFilter {
        category_id: query.category_id,
        search_term: query.search_term,
        user_id: None,
    };
    let page = PageRequest::new(query.page, query.page_size);
    let list = actions::list_recipe_views(&filter, page, &mut conn).await?;

    Ok(reply::json(&list))
}

pub async fn get_recipe(id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let recipe = actions::get_recipe_view(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe not found"))?;

    Ok(reply::json(&recipe))
}

pub async fn my_recipes(session: SessionData, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let list = actions::list_user_recipes(session.user_id, &mut conn).await?;

    Ok(reply::json(&list))
}

pub async fn create_recipe(
    session: SessionData,
    input: RecipeInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let recipe = detached(async move {
        let mut tr = pool.begin().await?;
        let recipe = actions::create_recipe(session.user_id, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(recipe)
    })
    .await?;

    Ok(created(&recipe))
}

pub async fn update_recipe(
    id: Id,
    session: SessionData,
    input: RecipeInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let recipe = detached(async move {
        let mut tr = pool.begin().await?;
        let recipe = actions::update_recipe(id, &session, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(recipe)
    })
    .await?;

    Ok(reply::json(&recipe))
}

pub async fn delete_recipe(
    id: Id,
    session: SessionData,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    detached(async move {
        let mut tr = pool.begin().await?;
        actions::delete_recipe(id, &session, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// Categories

pub async fn list_categories(pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let list = actions::list_categories(&mut conn).await?;

    Ok(reply::json(&list))
}

pub async fn get_category(id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let category = actions::get_category(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    Ok(reply::json(&category))
}

pub async fn create_category(
    _session: SessionData,
    input: CategoryInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let category = detached(async move {
        let mut tr = pool.begin().await?;
        let category = actions::create_category(&input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(category)
    })
    .await?;

    Ok(created(&category))
}

pub async fn update_category(
    id: Id,
    _session: SessionData,
    input: CategoryInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let category = detached(async move {
        let mut tr = pool.begin().await?;
        let category = actions::update_category(id, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(category)
    })
    .await?;

    Ok(reply::json(&category))
}

pub async fn delete_category(
    id: Id,
    _session: SessionData,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    detached(async move {
        let mut tr = pool.begin().await?;
        actions::delete_category(id, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// Ingredients

pub async fn list_ingredients(query: SearchQuery, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let list = actions::list_ingredients(query.search_term.as_deref(), &mut conn).await?;

    Ok(reply::json(&list))
}

pub async fn get_ingredient(id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let ingredient = actions::get_ingredient(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Ingredient not found"))?;

    Ok(reply::json(&ingredient))
}

pub async fn create_ingredient(
    _session: SessionData,
    input: IngredientInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let ingredient = detached(async move {
        let mut tr = pool.begin().await?;
        let ingredient = actions::create_ingredient(&input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(ingredient)
    })
    .await?;

    Ok(created(&ingredient))
}

pub async fn update_ingredient(
    id: Id,
    _session: SessionData,
    input: IngredientInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let ingredient = detached(async move {
        let mut tr = pool.begin().await?;
        let ingredient = actions::update_ingredient(id, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(ingredient)
    })
    .await?;

    Ok(reply::json(&ingredient))
}

pub async fn delete_ingredient(
    id: Id,
    _session: SessionData,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    detached(async move {
        let mut tr = pool.begin().await?;
        actions::delete_ingredient(id, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// Tags

pub async fn list_tags(pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let list = actions::list_tags(&mut conn).await?;

    Ok(reply::json(&list))
}

pub async fn get_tag(id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let tag = actions::get_tag(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Tag not found"))?;

    Ok(reply::json(&tag))
}

pub async fn create_tag(
    _session: SessionData,
    input: TagInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let tag = detached(async move {
        let mut tr = pool.begin().await?;
        let tag = actions::create_tag(&input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(tag)
    })
    .await?;

    Ok(created(&tag))
}

pub async fn update_tag(
    id: Id,
    _session: SessionData,
    input: TagInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let tag = detached(async move {
        let mut tr = pool.begin().await?;
        let tag = actions::update_tag(id, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(tag)
    })
    .await?;

    Ok(reply::json(&tag))
}

pub async fn delete_tag(
    id: Id,
    _session: SessionData,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    detached(async move {
        let mut tr = pool.begin().await?;
        actions::delete_tag(id, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// Ratings

pub async fn list_ratings(recipe_id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let list = actions::list_recipe_ratings(recipe_id, &mut conn).await?;

    Ok(reply::json(&list))
}

pub async fn rating_average(recipe_id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let average = actions::get_rating_average(recipe_id, &mut conn).await?;

    Ok(reply::json(&average))
}

pub async fn create_rating(
    session: SessionData,
    input: CreateRatingInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let rating = detached(async move {
        let mut tr = pool.begin().await?;
        let rating = actions::create_rating(session.user_id, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(rating)
    })
    .await?;

    Ok(created(&rating))
}

pub async fn update_rating(
    id: Id,
    session: SessionData,
    input: UpdateRatingInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let rating = detached(async move {
        let mut tr = pool.begin().await?;
        let rating = actions::update_rating(id, &session, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(rating)
    })
    .await?;

    Ok(reply::json(&rating))
}

pub async fn delete_rating(
    id: Id,
    session: SessionData,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    detached(async move {
        let mut tr = pool.begin().await?;
        actions::delete_rating(id, &session, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

// Users

pub async fn get_profile(session: SessionData, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let profile = actions::get_profile(session.user_id, &mut conn).await?;

    Ok(reply::json(&profile))
}

pub async fn update_profile(
    session: SessionData,
    input: UpdateUserInput,
    pool: PgPool,
) -> Result<impl Reply, Rejection> {
    let profile = detached(async move {
        let mut tr = pool.begin().await?;
        let profile = actions::update_profile(session.user_id, &input, &mut tr).await?;
        tr.commit().await?;
        Ok::<_, ApiError>(profile)
    })
    .await?;

    Ok(reply::json(&profile))
}

pub async fn get_user(id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    let user = actions::get_public_user(id, &mut conn)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(reply::json(&user))
}

pub async fn get_user_recipes(id: Id, pool: PgPool) -> Result<impl Reply, Rejection> {
    let mut conn = pool.acquire().await.map_err(ApiError::from)?;
    if !actions::user_exists(id, &mut conn).await? {
        return Err(ApiError::not_found("User not found").into());
    }
    let list = actions::list_user_recipes(id, &mut conn).await?;

    Ok(reply::json(&list))
}
