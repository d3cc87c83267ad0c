use std::{convert::Infallible, sync::Arc};

use serde::de::DeserializeOwned;
use sqlx::PgPool;
use warp::{http::Method, reject::Rejection, reply::Reply, Filter};

use crate::{
    form::Validate,
    handlers::{self, RecipeQuery, SearchQuery},
    jwt::TokenService,
    middleware::with_session,
    rejection::handle_rejection,
    schema::Id,
};

const JSON_BODY_LIMIT: u64 = 64 * 1024;

fn with_pool(pool: PgPool) -> impl Filter<Extract = (PgPool,), Error = Infallible> + Clone {
    warp::any().map(move || pool.clone())
}

fn with_tokens(
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (Arc<TokenService>,), Error = Infallible> + Clone {
    warp::any().map(move || tokens.clone())
}

/// Deserializes and validates the body, so malformed input is rejected
/// before a connection is taken from the pool.
fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    warp::body::content_length_limit(JSON_BODY_LIMIT)
        .and(warp::body::json())
        .and_then(|body: T| async move {
            body.validate()?;
            Ok::<_, Rejection>(body)
        })
}

/// The whole `/api` tree with rejection rendering, CORS and request logging.
pub fn api(
    pool: PgPool,
    tokens: Arc<TokenService>,
    cors_origin: &str,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let cors = warp::cors()
        .allow_origin(cors_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(["authorization", "content-type"]);

    warp::path("api")
        .and(
            auth(pool.clone(), tokens.clone())
                .or(recipes(pool.clone(), tokens.clone()))
                .or(categories(pool.clone(), tokens.clone()))
                .or(ingredients(pool.clone(), tokens.clone()))
                .or(tags(pool.clone(), tokens.clone()))
                .or(ratings(pool.clone(), tokens.clone()))
                .or(users(pool, tokens)),
        )
        .recover(handle_rejection)
        .with(cors)
        .with(warp::log("recipe_share::http"))
}

fn auth(
    pool: PgPool,
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_tokens(tokens.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::login);

    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(json_body())
        .and(with_tokens(tokens))
        .and(with_pool(pool))
        .and_then(handlers::register);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and_then(handlers::logout);

    login.or(register).or(logout)
}

fn recipes(
    pool: PgPool,
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("recipes")
        .and(warp::get())
        .and(warp::query::<RecipeQuery>())
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_recipes);

    let mine = warp::path!("recipes" / "my-recipes")
        .and(warp::get())
        .and(with_session(tokens.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::my_recipes);

    let get = warp::path!("recipes" / Id)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_recipe);

    let create = warp::path!("recipes")
        .and(warp::post())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::create_recipe);

    let update = warp::path!("recipes" / Id)
        .and(warp::put())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::update_recipe);

    let delete = warp::path!("recipes" / Id)
        .and(warp::delete())
        .and(with_session(tokens))
        .and(with_pool(pool))
        .and_then(handlers::delete_recipe);

    list.or(mine).or(get).or(create).or(update).or(delete)
}

fn categories(
    pool: PgPool,
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("categories")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_categories);

    let get = warp::path!("categories" / Id)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_category);

    let create = warp::path!("categories")
        .and(warp::post())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::create_category);

    let update = warp::path!("categories" / Id)
        .and(warp::put())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::update_category);

    let delete = warp::path!("categories" / Id)
        .and(warp::delete())
        .and(with_session(tokens))
        .and(with_pool(pool))
        .and_then(handlers::delete_category);

    list.or(get).or(create).or(update).or(delete)
}

fn ingredients(
    pool: PgPool,
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("ingredients")
        .and(warp::get())
        .and(warp::query::<SearchQuery>())
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_ingredients);

    let get = warp::path!("ingredients" / Id)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_ingredient);

    let create = warp::path!("ingredients")
        .and(warp::post())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::create_ingredient);

    let update = warp::path!("ingredients" / Id)
        .and(warp::put())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::update_ingredient);

    let delete = warp::path!("ingredients" / Id)
        .and(warp::delete())
        .and(with_session(tokens))
        .and(with_pool(pool))
        .and_then(handlers::delete_ingredient);

    list.or(get).or(create).or(update).or(delete)
}

fn tags(
    pool: PgPool,
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("tags")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_tags);

    let get = warp::path!("tags" / Id)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_tag);

    let create = warp::path!("tags")
        .and(warp::post())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::create_tag);

    let update = warp::path!("tags" / Id)
        .and(warp::put())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::update_tag);

    let delete = warp::path!("tags" / Id)
        .and(warp::delete())
        .and(with_session(tokens))
        .and(with_pool(pool))
        .and_then(handlers::delete_tag);

    list.or(get).or(create).or(update).or(delete)
}

fn ratings(
    pool: PgPool,
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list = warp::path!("ratings" / "recipe" / Id)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::list_ratings);

    let average = warp::path!("ratings" / "recipe" / Id / "average")
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::rating_average);

    let create = warp::path!("ratings")
        .and(warp::post())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::create_rating);

    let update = warp::path!("ratings" / Id)
        .and(warp::put())
        .and(with_session(tokens.clone()))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::update_rating);

    let delete = warp::path!("ratings" / Id)
        .and(warp::delete())
        .and(with_session(tokens))
        .and(with_pool(pool))
        .and_then(handlers::delete_rating);

    list.or(average).or(create).or(update).or(delete)
}

fn users(
    pool: PgPool,
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let profile = warp::path!("users" / "profile")
        .and(warp::get())
        .and(with_session(tokens.clone()))
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_profile);

    let update_profile = warp::path!("users" / "profile")
        .and(warp::put())
        .and(with_session(tokens))
        .and(json_body())
        .and(with_pool(pool.clone()))
        .and_then(handlers::update_profile);

    let get = warp::path!("users" / Id)
        .and(warp::get())
        .and(with_pool(pool.clone()))
        .and_then(handlers::get_user);

    let recipes = warp::path!("users" / Id / "recipes")
        .and(warp::get())
        .and(with_pool(pool))
        .and_then(handlers::get_user_recipes);

    profile.or(update_profile).or(get).or(recipes)
}
