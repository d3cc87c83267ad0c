//! Behaviour against a real Postgres. Runs when `DATABASE_URL` is set and
//! is skipped otherwise. Tests work inside a transaction that is never
//! committed, except the request level rollback test which commits its own
//! user and deletes it again.

use std::{collections::BTreeSet, sync::Arc};

use chrono::{Duration, Utc};
use recipe_share::{
    actions::*,
    error::ApiError,
    form::{CategoryInput, CreateRatingInput, IngredientInput, RecipeIngredientInput, RecipeInput,
        RegisterRequest, TagInput, UpdateRatingInput},
    jwt::{SessionData, TokenService},
    pagination::PageRequest,
    routes::api,
    schema::{Id, RecipeView},
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};
use warp::http::StatusCode;

async fn database() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("DATABASE_URL is set but unreachable");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations failed");

    Some(pool)
}

fn tokens() -> TokenService {
    TokenService::new(b"database-secret", "RecipeApi", "RecipeApiUsers", Duration::days(7)).unwrap()
}

async fn user(name: &str, conn: &mut PgConnection) -> SessionData {
    let input = RegisterRequest {
        username: name.to_owned(),
        email: format!("{name}@example.com"),
        password: "correct horse".to_owned(),
    };
    let response = register_user(&input, &tokens(), conn).await.unwrap();

    SessionData {
        user_id: response.user.id,
        username: response.user.username,
        email: response.user.email,
    }
}

fn by_name(name: &str, unit: Option<&str>) -> RecipeIngredientInput {
    RecipeIngredientInput {
        ingredient_name: Some(name.to_owned()),
        quantity: Decimal::new(15, 1),
        unit: unit.map(str::to_owned),
        ..Default::default()
    }
}

fn by_id(id: Id) -> RecipeIngredientInput {
    RecipeIngredientInput {
        ingredient_id: Some(id),
        quantity: Decimal::new(2, 0),
        ..Default::default()
    }
}

fn recipe(title: &str, ingredients: Vec<RecipeIngredientInput>, tag_ids: Vec<Id>) -> RecipeInput {
    RecipeInput {
        title: title.to_owned(),
        instructions: "Combine and cook.".to_owned(),
        ingredients,
        tag_ids,
        ..Default::default()
    }
}

async fn tag(name: &str, conn: &mut PgConnection) -> Id {
    let input = TagInput {
        name: name.to_owned(),
        color: None,
    };
    create_tag(&input, conn).await.unwrap().id
}

fn ingredient_names(view: &RecipeView) -> BTreeSet<String> {
    view.ingredients
        .iter()
        .map(|part| part.ingredient_name.to_owned())
        .collect()
}

fn tag_names(view: &RecipeView) -> BTreeSet<String> {
    view.tags.iter().map(|tag| tag.name.to_owned()).collect()
}

async fn count(sql: &str, conn: &mut PgConnection) -> i64 {
    let row: (i64,) = sqlx::query_as(sql).fetch_one(&mut *conn).await.unwrap();
    row.0
}

#[tokio::test]
async fn average_rating_is_rounded_and_absent_without_ratings() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("avg_owner", &mut tr).await;
    let first = user("avg_first", &mut tr).await;
    let second = user("avg_second", &mut tr).await;

    let recipe = create_recipe(owner.user_id, &recipe("avg soup", vec![], vec![]), &mut tr)
        .await
        .unwrap();
    assert_eq!(recipe.average_rating, None);
    assert_eq!(recipe.rating_count, 0);

    let average = get_rating_average(recipe.id, &mut tr).await.unwrap();
    assert_eq!(average.average_rating, 0.0);
    assert_eq!(average.total_ratings, 0);

    for (rater, score) in [(&first, 4), (&second, 5)] {
        let input = CreateRatingInput {
            recipe_id: recipe.id,
            rating: score,
            review: None,
        };
        create_rating(rater.user_id, &input, &mut tr).await.unwrap();
    }

    let view = get_recipe_view(recipe.id, &mut tr).await.unwrap().unwrap();
    assert_eq!(view.average_rating, Some(4.5));
    assert_eq!(view.rating_count, 2);

    let average = get_rating_average(recipe.id, &mut tr).await.unwrap();
    assert_eq!(average.average_rating, 4.5);
    assert_eq!(average.total_ratings, 2);

    let ratings = list_recipe_ratings(recipe.id, &mut tr).await.unwrap();
    assert_eq!(ratings.len(), 2);
    assert!(ratings.iter().any(|r| r.username == "avg_first"));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    user("dup_carol", &mut tr).await;

    for (username, email) in [
        ("dup_carol", "other@example.com"),
        ("DUP_CAROL", "other@example.com"),
        ("dup_someone", "DUP_CAROL@example.com"),
    ] {
        let input = RegisterRequest {
            username: username.to_owned(),
            email: email.to_owned(),
            password: "pw".to_owned(),
        };
        let error = register_user(&input, &tokens(), &mut tr).await.unwrap_err();
        assert!(matches!(error, ApiError::Conflict(_)), "{username} / {email}");
    }

    let rows = count(
        "SELECT COUNT(*) FROM users WHERE LOWER(username) IN ('dup_carol', 'dup_someone')",
        &mut tr,
    )
    .await;
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn login_does_not_reveal_which_part_was_wrong() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    user("login_dave", &mut tr).await;

    let good = recipe_share::form::LoginRequest {
        username: "login_dave".to_owned(),
        password: "correct horse".to_owned(),
    };
    let response = login_user(&good, &tokens(), &mut tr).await.unwrap();
    assert_eq!(tokens().validate(&response.token).unwrap().username, "login_dave");

    let wrong_password = recipe_share::form::LoginRequest {
        password: "battery staple".to_owned(),
        ..good.clone()
    };
    let unknown_user = recipe_share::form::LoginRequest {
        username: "login_nobody".to_owned(),
        ..good
    };

    let a = login_user(&wrong_password, &tokens(), &mut tr).await.unwrap_err();
    let b = login_user(&unknown_user, &tokens(), &mut tr).await.unwrap_err();
    assert_eq!(a.message(), b.message());
    assert_eq!(a.status(), warp::http::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rating_twice_conflicts() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("twice_owner", &mut tr).await;
    let rater = user("twice_rater", &mut tr).await;
    let recipe = create_recipe(owner.user_id, &recipe("twice stew", vec![], vec![]), &mut tr)
        .await
        .unwrap();

    let input = CreateRatingInput {
        recipe_id: recipe.id,
        rating: 3,
        review: Some("fine".to_owned()),
    };
    create_rating(rater.user_id, &input, &mut tr).await.unwrap();
    let error = create_rating(rater.user_id, &input, &mut tr).await.unwrap_err();
    assert!(matches!(error, ApiError::Conflict(_)));

    let rows = count(
        &format!(
            "SELECT COUNT(*) FROM recipe_ratings WHERE recipe_id = {}",
            recipe.id
        ),
        &mut tr,
    )
    .await;
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn rating_changes_belong_to_the_rater() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("rchg_owner", &mut tr).await;
    let rater = user("rchg_rater", &mut tr).await;
    let recipe = create_recipe(owner.user_id, &recipe("rchg pie", vec![], vec![]), &mut tr)
        .await
        .unwrap();

    let input = CreateRatingInput {
        recipe_id: recipe.id,
        rating: 2,
        review: None,
    };
    let rating = create_rating(rater.user_id, &input, &mut tr).await.unwrap();

    let change = UpdateRatingInput {
        rating: 5,
        review: None,
    };
    let error = update_rating(rating.id, &owner, &change, &mut tr)
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::Forbidden(_)));
    let error = delete_rating(rating.id, &owner, &mut tr).await.unwrap_err();
    assert!(matches!(error, ApiError::Forbidden(_)));

    let updated = update_rating(rating.id, &rater, &change, &mut tr).await.unwrap();
    assert_eq!(updated.rating, 5);

    delete_rating(rating.id, &rater, &mut tr).await.unwrap();
    let error = delete_rating(rating.id, &rater, &mut tr).await.unwrap_err();
    assert!(matches!(error, ApiError::NotFound(_)));
}

#[tokio::test]
async fn referenced_entities_cannot_be_deleted() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("refdel_owner", &mut tr).await;
    let category = create_category(
        &CategoryInput {
            name: "refdel mains".to_owned(),
            description: None,
        },
        &mut tr,
    )
    .await
    .unwrap();
    let tag_id = tag("refdel-quick", &mut tr).await;

    let mut input = recipe(
        "refdel risotto",
        vec![by_name("refdel-saffron", Some("g"))],
        vec![tag_id],
    );
    input.category_id = Some(category.id);
    let recipe = create_recipe(owner.user_id, &input, &mut tr).await.unwrap();
    let ingredient_id = recipe.ingredients[0].ingredient_id;

    let error = delete_category(category.id, &mut tr).await.unwrap_err();
    assert_eq!(
        error.message(),
        "Cannot delete category that is being used by recipes"
    );
    let error = delete_ingredient(ingredient_id, &mut tr).await.unwrap_err();
    assert!(matches!(error, ApiError::Conflict(_)));
    let error = delete_tag(tag_id, &mut tr).await.unwrap_err();
    assert!(matches!(error, ApiError::Conflict(_)));

    assert!(get_category(category.id, &mut tr).await.unwrap().is_some());
    assert!(get_ingredient(ingredient_id, &mut tr).await.unwrap().is_some());
    assert!(get_tag(tag_id, &mut tr).await.unwrap().is_some());

    delete_recipe(recipe.id, &owner, &mut tr).await.unwrap();
    delete_tag(tag_id, &mut tr).await.unwrap();
    delete_ingredient(ingredient_id, &mut tr).await.unwrap();
    delete_category(category.id, &mut tr).await.unwrap();
}

#[tokio::test]
async fn non_owner_cannot_change_a_recipe() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("nonown_owner", &mut tr).await;
    let intruder = user("nonown_intruder", &mut tr).await;
    let tag_id = tag("nonown-tag", &mut tr).await;

    let original = create_recipe(
        owner.user_id,
        &recipe("nonown bread", vec![by_name("nonown-flour", None)], vec![tag_id]),
        &mut tr,
    )
    .await
    .unwrap();

    let error = update_recipe(
        original.id,
        &intruder,
        &recipe("stolen bread", vec![], vec![]),
        &mut tr,
    )
    .await
    .unwrap_err();
    assert!(matches!(error, ApiError::NotFound(_)));
    assert_eq!(
        error.message(),
        "Recipe not found or you don't have permission to update it"
    );

    let error = delete_recipe(original.id, &intruder, &mut tr)
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::NotFound(_)));

    let current = get_recipe_view(original.id, &mut tr).await.unwrap().unwrap();
    assert_eq!(current.title, "nonown bread");
    assert_eq!(ingredient_names(&current), ingredient_names(&original));
    assert_eq!(tag_names(&current), tag_names(&original));
}

#[tokio::test]
async fn owner_update_replaces_fields_and_links() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("upd_owner", &mut tr).await;
    let old_tag = tag("upd-old", &mut tr).await;
    let new_tag = tag("upd-new", &mut tr).await;

    let original = create_recipe(
        owner.user_id,
        &recipe("upd cake", vec![by_name("upd-butter", None)], vec![old_tag]),
        &mut tr,
    )
    .await
    .unwrap();

    let updated = update_recipe(
        original.id,
        &owner,
        &recipe("upd tart", vec![by_name("upd-cream", None)], vec![new_tag]),
        &mut tr,
    )
    .await
    .unwrap();

    assert_eq!(updated.title, "upd tart");
    assert_eq!(
        ingredient_names(&updated),
        BTreeSet::from(["upd-cream".to_owned()])
    );
    assert_eq!(tag_names(&updated), BTreeSet::from(["upd-new".to_owned()]));
}

#[tokio::test]
async fn created_recipe_reads_back_with_resolved_links() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("links_owner", &mut tr).await;
    let flour = create_ingredient(
        &IngredientInput {
            name: "links-flour".to_owned(),
            unit: Some("g".to_owned()),
        },
        &mut tr,
    )
    .await
    .unwrap();
    let sweet = tag("links-sweet", &mut tr).await;
    let baked = tag("links-baked", &mut tr).await;

    let created = create_recipe(
        owner.user_id,
        &recipe(
            "links cookies",
            vec![by_id(flour.id), by_name("links-sugar", Some("dl"))],
            vec![sweet, baked, sweet],
        ),
        &mut tr,
    )
    .await
    .unwrap();

    let fetched = get_recipe_view(created.id, &mut tr).await.unwrap().unwrap();
    let expected = BTreeSet::from(["links-flour".to_owned(), "links-sugar".to_owned()]);
    assert_eq!(ingredient_names(&created), expected);
    assert_eq!(ingredient_names(&fetched), expected);
    assert_eq!(fetched.tags.len(), 2);
    assert_eq!(
        tag_names(&fetched),
        BTreeSet::from(["links-baked".to_owned(), "links-sweet".to_owned()])
    );
    assert_eq!(fetched.user_name, "links_owner");

    let sugar = find_ingredient("LINKS-SUGAR", &mut tr).await.unwrap().unwrap();
    assert_eq!(sugar.unit.as_deref(), Some("dl"));
}

#[tokio::test]
async fn recipe_references_must_exist() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("refs_owner", &mut tr).await;

    let error = create_recipe(
        owner.user_id,
        &recipe("refs", vec![by_id(i32::MAX)], vec![]),
        &mut tr,
    )
    .await
    .unwrap_err();
    assert!(matches!(error, ApiError::NotFound(_)));

    let error = create_recipe(owner.user_id, &recipe("refs", vec![], vec![i32::MAX]), &mut tr)
        .await
        .unwrap_err();
    assert!(matches!(error, ApiError::NotFound(_)));

    let mut input = recipe("refs", vec![], vec![]);
    input.category_id = Some(i32::MAX);
    let error = create_recipe(owner.user_id, &input, &mut tr).await.unwrap_err();
    assert!(matches!(error, ApiError::NotFound(_)));

    let error = create_recipe(
        owner.user_id,
        &recipe(
            "refs",
            vec![by_name("refs-basil", None), by_name("Refs-Basil", None)],
            vec![],
        ),
        &mut tr,
    )
    .await
    .unwrap_err();
    assert!(matches!(error, ApiError::Validation(_)));
}

#[tokio::test]
async fn listing_searches_and_pages() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("list_owner", &mut tr).await;
    let mut ids = vec![];
    for n in 0..3 {
        let input = recipe(
            &format!("list-zz-soup {n}"),
            vec![by_name("list-zz-leek", None)],
            vec![],
        );
        ids.push(create_recipe(owner.user_id, &input, &mut tr).await.unwrap().id);
    }
    let other = recipe("list plain", vec![by_name("list-zz-turnip", None)], vec![]);
    create_recipe(owner.user_id, &other, &mut tr).await.unwrap();

    let filter = RecipeFilter {
        search_term: Some("LIST-ZZ-SOUP".to_owned()),
        ..Default::default()
    };
    let all = list_recipe_views(&filter, PageRequest::new(None, None), &mut tr)
        .await
        .unwrap();
    let found: Vec<Id> = all.iter().map(|view| view.id).collect();
    ids.reverse();
    assert_eq!(found, ids);

    let second_page = list_recipe_views(&filter, PageRequest::new(Some(2), Some(2)), &mut tr)
        .await
        .unwrap();
    assert_eq!(second_page.len(), 1);

    let by_ingredient = RecipeFilter {
        search_term: Some("zz-turnip".to_owned()),
        ..Default::default()
    };
    let found = list_recipe_views(&by_ingredient, PageRequest::default(), &mut tr)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].title, "list plain");

    let wildcard = RecipeFilter {
        search_term: Some("list_zz%".to_owned()),
        ..Default::default()
    };
    let found = list_recipe_views(&wildcard, PageRequest::default(), &mut tr)
        .await
        .unwrap();
    assert!(found.is_empty());

    let mine = list_user_recipes(owner.user_id, &mut tr).await.unwrap();
    assert_eq!(mine.len(), 4);
}

#[tokio::test]
async fn profile_updates_refuse_taken_names() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let erin = user("prof_erin", &mut tr).await;
    user("prof_frank", &mut tr).await;

    let input = recipe_share::form::UpdateUserInput {
        username: "PROF_FRANK".to_owned(),
        email: "erin@example.com".to_owned(),
    };
    let error = update_profile(erin.user_id, &input, &mut tr).await.unwrap_err();
    assert_eq!(error.message(), "Username is already taken");

    let input = recipe_share::form::UpdateUserInput {
        username: "prof_erin".to_owned(),
        email: "prof_frank@example.com".to_owned(),
    };
    let error = update_profile(erin.user_id, &input, &mut tr).await.unwrap_err();
    assert_eq!(error.message(), "Email is already taken");

    let input = recipe_share::form::UpdateUserInput {
        username: "prof_erin2".to_owned(),
        email: "prof_erin@example.com".to_owned(),
    };
    let profile = update_profile(erin.user_id, &input, &mut tr).await.unwrap();
    assert_eq!(profile.username, "prof_erin2");

    let public = get_public_user(erin.user_id, &mut tr).await.unwrap().unwrap();
    assert_eq!(public.username, "prof_erin2");
}

#[tokio::test]
async fn deleting_a_recipe_removes_its_ratings() {
    let Some(pool) = database().await else { return };
    let mut tr = pool.begin().await.unwrap();

    let owner = user("cascade_owner", &mut tr).await;
    let rater = user("cascade_rater", &mut tr).await;

    let recipe = create_recipe(
        owner.user_id,
        &recipe("cascade stew", vec![by_name("cascade-beans", None)], vec![]),
        &mut tr,
    )
    .await
    .unwrap();

    let input = CreateRatingInput {
        recipe_id: recipe.id,
        rating: 4,
        review: Some("Hearty".to_owned()),
    };
    let rating = create_rating(rater.user_id, &input, &mut tr).await.unwrap();

    delete_recipe(recipe.id, &owner, &mut tr).await.unwrap();

    assert!(get_recipe_view(recipe.id, &mut tr).await.unwrap().is_none());
    assert!(get_rating(rating.id, &mut tr).await.unwrap().is_none());

    let left: (i64, i64) = sqlx::query_as(
        "
        SELECT
            (SELECT COUNT(*) FROM recipe_ratings WHERE recipe_id = $1),
            (SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = $1)
    ",
    )
    .bind(recipe.id)
    .fetch_one(&mut *tr)
    .await
    .unwrap();
    assert_eq!(left, (0, 0));
}

async fn ingredients_named(name: &str, pool: &PgPool) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingredients WHERE LOWER(name) = LOWER($1)")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}

#[tokio::test]
async fn failed_recipe_writes_leave_no_rows_behind() {
    let Some(pool) = database().await else { return };
    let suffix = format!("{}{}", std::process::id(), Utc::now().timestamp_millis());
    let tokens = tokens();

    let mut tr = pool.begin().await.unwrap();
    let registered = register_user(
        &RegisterRequest {
            username: format!("rollback{suffix}"),
            email: format!("rollback{suffix}@example.com"),
            password: "correct horse".to_owned(),
        },
        &tokens,
        &mut tr,
    )
    .await
    .unwrap();
    tr.commit().await.unwrap();

    let app = api(pool.clone(), Arc::new(tokens), "http://localhost:5173");
    let bearer = format!("Bearer {}", registered.token);

    // The first line auto-creates the ingredient, the second resolves to it
    // again and fails the whole write.
    let stock = format!("Rollback stock {suffix}");
    let doubled = json!([
        { "ingredientName": stock, "quantity": 1 },
        { "ingredientName": stock.to_uppercase(), "quantity": 2 },
    ]);

    let response = warp::test::request()
        .method("POST")
        .path("/api/recipes")
        .header("authorization", bearer.as_str())
        .json(&json!({
            "title": "Rollback soup",
            "instructions": "Simmer.",
            "ingredients": doubled,
        }))
        .reply(&app)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ingredients_named(&stock, &pool).await, 0);

    let recipes: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE user_id = $1")
        .bind(registered.user.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(recipes.0, 0);

    let response = warp::test::request()
        .method("POST")
        .path("/api/recipes")
        .header("authorization", bearer.as_str())
        .json(&json!({ "title": "Rollback broth", "instructions": "Simmer." }))
        .reply(&app)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = serde_json::from_slice(response.body().as_ref()).unwrap();
    let id = created["id"].as_i64().unwrap();

    let response = warp::test::request()
        .method("PUT")
        .path(&format!("/api/recipes/{id}"))
        .header("authorization", bearer.as_str())
        .json(&json!({
            "title": "Renamed broth",
            "instructions": "Simmer longer.",
            "ingredients": doubled,
        }))
        .reply(&app)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ingredients_named(&stock, &pool).await, 0);

    let mut conn = pool.acquire().await.unwrap();
    let current = get_recipe_view(id as Id, &mut conn).await.unwrap().unwrap();
    assert_eq!(current.title, "Rollback broth");
    assert!(current.ingredients.is_empty());

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(registered.user.id)
        .execute(&mut *conn)
        .await
        .unwrap();
}
