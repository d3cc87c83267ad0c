use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type Id = i32;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize,
)]
#[sqlx(type_name = "difficulty")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a user sees about themselves. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.to_owned(),
            email: user.email.to_owned(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
}

/// What everyone else sees about a user.
#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Id,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub unit: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
}

/// A recipe joined with its owner, category and rating totals.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RecipeRow {
    pub id: Id,
    pub title: String,
    pub description: Option<String>,
    pub instructions: String,
    pub prep_time_minutes: Option<i32>,
    pub cook_time_minutes: Option<i32>,
    pub servings: Option<i32>,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub user_id: Id,
    pub user_name: String,
    pub category_id: Option<Id>,
    pub category_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub rating_sum: i64,
    pub rating_count: i64,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipePart {
    #[serde(skip)]
    pub recipe_id: Id,
    pub id: Id,
    pub ingredient_id: Id,
    pub ingredient_name: String,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub notes: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct LinkedRecipeTag {
    pub recipe_id: Id,
    pub id: Id,
    pub name: String,
    pub color: String,
}

impl From<LinkedRecipeTag> for Tag {
    fn from(value: LinkedRecipeTag) -> Self {
        Self {
            id: value.id,
            name: value.name,
            color: value.color,
        }
    }
}

/// Ratings of one recipe reduced to what the recipe view shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
}

impl RatingSummary {
    /// Average is rounded to one decimal, halves to even. Computed on
    /// integer tenths so no NaN or float drift can reach the caller.
    pub fn from_totals(sum: i64, count: i64) -> Self {
        if count <= 0 {
            return Self {
                average: None,
                count: 0,
            };
        }

        let (quotient, remainder) = (sum * 10 / count, sum * 10 % count);
        let tenths = match (remainder * 2).cmp(&count) {
            Ordering::Greater => quotient + 1,
            Ordering::Equal if quotient % 2 != 0 => quotient + 1,
            _ => quotient,
        };

        Self {
            average: Some(tenths as f64 / 10.0),
            count,
        }
    }
}

/// The full read model of a recipe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeView {
    pub id: Id,
    pub title: String,
    pub description: Option<String>,
    pub instructions: String,
    pub prep_time_minutes: Option<i32>,
    pub cook_time_minutes: Option<i32>,
    pub servings: Option<i32>,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub user_id: Id,
    pub user_name: String,
    pub category_id: Option<Id>,
    pub category_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ingredients: Vec<RecipePart>,
    pub tags: Vec<Tag>,
    pub average_rating: Option<f64>,
    pub rating_count: i64,
}

impl RecipeView {
    pub fn compose(row: RecipeRow, ingredients: Vec<RecipePart>, tags: Vec<Tag>) -> Self {
        let rating = RatingSummary::from_totals(row.rating_sum, row.rating_count);

        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            instructions: row.instructions,
            prep_time_minutes: row.prep_time_minutes,
            cook_time_minutes: row.cook_time_minutes,
            servings: row.servings,
            difficulty: row.difficulty,
            image_url: row.image_url,
            user_id: row.user_id,
            user_name: row.user_name,
            category_id: row.category_id,
            category_name: row.category_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            ingredients,
            tags,
            average_rating: rating.average,
            rating_count: rating.count,
        }
    }
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingView {
    pub id: Id,
    pub recipe_id: Id,
    pub user_id: Id,
    pub username: String,
    pub rating: i32,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RatingAverage {
    pub recipe_id: Id,
    pub average_rating: f64,
    pub total_ratings: i64,
}
