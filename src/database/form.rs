use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    constants::*,
    error::{ApiError, ValidationErrors},
    schema::{Difficulty, Id},
};

/// Request bodies check themselves before any database work starts.
pub trait Validate {
    fn validate(&self) -> Result<(), ApiError>;
}

/// Collects field errors for one request body.
#[derive(Default)]
pub struct Form {
    errors: ValidationErrors,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(&mut self, key: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.add(key, format!("The {key} field is required."));
        }
        self
    }

    pub fn max_length(&mut self, key: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(value) = value {
            if value.chars().count() > max {
                self.errors.add(
                    key,
                    format!("The field {key} must be a string with a maximum length of {max}."),
                );
            }
        }
        self
    }

    pub fn range(&mut self, key: &str, value: Option<i32>, min: i32, max: i32) -> &mut Self {
        if let Some(value) = value {
            if value < min || value > max {
                self.errors
                    .add(key, format!("The field {key} must be between {min} and {max}."));
            }
        }
        self
    }

    pub fn email(&mut self, key: &str, value: &str) -> &mut Self {
        if !value.trim().is_empty() && !is_email(value) {
            self.errors
                .add(key, format!("The {key} field is not a valid e-mail address."));
        }
        self
    }

    pub fn check(&mut self, key: &str, ok: bool, info: &str) -> &mut Self {
        if !ok {
            self.errors.add(key, info.to_owned());
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ApiError> {
        std::mem::take(&mut self.errors).into_result()
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

/// Turns a free text search term into an `ILIKE` substring pattern. Returns
/// `None` for blank terms so callers can skip the filter.
pub fn search_pattern(term: Option<&str>) -> Option<String> {
    let term = term?.trim();
    if term.is_empty() {
        return None;
    }

    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .required("username", &self.username)
            .required("password", &self.password)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .required("username", &self.username)
            .max_length("username", Some(&self.username), USERNAME_MAX_LENGTH)
            .required("email", &self.email)
            .email("email", &self.email)
            .max_length("email", Some(&self.email), EMAIL_MAX_LENGTH)
            .required("password", &self.password)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateUserInput {
    pub username: String,
    pub email: String,
}

impl Validate for UpdateUserInput {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .required("username", &self.username)
            .max_length("username", Some(&self.username), USERNAME_MAX_LENGTH)
            .required("email", &self.email)
            .email("email", &self.email)
            .max_length("email", Some(&self.email), EMAIL_MAX_LENGTH)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryInput {
    pub name: String,
    pub description: Option<String>,
}

impl Validate for CategoryInput {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .required("name", &self.name)
            .max_length("name", Some(&self.name), CATEGORY_NAME_MAX_LENGTH)
            .max_length(
                "description",
                self.description.as_deref(),
                CATEGORY_DESCRIPTION_MAX_LENGTH,
            )
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct IngredientInput {
    pub name: String,
    pub unit: Option<String>,
}

impl Validate for IngredientInput {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .required("name", &self.name)
            .max_length("name", Some(&self.name), INGREDIENT_NAME_MAX_LENGTH)
            .max_length("unit", self.unit.as_deref(), UNIT_MAX_LENGTH)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TagInput {
    pub name: String,
    pub color: Option<String>,
}

impl Validate for TagInput {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .required("name", &self.name)
            .max_length("name", Some(&self.name), TAG_NAME_MAX_LENGTH)
            .max_length("color", self.color.as_deref(), TAG_COLOR_MAX_LENGTH)
            .finish()
    }
}

impl TagInput {
    pub fn color_or_default(&self) -> String {
        match self.color.as_deref() {
            Some(color) if !color.trim().is_empty() => color.to_owned(),
            _ => DEFAULT_TAG_COLOR.to_owned(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRatingInput {
    pub recipe_id: Id,
    pub rating: i32,
    pub review: Option<String>,
}

impl Validate for CreateRatingInput {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .check("recipeId", self.recipe_id > 0, "The recipeId field is required.")
            .range("rating", Some(self.rating), MIN_RATING, MAX_RATING)
            .max_length("review", self.review.as_deref(), REVIEW_MAX_LENGTH)
            .finish()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateRatingInput {
    pub rating: i32,
    pub review: Option<String>,
}

impl Validate for UpdateRatingInput {
    fn validate(&self) -> Result<(), ApiError> {
        Form::new()
            .range("rating", Some(self.rating), MIN_RATING, MAX_RATING)
            .max_length("review", self.review.as_deref(), REVIEW_MAX_LENGTH)
            .finish()
    }
}

/// One ingredient line of a recipe. The ingredient is named either by id or
/// by name; an id wins when both are present.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeIngredientInput {
    pub ingredient_id: Option<Id>,
    pub ingredient_name: Option<String>,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub notes: Option<String>,
}

impl RecipeIngredientInput {
    pub fn names_ingredient(&self) -> bool {
        self.ingredient_id.is_some()
            || self
                .ingredient_name
                .as_deref()
                .is_some_and(|name| !name.trim().is_empty())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeInput {
    pub title: String,
    pub description: Option<String>,
    pub instructions: String,
    pub prep_time_minutes: Option<i32>,
    pub cook_time_minutes: Option<i32>,
    pub servings: Option<i32>,
    pub difficulty: Difficulty,
    pub image_url: Option<String>,
    pub category_id: Option<Id>,
    pub ingredients: Vec<RecipeIngredientInput>,
    pub tag_ids: Vec<Id>,
}

impl Validate for RecipeInput {
    fn validate(&self) -> Result<(), ApiError> {
        let mut form = Form::new();
        form.required("title", &self.title)
            .max_length("title", Some(&self.title), RECIPE_TITLE_MAX_LENGTH)
            .required("instructions", &self.instructions)
            .range("prepTimeMinutes", self.prep_time_minutes, 0, i32::MAX)
            .range("cookTimeMinutes", self.cook_time_minutes, 0, i32::MAX)
            .range("servings", self.servings, 1, i32::MAX)
            .max_length("imageUrl", self.image_url.as_deref(), IMAGE_URL_MAX_LENGTH);

        let max_quantity = Decimal::new(100_000_000, 0);
        for (i, line) in self.ingredients.iter().enumerate() {
            let key = format!("ingredients[{i}]");
            form.check(
                &key,
                line.names_ingredient(),
                "Either ingredientId or ingredientName must be provided",
            )
            .check(
                &format!("{key}.quantity"),
                !line.quantity.is_sign_negative() && line.quantity < max_quantity,
                "The quantity must be a non-negative number below 100000000.",
            )
            .max_length(
                &format!("{key}.ingredientName"),
                line.ingredient_name.as_deref(),
                INGREDIENT_NAME_MAX_LENGTH,
            )
            .max_length(&format!("{key}.unit"), line.unit.as_deref(), UNIT_MAX_LENGTH)
            .max_length(&format!("{key}.notes"), line.notes.as_deref(), NOTES_MAX_LENGTH);
        }

        form.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe() -> RecipeInput {
        serde_json::from_value(serde_json::json!({
            "title": "Pancakes",
            "instructions": "Mix and fry.",
            "difficulty": "Medium",
            "ingredients": [
                { "ingredientName": "Flour", "quantity": 2.5, "unit": "dl" },
                { "ingredientId": 4, "quantity": 1 }
            ],
            "tagIds": [1, 2]
        }))
        .unwrap()
    }

    fn fields(error: ApiError) -> Vec<String> {
        match error {
            ApiError::Validation(errors) => errors.errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn valid_recipe_passes() {
        let input = recipe();
        assert_eq!(input.difficulty, Difficulty::Medium);
        assert_eq!(input.ingredients[0].quantity, Decimal::new(25, 1));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn missing_required_recipe_fields() {
        let input: RecipeInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.difficulty, Difficulty::Easy);

        let fields = fields(input.validate().unwrap_err());
        assert!(fields.contains(&"title".to_owned()));
        assert!(fields.contains(&"instructions".to_owned()));
    }

    #[test]
    fn ingredient_line_must_name_an_ingredient() {
        let mut input = recipe();
        input.ingredients.push(RecipeIngredientInput {
            ingredient_name: Some("   ".to_owned()),
            ..Default::default()
        });

        assert_eq!(fields(input.validate().unwrap_err()), vec!["ingredients[2]"]);
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let mut input = recipe();
        input.ingredients[1].quantity = Decimal::new(-1, 0);

        assert_eq!(
            fields(input.validate().unwrap_err()),
            vec!["ingredients[1].quantity"]
        );
    }

    #[test]
    fn title_length_is_limited() {
        let mut input = recipe();
        input.title = "x".repeat(RECIPE_TITLE_MAX_LENGTH + 1);

        assert_eq!(fields(input.validate().unwrap_err()), vec!["title"]);
    }

    #[test]
    fn rating_must_be_between_one_and_five() {
        let input = CreateRatingInput {
            recipe_id: 1,
            rating: 6,
            review: None,
        };
        assert_eq!(fields(input.validate().unwrap_err()), vec!["rating"]);

        let input = UpdateRatingInput {
            rating: 0,
            review: None,
        };
        assert!(input.validate().is_err());

        let input = UpdateRatingInput {
            rating: 5,
            review: Some("Great".to_owned()),
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn registration_requires_a_plausible_email() {
        let input = RegisterRequest {
            username: "alice".to_owned(),
            email: "alice-at-example".to_owned(),
            password: "pw".to_owned(),
        };
        assert_eq!(fields(input.validate().unwrap_err()), vec!["email"]);

        let input = RegisterRequest {
            email: "alice@example.com".to_owned(),
            ..input
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn email_domain_needs_non_empty_labels() {
        for bad in ["a@b..c", "a@.b.c", "a@b.c.", "a@bc", "@b.c", "a@b@c.d", "a b@c.d"] {
            assert!(!is_email(bad), "{bad} accepted");
        }
        assert!(is_email("a@b.c"));
        assert!(is_email("first.last@mail.example.org"));
    }

    #[test]
    fn search_terms_are_escaped() {
        assert_eq!(search_pattern(Some("pasta")), Some("%pasta%".to_owned()));
        assert_eq!(search_pattern(Some(" 100% ")), Some("%100\\%%".to_owned()));
        assert_eq!(search_pattern(Some("a_b")), Some("%a\\_b%".to_owned()));
        assert_eq!(search_pattern(Some("   ")), None);
        assert_eq!(search_pattern(None), None);
    }

    #[test]
    fn tag_color_defaults() {
        let tag = TagInput {
            name: "Vegan".to_owned(),
            color: None,
        };
        assert_eq!(tag.color_or_default(), DEFAULT_TAG_COLOR);

        let tag = TagInput {
            name: "Vegan".to_owned(),
            color: Some("#00ff00".to_owned()),
        };
        assert_eq!(tag.color_or_default(), "#00ff00");
    }
}
