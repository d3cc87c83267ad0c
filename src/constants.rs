pub const RECIPE_COUNT_PER_PAGE: i64 = 10;
pub const MAX_RECIPE_COUNT_PER_PAGE: i64 = 100;

pub const DEFAULT_TAG_COLOR: &str = "#007bff";

pub const TOKEN_LIFETIME_DAYS: i64 = 7;
pub const DEFAULT_JWT_ISSUER: &str = "RecipeApi";
pub const DEFAULT_JWT_AUDIENCE: &str = "RecipeApiUsers";

// Column limits, mirrored by the migration
pub const USERNAME_MAX_LENGTH: usize = 50;
pub const EMAIL_MAX_LENGTH: usize = 100;
pub const CATEGORY_NAME_MAX_LENGTH: usize = 100;
pub const CATEGORY_DESCRIPTION_MAX_LENGTH: usize = 500;
pub const INGREDIENT_NAME_MAX_LENGTH: usize = 100;
pub const UNIT_MAX_LENGTH: usize = 20;
pub const NOTES_MAX_LENGTH: usize = 200;
pub const RECIPE_TITLE_MAX_LENGTH: usize = 200;
pub const IMAGE_URL_MAX_LENGTH: usize = 500;
pub const TAG_NAME_MAX_LENGTH: usize = 50;
pub const TAG_COLOR_MAX_LENGTH: usize = 7;
pub const REVIEW_MAX_LENGTH: usize = 1000;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;
