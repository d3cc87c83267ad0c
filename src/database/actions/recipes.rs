use std::collections::HashMap;

use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::{
    error::{ApiError, QueryError},
    form::{search_pattern, RecipeIngredientInput, RecipeInput, Validate},
    jwt::SessionData,
    pagination::PageRequest,
    permissions::{ActionType, Resource},
    schema::{Id, LinkedRecipeTag, RecipePart, RecipeRow, RecipeView, Tag},
};

use super::{category_exists, find_ingredient, get_ingredient, insert_ingredient, missing_tags};

const RECIPE_VIEW_SELECT: &str = "
    SELECT r.id, r.title, r.description, r.instructions, r.prep_time_minutes,
        r.cook_time_minutes, r.servings, r.difficulty, r.image_url,
        r.user_id, u.username AS user_name, r.category_id, c.name AS category_name,
        r.created_at, r.updated_at,
        COALESCE(rt.rating_sum, 0) AS rating_sum,
        COALESCE(rt.rating_count, 0) AS rating_count
    FROM recipes r
    INNER JOIN users u ON u.id = r.user_id
    LEFT JOIN categories c ON c.id = r.category_id
    LEFT JOIN (
        SELECT recipe_id, SUM(rating)::BIGINT AS rating_sum, COUNT(*) AS rating_count
        FROM recipe_ratings
        GROUP BY recipe_id
    ) rt ON rt.recipe_id = r.id
";

const RECIPE_ORDER: &str = " ORDER BY r.created_at DESC, r.id DESC";

#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub category_id: Option<Id>,
    pub search_term: Option<String>,
    pub user_id: Option<Id>,
}

pub async fn recipe_exists(id: Id, conn: &mut PgConnection) -> Result<bool, ApiError> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM recipes WHERE id = $1)")
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row.0)
}

pub async fn get_recipe_view(id: Id, conn: &mut PgConnection) -> Result<Option<RecipeView>, ApiError> {
    let row: Option<RecipeRow> = sqlx::query_as(&format!("{RECIPE_VIEW_SELECT} WHERE r.id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    match row {
        Some(row) => Ok(compose_views(vec![row], conn).await?.pop()),
        None => Ok(None),
    }
}

/// Search matches the title, the description or any linked ingredient name.
pub async fn list_recipe_views(
    filter: &RecipeFilter,
    page: PageRequest,
    conn: &mut PgConnection,
) -> Result<Vec<RecipeView>, ApiError> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(RECIPE_VIEW_SELECT);
    query.push(" WHERE TRUE");

    if let Some(category_id) = filter.category_id {
        query.push(" AND r.category_id = ").push_bind(category_id);
    }
    if let Some(user_id) = filter.user_id {
        query.push(" AND r.user_id = ").push_bind(user_id);
    }
    if let Some(pattern) = search_pattern(filter.search_term.as_deref()) {
        query
            .push(" AND (r.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR r.description ILIKE ")
            .push_bind(pattern.clone())
            .push(
                " OR EXISTS(
                    SELECT 1 FROM recipe_ingredients ri
                    INNER JOIN ingredients i ON i.id = ri.ingredient_id
                    WHERE ri.recipe_id = r.id AND i.name ILIKE ",
            )
            .push_bind(pattern)
            .push("))");
    }

    query
        .push(RECIPE_ORDER)
        .push(" LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows: Vec<RecipeRow> = query
        .build_query_as::<RecipeRow>()
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    compose_views(rows, conn).await
}

pub async fn list_user_recipes(
    user_id: Id,
    conn: &mut PgConnection,
) -> Result<Vec<RecipeView>, ApiError> {
    let rows: Vec<RecipeRow> = sqlx::query_as(&format!(
        "{RECIPE_VIEW_SELECT} WHERE r.user_id = $1 {RECIPE_ORDER}"
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    compose_views(rows, conn).await
}

/// Loads the ingredient and tag links of every row in two queries and
/// attaches them in memory.
async fn compose_views(
    rows: Vec<RecipeRow>,
    conn: &mut PgConnection,
) -> Result<Vec<RecipeView>, ApiError> {
    if rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<Id> = rows.iter().map(|row| row.id).collect();

    let mut parts: HashMap<Id, Vec<RecipePart>> = HashMap::new();
    for part in list_recipe_parts(&ids, conn).await? {
        parts.entry(part.recipe_id).or_default().push(part);
    }

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    for tag in list_recipe_tags(&ids, conn).await? {
        tags.entry(tag.recipe_id).or_default().push(tag.into());
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let id = row.id;
            RecipeView::compose(
                row,
                parts.remove(&id).unwrap_or_default(),
                tags.remove(&id).unwrap_or_default(),
            )
        })
        .collect())
}

pub async fn list_recipe_parts(
    recipe_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<Vec<RecipePart>, ApiError> {
    let rows: Vec<RecipePart> = sqlx::query_as(
        "
        SELECT ri.recipe_id, ri.id, ri.ingredient_id, i.name AS ingredient_name,
            ri.quantity, ri.unit, ri.notes
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn list_recipe_tags(
    recipe_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<Vec<LinkedRecipeTag>, ApiError> {
    let rows: Vec<LinkedRecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.color
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name, t.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Keeps the first occurrence of every tag id.
fn unique_tag_ids(tag_ids: &[Id]) -> Vec<Id> {
    let mut unique = Vec::with_capacity(tag_ids.len());
    for id in tag_ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    unique
}

async fn check_references(
    input: &RecipeInput,
    tag_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    if let Some(category_id) = input.category_id {
        if !category_exists(category_id, conn).await? {
            return Err(ApiError::NotFound(format!(
                "Category with ID {category_id} not found"
            )));
        }
    }

    if let Some(missing) = missing_tags(tag_ids, conn).await?.first() {
        return Err(ApiError::NotFound(format!("Tag with ID {missing} not found")));
    }
    Ok(())
}

/// Finds the ingredient a line refers to. Unknown names are created with the
/// line's unit, unknown ids are an error.
async fn resolve_ingredient(
    line: &RecipeIngredientInput,
    conn: &mut PgConnection,
) -> Result<Id, ApiError> {
    if let Some(id) = line.ingredient_id {
        return match get_ingredient(id, conn).await? {
            Some(ingredient) => Ok(ingredient.id),
            None => Err(ApiError::NotFound(format!("Ingredient with ID {id} not found"))),
        };
    }

    let name = line
        .ingredient_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ApiError::invalid(
                "ingredients",
                "Either ingredientId or ingredientName must be provided",
            )
        })?;

    match find_ingredient(name, conn).await? {
        Some(ingredient) => Ok(ingredient.id),
        None => Ok(insert_ingredient(name, line.unit.as_deref(), conn).await?.id),
    }
}

async fn resolve_ingredients<'a>(
    lines: &'a [RecipeIngredientInput],
    conn: &mut PgConnection,
) -> Result<Vec<(Id, &'a RecipeIngredientInput)>, ApiError> {
    let mut resolved: Vec<(Id, &RecipeIngredientInput)> = Vec::with_capacity(lines.len());

    for line in lines {
        let id = resolve_ingredient(line, conn).await?;
        if resolved.iter().any(|(seen, _)| *seen == id) {
            return Err(ApiError::invalid(
                "ingredients",
                "The same ingredient may not appear twice in one recipe",
            ));
        }
        resolved.push((id, line));
    }

    Ok(resolved)
}

async fn insert_links(
    recipe_id: Id,
    parts: &[(Id, &RecipeIngredientInput)],
    tag_ids: &[Id],
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    if !parts.is_empty() {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity, unit, notes) ",
        );
        query.push_values(parts, |mut row, (ingredient_id, line)| {
            row.push_bind(recipe_id)
                .push_bind(*ingredient_id)
                .push_bind(line.quantity)
                .push_bind(line.unit.clone())
                .push_bind(line.notes.clone());
        });

        query
            .build()
            .execute(&mut *conn)
            .await
            .map_err(QueryError::from)?;
    }

    if !tag_ids.is_empty() {
        sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) SELECT $1, UNNEST($2::INT[])")
            .bind(recipe_id)
            .bind(tag_ids)
            .execute(&mut *conn)
            .await
            .map_err(QueryError::from)?;
    }

    Ok(())
}

async fn composed(id: Id, conn: &mut PgConnection) -> Result<RecipeView, ApiError> {
    get_recipe_view(id, conn)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Recipe {id} vanished while composing")))
}

/// Runs on the caller's transaction; a failure part way leaves nothing behind
/// once the caller drops it.
pub async fn create_recipe(
    user_id: Id,
    input: &RecipeInput,
    conn: &mut PgConnection,
) -> Result<RecipeView, ApiError> {
    input.validate()?;

    let tag_ids = unique_tag_ids(&input.tag_ids);
    check_references(input, &tag_ids, conn).await?;
    let parts = resolve_ingredients(&input.ingredients, conn).await?;

    let id: (Id,) = sqlx::query_as(
        "
        INSERT INTO recipes (title, description, instructions, prep_time_minutes,
            cook_time_minutes, servings, difficulty, image_url, user_id, category_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
    ",
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.instructions)
    .bind(input.prep_time_minutes)
    .bind(input.cook_time_minutes)
    .bind(input.servings)
    .bind(input.difficulty)
    .bind(&input.image_url)
    .bind(user_id)
    .bind(input.category_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    insert_links(id.0, &parts, &tag_ids, conn).await?;
    log::info!("User {user_id} created recipe {}", id.0);

    composed(id.0, conn).await
}

/// Locks the recipe row until the caller's transaction ends.
async fn recipe_owner(id: Id, conn: &mut PgConnection) -> Result<Option<Id>, ApiError> {
    let row: Option<(Id,)> = sqlx::query_as("SELECT user_id FROM recipes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row.map(|r| r.0))
}

/// Replaces every field and both link sets.
pub async fn update_recipe(
    id: Id,
    session: &SessionData,
    input: &RecipeInput,
    conn: &mut PgConnection,
) -> Result<RecipeView, ApiError> {
    input.validate()?;

    let owner = recipe_owner(id, conn).await?;
    session.authorize(Resource::Recipe, ActionType::Update, owner)?;

    let tag_ids = unique_tag_ids(&input.tag_ids);
    check_references(input, &tag_ids, conn).await?;
    let parts = resolve_ingredients(&input.ingredients, conn).await?;

    sqlx::query(
        "
        UPDATE recipes
        SET title = $1, description = $2, instructions = $3, prep_time_minutes = $4,
            cook_time_minutes = $5, servings = $6, difficulty = $7, image_url = $8,
            category_id = $9, updated_at = NOW()
        WHERE id = $10
    ",
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(&input.instructions)
    .bind(input.prep_time_minutes)
    .bind(input.cook_time_minutes)
    .bind(input.servings)
    .bind(input.difficulty)
    .bind(&input.image_url)
    .bind(input.category_id)
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    insert_links(id, &parts, &tag_ids, conn).await?;

    composed(id, conn).await
}

pub async fn delete_recipe(
    id: Id,
    session: &SessionData,
    conn: &mut PgConnection,
) -> Result<(), ApiError> {
    let owner = recipe_owner(id, conn).await?;
    session.authorize(Resource::Recipe, ActionType::Delete, owner)?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    log::info!("User {} deleted recipe {id}", session.user_id);
    Ok(())
}
