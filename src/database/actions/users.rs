use sqlx::PgConnection;

use crate::{
    authentication::cryptography::{hash_password, verify_password},
    error::{ApiError, QueryError},
    form::{LoginRequest, RegisterRequest, UpdateUserInput, Validate},
    jwt::{AuthError, TokenService},
    schema::{AuthResponse, Id, PublicUser, User, UserView},
};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";

pub async fn get_user(username: &str, conn: &mut PgConnection) -> Result<Option<User>, ApiError> {
    let row: Option<User> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_id(user_id: Id, conn: &mut PgConnection) -> Result<Option<User>, ApiError> {
    let row: Option<User> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn user_exists(user_id: Id, conn: &mut PgConnection) -> Result<bool, ApiError> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(row.0)
}

/// Creates the user and signs them in. Only the password hash is stored.
pub async fn register_user(
    input: &RegisterRequest,
    tokens: &TokenService,
    conn: &mut PgConnection,
) -> Result<AuthResponse, ApiError> {
    input.validate()?;

    let taken: (bool,) = sqlx::query_as(
        "
        SELECT EXISTS(
            SELECT 1 FROM users
            WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($2)
        )
    ",
    )
    .bind(&input.username)
    .bind(&input.email)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    if taken.0 {
        return Err(ApiError::conflict("Username or email already exists"));
    }

    let password_hash = hash_password(&input.password)?;

    let user: User = sqlx::query_as(&format!(
        "
        INSERT INTO users (username, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING {USER_COLUMNS}
    "
    ))
    .bind(&input.username)
    .bind(&input.email)
    .bind(password_hash)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).with_conflict("Username or email already exists"))?;

    log::info!("Registered user {} ({})", user.username, user.id);

    Ok(AuthResponse {
        token: tokens.issue(&user)?,
        user: UserView::from(&user),
    })
}

/// Unknown usernames and wrong passwords are indistinguishable to the caller.
pub async fn login_user(
    input: &LoginRequest,
    tokens: &TokenService,
    conn: &mut PgConnection,
) -> Result<AuthResponse, ApiError> {
    input.validate()?;

    let Some(user) = get_user(&input.username, conn).await? else {
        return Err(AuthError::InvalidCredentials.into());
    };

    if !verify_password(&input.password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }

    Ok(AuthResponse {
        token: tokens.issue(&user)?,
        user: UserView::from(&user),
    })
}

pub async fn get_profile(user_id: Id, conn: &mut PgConnection) -> Result<UserView, ApiError> {
    get_user_by_id(user_id, conn)
        .await?
        .map(|user| UserView::from(&user))
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub async fn update_profile(
    user_id: Id,
    input: &UpdateUserInput,
    conn: &mut PgConnection,
) -> Result<UserView, ApiError> {
    input.validate()?;

    let username_taken: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = LOWER($1) AND id <> $2)",
    )
    .bind(&input.username)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;
    if username_taken.0 {
        return Err(ApiError::conflict("Username is already taken"));
    }

    let email_taken: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND id <> $2)",
    )
    .bind(&input.email)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(QueryError::from)?;
    if email_taken.0 {
        return Err(ApiError::conflict("Email is already taken"));
    }

    let user: Option<User> = sqlx::query_as(&format!(
        "
        UPDATE users
        SET username = $1, email = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING {USER_COLUMNS}
    "
    ))
    .bind(&input.username)
    .bind(&input.email)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| QueryError::from(e).with_conflict("Username or email is already taken"))?;

    user.map(|user| UserView::from(&user))
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub async fn get_public_user(
    user_id: Id,
    conn: &mut PgConnection,
) -> Result<Option<PublicUser>, ApiError> {
    let row: Option<PublicUser> =
        sqlx::query_as("SELECT id, username, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}
