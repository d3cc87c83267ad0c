use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use crate::error::ApiError;

use super::jwt::{AuthError, SessionData, TokenService};

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

pub fn with_session(
    tokens: Arc<TokenService>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let tokens = tokens.clone();
        async move {
            let header = header.ok_or(ApiError::Auth(AuthError::MissingToken))?;
            let token = bearer_token(&header).ok_or(ApiError::Auth(AuthError::MissingToken))?;

            tokens.validate(token).map_err(|e| {
                log::debug!("Rejected session: {e}");
                Rejection::from(ApiError::Auth(e))
            })
        }
    })
}
