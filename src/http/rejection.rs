use std::convert::Infallible;

use serde::Serialize;
use warp::{
    body::BodyDeserializeError,
    http::StatusCode,
    reject::{InvalidQuery, MethodNotAllowed, PayloadTooLarge, Rejection, UnsupportedMediaType},
    reply::{self, Reply},
};

use crate::error::{ApiError, FieldError};

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ErrorBody {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_owned(),
            errors: None,
        }
    }
}

impl From<&ApiError> for ErrorBody {
    fn from(value: &ApiError) -> Self {
        let errors = match value {
            ApiError::Validation(validation) => Some(validation.errors.to_owned()),
            _ => None,
        };

        Self {
            message: value.message(),
            errors,
        }
    }
}

/// Renders every rejection as `{message, errors?}`. Internal details only
/// reach the log.
pub async fn handle_rejection(rejection: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(e) = rejection.find::<ApiError>() {
        if let ApiError::Internal(info) = e {
            log::error!("Request failed: {info}");
        }
        (e.status(), ErrorBody::from(e))
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, ErrorBody::new("Resource not found"))
    } else if let Some(e) = rejection.find::<BodyDeserializeError>() {
        log::debug!("Invalid request body: {e}");
        (
            StatusCode::BAD_REQUEST,
            ErrorBody::new(&format!("Invalid request body: {e}")),
        )
    } else if rejection.find::<InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, ErrorBody::new("Invalid query string"))
    } else if rejection.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorBody::new("Expected a JSON body"),
        )
    } else if rejection.find::<PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorBody::new("Request body is too large"),
        )
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorBody::new("Method not allowed"),
        )
    } else {
        log::error!("Unhandled rejection: {rejection:?}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("An internal error occurred"),
        )
    };

    Ok(reply::with_status(reply::json(&body), status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::AuthError;

    #[test]
    fn validation_body_lists_fields() {
        let error = ApiError::invalid("title", "The title field is required.");
        let body = serde_json::to_value(ErrorBody::from(&error)).unwrap();

        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"][0]["field"], "title");
        assert_eq!(body["errors"][0]["errors"][0], "The title field is required.");
    }

    #[test]
    fn other_bodies_carry_only_a_message() {
        let body =
            serde_json::to_value(ErrorBody::from(&ApiError::Auth(AuthError::InvalidCredentials)))
                .unwrap();

        assert_eq!(body["message"], "Invalid username or password");
        assert!(body.get("errors").is_none());
    }
}
