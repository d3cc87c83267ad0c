use std::fmt::{self, Display};

use serde::Serialize;
use warp::{http::StatusCode, reject::Reject};

use crate::jwt::AuthError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, error: String) {
        match self.errors.iter_mut().find(|e| e.field == field) {
            Some(entry) => entry.errors.push(error),
            None => self.errors.push(FieldError {
                field: field.to_owned(),
                errors: vec![error],
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self
            .errors
            .iter()
            .map(|e| e.field.as_str())
            .collect::<Vec<&str>>()
            .join(", ");
        write!(f, "Validation failed ({fields})")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Forbidden(String),

    /// The detail is for the log only, it never reaches the response body.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(info: &str) -> Self {
        Self::NotFound(info.to_owned())
    }

    pub fn conflict(info: &str) -> Self {
        Self::Conflict(info.to_owned())
    }

    pub fn forbidden(info: &str) -> Self {
        Self::Forbidden(info.to_owned())
    }

    pub fn invalid(field: &str, info: &str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, info.to_owned());
        Self::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text that is safe to show to the caller.
    pub fn message(&self) -> String {
        match self {
            ApiError::Validation(_) => String::from("Validation failed"),
            ApiError::Internal(_) => String::from("An internal error occurred"),
            _ => self.to_string(),
        }
    }
}

impl Reject for ApiError {}

pub struct QueryError {
    info: String,
    kind: QueryErrorKind,
}

enum QueryErrorKind {
    RowNotFound,
    UniqueViolation,
    ForeignKeyViolation,
    Other,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self {
            info,
            kind: QueryErrorKind::Other,
        }
    }

    /// Reports a unique violation with a message the caller can act on.
    pub fn with_conflict(self, info: &str) -> ApiError {
        match self.kind {
            QueryErrorKind::UniqueViolation => {
                log::debug!("Unique violation: {}", self.info);
                ApiError::conflict(info)
            }
            _ => self.into(),
        }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::RowNotFound => Self {
                info: String::from("RowNotFound"),
                kind: QueryErrorKind::RowNotFound,
            },
            sqlx::Error::Database(e) if e.is_unique_violation() => Self {
                info: format!("{e}"),
                kind: QueryErrorKind::UniqueViolation,
            },
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => Self {
                info: format!("{e}"),
                kind: QueryErrorKind::ForeignKeyViolation,
            },
            sqlx::Error::PoolTimedOut => Self::new(String::from("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(String::from("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::new(String::from("Worker crashed")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(value: QueryError) -> Self {
        match value.kind {
            QueryErrorKind::RowNotFound => ApiError::not_found("Not found"),
            QueryErrorKind::UniqueViolation => {
                log::debug!("Unique violation: {}", value.info);
                ApiError::conflict("A conflicting entry already exists")
            }
            QueryErrorKind::ForeignKeyViolation => {
                log::debug!("Foreign key violation: {}", value.info);
                ApiError::conflict("Referenced entry does not exist or is still in use")
            }
            QueryErrorKind::Other => {
                log::error!("Query failed: {}", value.info);
                ApiError::Internal(value.info)
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(value: sqlx::Error) -> Self {
        QueryError::from(value).into()
    }
}

impl From<sqlx::migrate::MigrateError> for ApiError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        log::error!("Migration failed: {value}");
        ApiError::Internal(format!("{value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(
            ApiError::invalid("Title", "required").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Auth(AuthError::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Internal("boom".to_owned()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let error = ApiError::Internal("relation \"recipes\" does not exist".to_owned());
        assert_eq!(error.message(), "An internal error occurred");
    }

    #[test]
    fn validation_errors_group_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add("Title", "is required".to_owned());
        errors.add("Title", "is too long".to_owned());
        errors.add("Instructions", "is required".to_owned());

        assert_eq!(errors.errors.len(), 2);
        assert_eq!(errors.errors[0].errors.len(), 2);
        assert!(errors.into_result().is_err());
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let error: ApiError = sqlx::Error::RowNotFound.into();
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn with_conflict_keeps_other_kinds() {
        let error = QueryError::from(sqlx::Error::RowNotFound).with_conflict("taken");
        assert!(matches!(error, ApiError::NotFound(_)));

        let error = QueryError::new("boom".to_owned()).with_conflict("taken");
        assert!(matches!(error, ApiError::Internal(_)));
    }
}
