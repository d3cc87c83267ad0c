use crate::{error::ApiError, jwt::SessionData, schema::Id};

/// How a failed ownership check is reported back to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnershipPolicy {
    /// Foreign resources look exactly like missing ones.
    Conceal,
    /// Foreign resources are reported as forbidden.
    Reveal,
}

const OWNERSHIP_TABLE: &[(Resource, OwnershipPolicy)] = &[
    (Resource::Recipe, OwnershipPolicy::Conceal),
    (Resource::Rating, OwnershipPolicy::Reveal),
];

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Resource {
    Recipe,
    Rating,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ActionType {
    Update,
    Delete,
}

impl ActionType {
    fn verb(&self) -> &'static str {
        match self {
            ActionType::Update => "update",
            ActionType::Delete => "delete",
        }
    }
}

impl Resource {
    pub fn policy(self) -> OwnershipPolicy {
        OWNERSHIP_TABLE
            .iter()
            .find_map(|(resource, policy)| (*resource == self).then_some(*policy))
            .unwrap_or(OwnershipPolicy::Conceal)
    }

    fn missing(self, action: ActionType) -> ApiError {
        match (self, self.policy()) {
            (Resource::Recipe, OwnershipPolicy::Conceal) => ApiError::NotFound(format!(
                "Recipe not found or you don't have permission to {} it",
                action.verb()
            )),
            (Resource::Recipe, OwnershipPolicy::Reveal) => ApiError::not_found("Recipe not found"),
            (Resource::Rating, _) => ApiError::not_found("Rating not found"),
        }
    }

    fn foreign(self, action: ActionType) -> ApiError {
        match self.policy() {
            OwnershipPolicy::Conceal => self.missing(action),
            OwnershipPolicy::Reveal => ApiError::Forbidden(format!(
                "You can only {} your own {}s",
                action.verb(),
                match self {
                    Resource::Recipe => "recipe",
                    Resource::Rating => "rating",
                }
            )),
        }
    }
}

impl SessionData {
    /// Ownership gate. `owner_id` is `None` when the resource does not exist.
    pub fn authorize(
        &self,
        resource: Resource,
        action: ActionType,
        owner_id: Option<Id>,
    ) -> Result<(), ApiError> {
        match owner_id {
            None => Err(resource.missing(action)),
            Some(owner_id) if owner_id != self.user_id => Err(resource.foreign(action)),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::http::StatusCode;

    fn session(user_id: Id) -> SessionData {
        SessionData {
            user_id,
            username: "bob".to_owned(),
            email: "bob@example.com".to_owned(),
        }
    }

    #[test]
    fn owner_passes() {
        assert!(session(1)
            .authorize(Resource::Recipe, ActionType::Update, Some(1))
            .is_ok());
        assert!(session(1)
            .authorize(Resource::Rating, ActionType::Delete, Some(1))
            .is_ok());
    }

    #[test]
    fn foreign_recipe_looks_missing() {
        let foreign = session(1)
            .authorize(Resource::Recipe, ActionType::Update, Some(2))
            .unwrap_err();
        let missing = session(1)
            .authorize(Resource::Recipe, ActionType::Update, None)
            .unwrap_err();

        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
        assert_eq!(foreign.message(), missing.message());
    }

    #[test]
    fn foreign_rating_is_forbidden() {
        let foreign = session(1)
            .authorize(Resource::Rating, ActionType::Delete, Some(2))
            .unwrap_err();
        assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
        assert_eq!(foreign.message(), "You can only delete your own ratings");

        let missing = session(1)
            .authorize(Resource::Rating, ActionType::Delete, None)
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
