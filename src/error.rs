//! Typed errors and HTTP mapping.

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message returned to clients for any fault that must not leak internals.
pub const GENERIC_ERROR: &str = "An error occurred while processing your request.";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown selection field '{field}' on {entity}")]
    UnknownSelectionField { entity: String, field: String },
    #[error("invalid resource path: '{0}'")]
    InvalidPath(String),
    #[error("duplicate resource path: {0}")]
    DuplicatePath(String),
    #[error("relation '{relation}' on {entity} targets {expected}, but is bound to {found}")]
    SecondaryMismatch {
        entity: String,
        relation: String,
        expected: String,
        found: String,
    },
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("One or more of the required fields is missing or incorrect.")]
    ValidationFailed(Vec<String>),
    #[error("A property is invalid, missing or misspelled!")]
    InvalidProperties,
    #[error("Selected relation does not exist.")]
    RelationNotFound,
    #[error("{0} does not exist.")]
    ItemNotFound(String),
    #[error("{0} exists.")]
    ItemExists(String),
    #[error("Relation exists.")]
    RelationExists,
    #[error("Relation does not exist.")]
    RelationDoesNotExist,
    #[error("Invalid order property: {0}")]
    InvalidOrderField(String),
    #[error("No {0} exists.")]
    NoItemsExist(String),
    #[error("This feature is disabled.")]
    FeatureDisabled,
    #[error("There was an error deleting the item.")]
    DeleteFailed,
    #[error("There was an error creating your desired item.")]
    CreateFailed,
    #[error("There was an error updating the item.")]
    UpdateFailed,
    #[error("A property with the same value already exists: {0}")]
    NonUniqueProperty(String),
    #[error("A required property is missing: {0}")]
    RequiredPropertyMissing(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("The requested URL was not found on the server.")]
    RouteNotFound,
    #[error("The method is not allowed for the requested URL.")]
    MethodNotAllowed,
    #[error("Request body is too large.")]
    PayloadTooLarge,
    #[error("storage did not answer in time")]
    StorageTimeout,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("storage: {0}")]
    Store(StoreError),
    #[error("internal: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation { field, .. } => AppError::NonUniqueProperty(field),
            StoreError::MissingNode(_) => AppError::ItemNotFound("Item".into()),
            StoreError::DuplicateEdge { .. } => AppError::RelationExists,
            other => AppError::Store(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidProperties
            | AppError::ItemExists(_)
            | AppError::RelationExists
            | AppError::RelationDoesNotExist
            | AppError::NonUniqueProperty(_) => StatusCode::CONFLICT,
            AppError::RelationNotFound
            | AppError::ItemNotFound(_)
            | AppError::InvalidOrderField(_)
            | AppError::NoItemsExist(_)
            | AppError::RouteNotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::FeatureDisabled | AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::StorageTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::DeleteFailed
            | AppError::CreateFailed
            | AppError::UpdateFailed
            | AppError::RequiredPropertyMissing(_)
            | AppError::Config(_)
            | AppError::Store(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Faults whose detail stays server-side.
    pub fn is_internal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::Store(_) | AppError::Internal(_))
    }

    /// Client-facing messages for the `errors` envelope.
    pub fn messages(&self) -> Vec<String> {
        match self {
            AppError::ValidationFailed(details) if !details.is_empty() => {
                let mut out = vec![self.to_string()];
                out.extend(details.iter().cloned());
                out
            }
            e if e.is_internal() => vec![GENERIC_ERROR.to_string()],
            e => vec![e.to_string()],
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            errors: self.messages(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub errors: Vec<String>,
}

impl AppError {
    /// Log at the level the error deserves; internal faults keep their full detail here only.
    pub fn log(&self) {
        if self.is_internal() {
            tracing::error!(error = ?self, "request failed");
        } else {
            tracing::warn!(status = self.status().as_u16(), error = %self, "request rejected");
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        (self.status(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status() {
        assert_eq!(AppError::ValidationFailed(vec![]).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::InvalidProperties.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::RelationNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::InvalidOrderField("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::FeatureDisabled.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::RequiredPropertyMissing("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::RelationDoesNotExist.status(), StatusCode::CONFLICT);
        assert_eq!(AppError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(AppError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn duplicate_edge_becomes_relation_exists() {
        let err: AppError = StoreError::DuplicateEdge { label: "HAS_PET".into() }.into();
        assert!(matches!(err, AppError::RelationExists));
    }

    #[test]
    fn internal_faults_are_reduced_to_generic_message() {
        let err = AppError::Store(StoreError::Backend("connection reset by peer at 10.0.0.3".into()));
        assert_eq!(err.messages(), vec![GENERIC_ERROR.to_string()]);
    }

    #[test]
    fn unique_violation_becomes_non_unique_property() {
        let err: AppError = StoreError::UniqueViolation {
            label: "User".into(),
            field: "phone_number".into(),
        }
        .into();
        assert!(matches!(err, AppError::NonUniqueProperty(ref f) if f == "phone_number"));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn validation_details_follow_headline() {
        let err = AppError::ValidationFailed(vec!["first_name: expected a string".into()]);
        let msgs = err.messages();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1], "first_name: expected a string");
    }
}
