//! # AppError
//!
//! Centralized error handling for Mycocheck.
//! Every failure is returned to the caller as a value the presentation layer can render.

use thiserror::Error;
use uuid::Uuid;

use crate::models::FeedbackStatus;

/// The primary error type for all mc-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// No acting identity was supplied
    #[error("authentication required")]
    AuthenticationRequired,

    /// Resource not found (e.g., Feedback, Image, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., empty text, non-image upload)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Moderation attempted on a record that already left `pending`
    #[error("feedback {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: FeedbackStatus,
        to: FeedbackStatus,
    },

    /// The caller is known but lacks the required role
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Credentials did not match
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Resource already exists (e.g., duplicate email)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., database down, disk full)
    #[error("internal service error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Self::NotFound(kind.to_string(), id.to_string())
    }
}

/// A specialized Result type for Mycocheck logic.
pub type Result<T> = std::result::Result<T, AppError>;
