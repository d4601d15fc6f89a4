//! # Domain Models
//!
//! These structs represent the core entities of Mycocheck.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Moderation state of a feedback record.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether a moderator may move a record from `self` to `next`.
    pub fn can_transition_to(&self, next: FeedbackStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected)
        )
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(AppError::InvalidArgument(format!(
                "unknown feedback status '{other}'"
            ))),
        }
    }
}

/// One user's commentary on one identification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub author_id: String,
    /// Name of the author when the feedback was submitted. Not updated on rename.
    pub author_display_name: String,
    /// Opaque to the store; never checked against the image service.
    pub subject_image_id: String,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
    pub status: FeedbackStatus,
}

/// Advisory notifications for the presentation layer (toasts, badges).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedbackEvent {
    Submitted {
        feedback_id: Uuid,
        author_id: String,
    },
    StatusChanged {
        feedback_id: Uuid,
        new_status: FeedbackStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

/// The acting caller as supplied by an `IdentityProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub role: Role,
}

impl Identity {
    pub fn is_moderator(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Account details editable by their owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
    pub role: Role,
}

impl UserProfile {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            display_name: self.name.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
}

/// An uploaded photo awaiting or having received classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub file_name: String,
    pub content_type: String,
    /// Handle returned by the `MediaStore`
    pub media_id: String,
    pub uploaded_at: DateTime<Utc>,
    pub analyzed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edibility {
    Edible,
    Poisonous,
}

impl Edibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edible => "edible",
            Self::Poisonous => "poisonous",
        }
    }

    /// Advisory copy shown next to a verdict.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Edible => {
                "This mushroom looks edible. Confirm with several trusted sources before eating any wild mushroom."
            }
            Self::Poisonous => {
                "This mushroom looks poisonous. Do not eat it, and wash your hands if you touched it."
            }
        }
    }
}

impl FromStr for Edibility {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edible" => Ok(Self::Edible),
            "poisonous" => Ok(Self::Poisonous),
            other => Err(AppError::InvalidArgument(format!("unknown verdict '{other}'"))),
        }
    }
}

/// Result of running the classifier on one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub id: Uuid,
    pub image_id: Uuid,
    pub verdict: Edibility,
    /// In `0.0..=1.0`
    pub confidence: f32,
    pub details: String,
    pub classified_at: DateTime<Utc>,
}

/// An image together with its most recent classification, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDetails {
    #[serde(flatten)]
    pub image: ImageRecord,
    pub classification: Option<Classification>,
}

/// Raw output of a `Classifier` before it is stamped into a `Classification`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub edibility: Edibility,
    pub confidence: f32,
}
