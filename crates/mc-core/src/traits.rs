//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Storage ports speak `anyhow`; the services translate failures into `AppError`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Classification, FeedbackRecord, FeedbackStatus, Identity, ImageRecord, ProfileUpdate,
    UserProfile, Verdict,
};

/// Outcome of a conditional status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite {
    /// The record held the expected status and now holds the new one.
    Applied(FeedbackRecord),
    /// The record exists but its status was not the expected one. Carries the current record.
    Stale(FeedbackRecord),
    Missing,
}

/// Backing medium for feedback records.
///
/// Implementations must keep insertion order and apply each call atomically.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FeedbackRepo: Send + Sync {
    /// Appends a record. Returns `false` when the id is already taken.
    async fn insert(&self, record: &FeedbackRecord) -> anyhow::Result<bool>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<FeedbackRecord>>;
    async fn list_all(&self) -> anyhow::Result<Vec<FeedbackRecord>>;
    async fn list_by_author(&self, author_id: &str) -> anyhow::Result<Vec<FeedbackRecord>>;
    async fn list_by_status(&self, status: FeedbackStatus) -> anyhow::Result<Vec<FeedbackRecord>>;

    /// Sets `next` only if the record currently holds `expected`.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: FeedbackStatus,
        next: FeedbackStatus,
    ) -> anyhow::Result<StatusWrite>;
}

/// Persistence contract for uploaded image metadata.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageRepo: Send + Sync {
    async fn insert(&self, image: &ImageRecord) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ImageRecord>>;
    async fn list_by_owner(&self, owner_id: &str) -> anyhow::Result<Vec<ImageRecord>>;
    /// Stores the classification and marks its image analyzed, atomically.
    /// Returns `false`, storing nothing, if no image has `classification.image_id`.
    async fn save_classification(&self, classification: &Classification) -> anyhow::Result<bool>;
    /// The most recently saved classification of `image_id`.
    async fn latest_classification(&self, image_id: Uuid) -> anyhow::Result<Option<Classification>>;
}

/// Media storage contract for handling uploads and thumbnails.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns a media_id for the ImageRecord.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
    /// Reads back the original bytes.
    async fn load(&self, media_id: &str) -> anyhow::Result<Vec<u8>>;
    /// Returns the URL or path to the original media.
    async fn get_url(&self, media_id: &str) -> String;
    /// Returns the URL or path to the thumbnail.
    async fn get_thumbnail_url(&self, media_id: &str) -> String;
}

/// External inference service deciding edibility.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, data: &[u8], content_type: &str) -> anyhow::Result<Verdict>;
}

/// Supplies the acting caller, or `None` when nobody is signed in.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// Account directory: registration, credential checks and profile edits.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn register(&self, name: &str, email: &str, password: &str) -> Result<UserProfile>;

    /// Unknown email and wrong password fail the same way.
    async fn authenticate(&self, email: &str, password: &str) -> Result<UserProfile>;

    async fn profile(&self, user_id: &str) -> Result<UserProfile>;

    async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> Result<UserProfile>;
}
