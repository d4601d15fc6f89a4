//! # Feedback moderation
//!
//! `FeedbackStore` owns the feedback collection through a `FeedbackRepo` and is
//! the only way to create or moderate records. Records start `pending` and move
//! once, by a moderator, to `approved` or `rejected`.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{FeedbackEvent, FeedbackRecord, FeedbackStatus, Identity};
use crate::traits::{FeedbackRepo, StatusWrite};

const EVENT_CAPACITY: usize = 64;

pub struct FeedbackStore {
    repo: Arc<dyn FeedbackRepo>,
    events: broadcast::Sender<FeedbackEvent>,
}

impl FeedbackStore {
    pub fn new(repo: Arc<dyn FeedbackRepo>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { repo, events }
    }

    /// Advisory notifications. Lagging receivers lose old events; records are unaffected.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.events.subscribe()
    }

    /// Creates a `pending` record on behalf of `author_id`.
    pub async fn submit(
        &self,
        author_id: &str,
        author_display_name: &str,
        subject_image_id: &str,
        text: &str,
    ) -> Result<FeedbackRecord> {
        if author_id.trim().is_empty() {
            return Err(AppError::AuthenticationRequired);
        }
        if text.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "feedback text must not be empty".into(),
            ));
        }

        let record = FeedbackRecord {
            id: Uuid::now_v7(),
            author_id: author_id.to_string(),
            author_display_name: author_display_name.to_string(),
            subject_image_id: subject_image_id.to_string(),
            text: text.to_string(),
            submitted_at: Utc::now(),
            status: FeedbackStatus::Pending,
        };

        if !self.repo.insert(&record).await? {
            return Err(AppError::Conflict(format!(
                "feedback id {} already issued",
                record.id
            )));
        }

        info!(feedback_id = %record.id, author_id, "feedback submitted");
        self.notify(FeedbackEvent::Submitted {
            feedback_id: record.id,
            author_id: record.author_id.clone(),
        });
        Ok(record)
    }

    /// `submit` for whatever the identity provider reported.
    pub async fn submit_as(
        &self,
        identity: Option<&Identity>,
        subject_image_id: &str,
        text: &str,
    ) -> Result<FeedbackRecord> {
        let identity = identity.ok_or(AppError::AuthenticationRequired)?;
        self.submit(&identity.id, &identity.display_name, subject_image_id, text)
            .await
    }

    /// Everything `author_id` submitted, in any status, oldest first.
    pub async fn query_by_author(&self, author_id: &str) -> Result<Vec<FeedbackRecord>> {
        Ok(self.repo.list_by_author(author_id).await?)
    }

    /// Every record. Callers are trusted to hold moderator capability.
    pub async fn query_all(&self) -> Result<Vec<FeedbackRecord>> {
        Ok(self.repo.list_all().await?)
    }

    /// One record by id.
    pub async fn get(&self, feedback_id: Uuid) -> Result<FeedbackRecord> {
        self.repo
            .get(feedback_id)
            .await?
            .ok_or_else(|| AppError::not_found("Feedback", feedback_id))
    }

    /// Approved records only, oldest first.
    pub async fn query_public(&self) -> Result<Vec<FeedbackRecord>> {
        Ok(self.repo.list_by_status(FeedbackStatus::Approved).await?)
    }

    /// The `limit` most recently submitted approved records, newest first.
    pub async fn query_recent_public(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let approved = self.repo.list_by_status(FeedbackStatus::Approved).await?;
        Ok(approved.into_iter().rev().take(limit).collect())
    }

    /// Moderator view for admins, own feedback for everyone else.
    pub async fn visible_to(&self, identity: &Identity) -> Result<Vec<FeedbackRecord>> {
        if identity.is_moderator() {
            self.query_all().await
        } else {
            self.query_by_author(&identity.id).await
        }
    }

    /// Moves a `pending` record to `approved` or `rejected`.
    ///
    /// Trusted-caller API: no role check. Records that already left `pending`
    /// fail with `InvalidTransition`.
    pub async fn set_status(
        &self,
        feedback_id: Uuid,
        new_status: FeedbackStatus,
    ) -> Result<FeedbackRecord> {
        if !FeedbackStatus::Pending.can_transition_to(new_status) {
            return Err(AppError::InvalidArgument(format!(
                "status must be approved or rejected, got {new_status}"
            )));
        }

        let write = self
            .repo
            .compare_and_set_status(feedback_id, FeedbackStatus::Pending, new_status)
            .await?;

        let updated = match write {
            StatusWrite::Applied(record) => record,
            StatusWrite::Stale(current) => {
                debug!(%feedback_id, current = %current.status, requested = %new_status, "moderation refused");
                return Err(AppError::InvalidTransition {
                    id: feedback_id,
                    from: current.status,
                    to: new_status,
                });
            }
            StatusWrite::Missing => return Err(AppError::not_found("Feedback", feedback_id)),
        };

        info!(%feedback_id, status = %new_status, "feedback moderated");
        self.notify(FeedbackEvent::StatusChanged {
            feedback_id,
            new_status,
        });
        Ok(updated)
    }

    /// `set_status` guarded by the actor's role.
    pub async fn moderate(
        &self,
        actor: &Identity,
        feedback_id: Uuid,
        new_status: FeedbackStatus,
    ) -> Result<FeedbackRecord> {
        if !actor.is_moderator() {
            return Err(AppError::Forbidden(format!(
                "user {} may not moderate feedback",
                actor.id
            )));
        }
        self.set_status(feedback_id, new_status).await
    }

    fn notify(&self, event: FeedbackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
