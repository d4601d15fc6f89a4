//! In-memory implementations of the storage ports.
//!
//! All state is held in memory and lost on restart. Each collection sits behind
//! a single `RwLock`, so writes are serialized in arrival order.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Classification, FeedbackRecord, FeedbackStatus, ImageRecord};
use crate::traits::{FeedbackRepo, ImageRepo, StatusWrite};

/// Ordered feedback collection.
#[derive(Default)]
pub struct InMemoryFeedbackRepo {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl InMemoryFeedbackRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackRepo for InMemoryFeedbackRepo {
    async fn insert(&self, record: &FeedbackRecord) -> anyhow::Result<bool> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.id == record.id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<FeedbackRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn list_all(&self) -> anyhow::Result<Vec<FeedbackRecord>> {
        Ok(self.records.read().await.clone())
    }

    async fn list_by_author(&self, author_id: &str) -> anyhow::Result<Vec<FeedbackRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, status: FeedbackStatus) -> anyhow::Result<Vec<FeedbackRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: FeedbackStatus,
        next: FeedbackStatus,
    ) -> anyhow::Result<StatusWrite> {
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return Ok(StatusWrite::Missing);
        };
        if record.status != expected {
            return Ok(StatusWrite::Stale(record.clone()));
        }
        record.status = next;
        Ok(StatusWrite::Applied(record.clone()))
    }
}

#[derive(Default)]
struct ImageTables {
    images: Vec<ImageRecord>,
    /// Append-only; the last entry per image is the current one.
    classifications: Vec<Classification>,
}

/// Ordered image metadata and classification history.
#[derive(Default)]
pub struct InMemoryImageRepo {
    tables: RwLock<ImageTables>,
}

impl InMemoryImageRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageRepo for InMemoryImageRepo {
    async fn insert(&self, image: &ImageRecord) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        if tables.images.iter().any(|i| i.id == image.id) {
            anyhow::bail!("image {} already stored", image.id);
        }
        tables.images.push(image.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ImageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.images.iter().find(|i| i.id == id).cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> anyhow::Result<Vec<ImageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .images
            .iter()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn save_classification(&self, classification: &Classification) -> anyhow::Result<bool> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;
        let Some(image) = tables
            .images
            .iter_mut()
            .find(|i| i.id == classification.image_id)
        else {
            return Ok(false);
        };
        image.analyzed = true;
        tables.classifications.push(classification.clone());
        Ok(true)
    }

    async fn latest_classification(&self, image_id: Uuid) -> anyhow::Result<Option<Classification>> {
        let tables = self.tables.read().await;
        Ok(tables
            .classifications
            .iter()
            .rev()
            .find(|c| c.image_id == image_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Edibility;
    use chrono::Utc;

    fn record(author: &str) -> FeedbackRecord {
        FeedbackRecord {
            id: Uuid::now_v7(),
            author_id: author.to_string(),
            author_display_name: author.to_uppercase(),
            subject_image_id: "img-1".to_string(),
            text: "looks like a chanterelle".to_string(),
            submitted_at: Utc::now(),
            status: FeedbackStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let repo = InMemoryFeedbackRepo::new();
        let fb = record("u1");
        assert!(repo.insert(&fb).await.unwrap());
        assert!(!repo.insert(&fb).await.unwrap());
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_set_only_from_expected() {
        let repo = InMemoryFeedbackRepo::new();
        let fb = record("u1");
        repo.insert(&fb).await.unwrap();

        let first = repo
            .compare_and_set_status(fb.id, FeedbackStatus::Pending, FeedbackStatus::Approved)
            .await
            .unwrap();
        assert!(matches!(first, StatusWrite::Applied(r) if r.status == FeedbackStatus::Approved));

        let second = repo
            .compare_and_set_status(fb.id, FeedbackStatus::Pending, FeedbackStatus::Rejected)
            .await
            .unwrap();
        assert!(matches!(second, StatusWrite::Stale(r) if r.status == FeedbackStatus::Approved));

        let missing = repo
            .compare_and_set_status(Uuid::now_v7(), FeedbackStatus::Pending, FeedbackStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(missing, StatusWrite::Missing);
    }

    fn classification(image_id: Uuid, verdict: Edibility, confidence: f32) -> Classification {
        Classification {
            id: Uuid::now_v7(),
            image_id,
            verdict,
            confidence,
            details: verdict.advice().to_string(),
            classified_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_classification_needs_a_known_image() {
        let repo = InMemoryImageRepo::new();
        let orphan = classification(Uuid::now_v7(), Edibility::Edible, 0.5);
        assert!(!repo.save_classification(&orphan).await.unwrap());
        assert!(repo
            .latest_classification(orphan.image_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_latest_classification_wins() {
        let repo = InMemoryImageRepo::new();
        let image = ImageRecord {
            id: Uuid::now_v7(),
            owner_id: "u1".into(),
            file_name: "cap.jpg".into(),
            content_type: "image/jpeg".into(),
            media_id: "ab".repeat(32),
            uploaded_at: Utc::now(),
            analyzed: false,
        };
        repo.insert(&image).await.unwrap();

        let first = classification(image.id, Edibility::Edible, 0.4);
        let second = classification(image.id, Edibility::Poisonous, 0.9);
        assert!(repo.save_classification(&first).await.unwrap());
        assert!(repo.save_classification(&second).await.unwrap());

        assert_eq!(repo.latest_classification(image.id).await.unwrap(), Some(second));
        assert!(repo.get(image.id).await.unwrap().unwrap().analyzed);
    }
}
