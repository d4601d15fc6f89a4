//! # mc-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `mc-core` domain models.
//!
//! Insertion order is the `seq` autoincrement column; the public `id` is a
//! UUID stored as a 16-byte BLOB.

use std::str::FromStr;

use async_trait::async_trait;
use mc_core::models::{Classification, Edibility, FeedbackRecord, FeedbackStatus, ImageRecord};
use mc_core::traits::{FeedbackRepo, ImageRepo, StatusWrite};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use tracing::info;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS feedback (
        seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
        id                  BLOB NOT NULL UNIQUE,
        author_id           TEXT NOT NULL,
        author_display_name TEXT NOT NULL,
        subject_image_id    TEXT NOT NULL,
        text                TEXT NOT NULL,
        submitted_at        TEXT NOT NULL,
        status              TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected'))
    )",
    "CREATE INDEX IF NOT EXISTS feedback_author_idx ON feedback (author_id, seq)",
    "CREATE INDEX IF NOT EXISTS feedback_status_idx ON feedback (status, seq)",
    "CREATE TABLE IF NOT EXISTS images (
        seq          INTEGER PRIMARY KEY AUTOINCREMENT,
        id           BLOB NOT NULL UNIQUE,
        owner_id     TEXT NOT NULL,
        file_name    TEXT NOT NULL,
        content_type TEXT NOT NULL,
        media_id     TEXT NOT NULL,
        uploaded_at  TEXT NOT NULL,
        analyzed     INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS images_owner_idx ON images (owner_id, seq)",
    "CREATE TABLE IF NOT EXISTS classifications (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        id            BLOB NOT NULL UNIQUE,
        image_id      BLOB NOT NULL REFERENCES images (id),
        verdict       TEXT NOT NULL CHECK (verdict IN ('edible', 'poisonous')),
        confidence    REAL NOT NULL,
        details       TEXT NOT NULL,
        classified_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS classifications_image_idx ON classifications (image_id, seq)",
];

const FEEDBACK_COLUMNS: &str =
    "id, author_id, author_display_name, subject_image_id, text, submitted_at, status";

// Helper for UUID conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> anyhow::Result<Uuid> {
    Ok(Uuid::from_slice(blob)?)
}

/// Connection pool plus schema setup. Hands out the repositories.
#[derive(Clone)]
pub struct SqliteDb {
    pool: SqlitePool,
}

impl SqliteDb {
    /// Connects and creates the schema if needed.
    ///
    /// `sqlite::memory:` gets a single pinned connection so every query sees the same database.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;
        info!(database_url, "sqlite ready");
        Ok(db)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn feedback_repo(&self) -> SqliteFeedbackRepo {
        SqliteFeedbackRepo {
            pool: self.pool.clone(),
        }
    }

    pub fn image_repo(&self) -> SqliteImageRepo {
        SqliteImageRepo {
            pool: self.pool.clone(),
        }
    }
}

pub struct SqliteFeedbackRepo {
    pool: SqlitePool,
}

fn feedback_from_row(row: &SqliteRow) -> anyhow::Result<FeedbackRecord> {
    Ok(FeedbackRecord {
        id: blob_to_uuid(row.try_get::<Vec<u8>, _>("id")?.as_slice())?,
        author_id: row.try_get("author_id")?,
        author_display_name: row.try_get("author_display_name")?,
        subject_image_id: row.try_get("subject_image_id")?,
        text: row.try_get("text")?,
        submitted_at: row.try_get("submitted_at")?,
        status: row.try_get::<String, _>("status")?.parse::<FeedbackStatus>()?,
    })
}

async fn fetch_feedback(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> anyhow::Result<Option<FeedbackRecord>> {
    let row = sqlx::query(&format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE id = ?"))
        .bind(uuid_to_blob(id))
        .fetch_optional(conn)
        .await?;
    row.as_ref().map(feedback_from_row).transpose()
}

#[async_trait]
impl FeedbackRepo for SqliteFeedbackRepo {
    async fn insert(&self, record: &FeedbackRecord) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO feedback (id, author_id, author_display_name, subject_image_id, text, submitted_at, status)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(uuid_to_blob(record.id))
        .bind(&record.author_id)
        .bind(&record.author_display_name)
        .bind(&record.subject_image_id)
        .bind(&record.text)
        .bind(record.submitted_at)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<FeedbackRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_feedback(&mut conn, id).await
    }

    async fn list_all(&self) -> anyhow::Result<Vec<FeedbackRecord>> {
        sqlx::query(&format!("SELECT {FEEDBACK_COLUMNS} FROM feedback ORDER BY seq ASC"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(feedback_from_row)
            .collect()
    }

    async fn list_by_author(&self, author_id: &str) -> anyhow::Result<Vec<FeedbackRecord>> {
        sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE author_id = ? ORDER BY seq ASC"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(feedback_from_row)
        .collect()
    }

    async fn list_by_status(&self, status: FeedbackStatus) -> anyhow::Result<Vec<FeedbackRecord>> {
        sqlx::query(&format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE status = ? ORDER BY seq ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(feedback_from_row)
        .collect()
    }

    /// Conditional update and read-back in one transaction.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: FeedbackStatus,
        next: FeedbackStatus,
    ) -> anyhow::Result<StatusWrite> {
        let mut tx = self.pool.begin().await?;

        let changed = sqlx::query("UPDATE feedback SET status = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(uuid_to_blob(id))
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let current = fetch_feedback(&mut tx, id).await?;

        tx.commit().await?;

        Ok(match current {
            None => StatusWrite::Missing,
            Some(record) if changed == 1 => StatusWrite::Applied(record),
            Some(record) => StatusWrite::Stale(record),
        })
    }
}

pub struct SqliteImageRepo {
    pool: SqlitePool,
}

fn image_from_row(row: &SqliteRow) -> anyhow::Result<ImageRecord> {
    Ok(ImageRecord {
        id: blob_to_uuid(row.try_get::<Vec<u8>, _>("id")?.as_slice())?,
        owner_id: row.try_get("owner_id")?,
        file_name: row.try_get("file_name")?,
        content_type: row.try_get("content_type")?,
        media_id: row.try_get("media_id")?,
        uploaded_at: row.try_get("uploaded_at")?,
        analyzed: row.try_get("analyzed")?,
    })
}

#[async_trait]
impl ImageRepo for SqliteImageRepo {
    async fn insert(&self, image: &ImageRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO images (id, owner_id, file_name, content_type, media_id, uploaded_at, analyzed)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(image.id))
        .bind(&image.owner_id)
        .bind(&image.file_name)
        .bind(&image.content_type)
        .bind(&image.media_id)
        .bind(image.uploaded_at)
        .bind(image.analyzed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<ImageRecord>> {
        let row = sqlx::query("SELECT * FROM images WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(image_from_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> anyhow::Result<Vec<ImageRecord>> {
        sqlx::query("SELECT * FROM images WHERE owner_id = ? ORDER BY seq ASC")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(image_from_row)
            .collect()
    }

    /// Flag update and history insert in one transaction.
    async fn save_classification(&self, classification: &Classification) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let marked = sqlx::query("UPDATE images SET analyzed = 1 WHERE id = ?")
            .bind(uuid_to_blob(classification.image_id))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if marked == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO classifications (id, image_id, verdict, confidence, details, classified_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(classification.id))
        .bind(uuid_to_blob(classification.image_id))
        .bind(classification.verdict.as_str())
        .bind(classification.confidence)
        .bind(&classification.details)
        .bind(classification.classified_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn latest_classification(&self, image_id: Uuid) -> anyhow::Result<Option<Classification>> {
        let row = sqlx::query(
            "SELECT id, image_id, verdict, confidence, details, classified_at
             FROM classifications WHERE image_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(uuid_to_blob(image_id))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(classification_from_row).transpose()
    }
}

fn classification_from_row(row: &SqliteRow) -> anyhow::Result<Classification> {
    Ok(Classification {
        id: blob_to_uuid(row.try_get::<Vec<u8>, _>("id")?.as_slice())?,
        image_id: blob_to_uuid(row.try_get::<Vec<u8>, _>("image_id")?.as_slice())?,
        verdict: row.try_get::<String, _>("verdict")?.parse::<Edibility>()?,
        confidence: row.try_get("confidence")?,
        details: row.try_get("details")?,
        classified_at: row.try_get("classified_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(author: &str, text: &str) -> FeedbackRecord {
        FeedbackRecord {
            id: Uuid::now_v7(),
            author_id: author.into(),
            author_display_name: "Demo".into(),
            subject_image_id: "img-1".into(),
            text: text.into(),
            submitted_at: Utc::now(),
            status: FeedbackStatus::Pending,
        }
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
    async fn test_insert_and_list_in_order() {
        let db = SqliteDb::connect("sqlite::memory:").await.unwrap();
        let repo = db.feedback_repo();

        let a = record("u1", "first");
        let b = record("u2", "second");
        let c = record("u1", "third");
        for fb in [&a, &b, &c] {
            assert!(repo.insert(fb).await.unwrap());
        }
        assert!(!repo.insert(&a).await.unwrap());

        let all: Vec<_> = repo.list_all().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(all, vec![a.id, b.id, c.id]);

        let mine = repo.list_by_author("u1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].text, "first");
        assert_eq!(mine[1].text, "third");
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let db = SqliteDb::connect("sqlite::memory:").await.unwrap();
        let repo = db.feedback_repo();
        let fb = record("u1", "hello");
        repo.insert(&fb).await.unwrap();

        let applied = repo
            .compare_and_set_status(fb.id, FeedbackStatus::Pending, FeedbackStatus::Approved)
            .await
            .unwrap();
        assert!(matches!(applied, StatusWrite::Applied(ref r) if r.status == FeedbackStatus::Approved));

        let stale = repo
            .compare_and_set_status(fb.id, FeedbackStatus::Pending, FeedbackStatus::Rejected)
            .await
            .unwrap();
        assert!(matches!(stale, StatusWrite::Stale(ref r) if r.status == FeedbackStatus::Approved));

        assert_eq!(
            repo.list_by_status(FeedbackStatus::Approved).await.unwrap().len(),
            1
        );
        assert_eq!(
            repo.compare_and_set_status(Uuid::now_v7(), FeedbackStatus::Pending, FeedbackStatus::Approved)
                .await
                .unwrap(),
            StatusWrite::Missing
        );
    }

    #[tokio::test]
    async fn test_images_round_trip() {
        let db = SqliteDb::connect("sqlite::memory:").await.unwrap();
        let repo = db.image_repo();
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
        assert!(repo.latest_classification(image.id).await.unwrap().is_none());

        let older = classification(image.id, Edibility::Edible, 0.25);
        let newer = classification(image.id, Edibility::Poisonous, 0.75);
        assert!(repo.save_classification(&older).await.unwrap());
        assert!(repo.save_classification(&newer).await.unwrap());
        assert!(!repo
            .save_classification(&classification(Uuid::now_v7(), Edibility::Edible, 0.5))
            .await
            .unwrap());

        let stored = repo.get(image.id).await.unwrap().unwrap();
        assert!(stored.analyzed);
        let latest = repo.latest_classification(image.id).await.unwrap().unwrap();
        assert_eq!(latest.id, newer.id);
        assert_eq!(latest.verdict, Edibility::Poisonous);
        assert_eq!(latest.confidence, 0.75);
        assert_eq!(latest.details, newer.details);
        assert_eq!(repo.list_by_owner("u1").await.unwrap().len(), 1);
        assert!(repo.list_by_owner("u2").await.unwrap().is_empty());
    }
}
