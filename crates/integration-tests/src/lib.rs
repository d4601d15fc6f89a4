//! Shared fixtures for the cross-crate tests in `tests/`.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, RgbImage};
use mc_core::memory::InMemoryFeedbackRepo;
use mc_core::{Classifier, Edibility, FeedbackStore, Identity, Role, Verdict};
use mc_db_sqlite::SqliteDb;

pub fn user(id: &str, name: &str) -> Identity {
    Identity {
        id: id.to_string(),
        display_name: name.to_string(),
        role: Role::User,
    }
}

pub fn admin() -> Identity {
    Identity {
        id: "admin1".to_string(),
        display_name: "Admin User".to_string(),
        role: Role::Admin,
    }
}

/// One store per backing medium, labelled for assertion messages.
pub async fn stores() -> Vec<(&'static str, FeedbackStore)> {
    let db = SqliteDb::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    vec![
        ("memory", FeedbackStore::new(Arc::new(InMemoryFeedbackRepo::new()))),
        ("sqlite", FeedbackStore::new(Arc::new(db.feedback_repo()))),
    ]
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([180, 120, 60])));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .expect("encode png");
    out
}

/// Classifier double that always answers the same verdict.
pub struct FixedClassifier(pub Verdict);

impl FixedClassifier {
    pub fn edible(confidence: f32) -> Self {
        Self(Verdict {
            edibility: Edibility::Edible,
            confidence,
        })
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, data: &[u8], _content_type: &str) -> anyhow::Result<Verdict> {
        anyhow::ensure!(!data.is_empty(), "nothing to classify");
        Ok(self.0)
    }
}
