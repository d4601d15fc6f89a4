//! # Image uploads and classification
//!
//! Glue between the media store, image metadata and the external classifier.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Classification, Identity, ImageDetails, ImageRecord};
use crate::traits::{Classifier, ImageRepo, MediaStore};

pub struct ImageService {
    repo: Arc<dyn ImageRepo>,
    media: Arc<dyn MediaStore>,
    classifier: Arc<dyn Classifier>,
}

/// Where the presentation layer can fetch an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrls {
    pub original: String,
    pub thumbnail: String,
}

impl ImageService {
    pub fn new(
        repo: Arc<dyn ImageRepo>,
        media: Arc<dyn MediaStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            repo,
            media,
            classifier,
        }
    }

    pub async fn upload(
        &self,
        identity: Option<&Identity>,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<ImageRecord> {
        let owner = identity.ok_or(AppError::AuthenticationRequired)?;

        let parsed: mime::Mime = content_type
            .parse()
            .map_err(|_| AppError::InvalidArgument(format!("bad content type '{content_type}'")))?;
        if parsed.type_() != mime::IMAGE {
            return Err(AppError::InvalidArgument(format!(
                "expected an image, got {parsed}"
            )));
        }
        if data.is_empty() {
            return Err(AppError::InvalidArgument("upload is empty".into()));
        }

        let media_id = self.media.save_upload(data, parsed.essence_str()).await?;
        let image = ImageRecord {
            id: Uuid::now_v7(),
            owner_id: owner.id.clone(),
            file_name: file_name.to_string(),
            content_type: parsed.essence_str().to_string(),
            media_id,
            uploaded_at: Utc::now(),
            analyzed: false,
        };
        self.repo.insert(&image).await?;

        info!(image_id = %image.id, owner_id = %image.owner_id, "image uploaded");
        Ok(image)
    }

    /// Runs the classifier on a stored image and records the result.
    pub async fn analyze(&self, image_id: Uuid) -> Result<Classification> {
        let image = self
            .repo
            .get(image_id)
            .await?
            .ok_or_else(|| AppError::not_found("Image", image_id))?;

        let data = self.media.load(&image.media_id).await?;
        let verdict = self.classifier.classify(&data, &image.content_type).await?;
        if !(0.0..=1.0).contains(&verdict.confidence) {
            warn!(%image_id, confidence = verdict.confidence, "classifier confidence out of range");
            return Err(AppError::Internal(anyhow::anyhow!(
                "classifier returned confidence {} outside 0..=1",
                verdict.confidence
            )));
        }

        let classification = Classification {
            id: Uuid::now_v7(),
            image_id,
            verdict: verdict.edibility,
            confidence: verdict.confidence,
            details: verdict.edibility.advice().to_string(),
            classified_at: Utc::now(),
        };
        if !self.repo.save_classification(&classification).await? {
            return Err(AppError::not_found("Image", image_id));
        }

        info!(%image_id, verdict = classification.verdict.as_str(), confidence = classification.confidence, "image classified");
        Ok(classification)
    }

    /// The image with its latest classification, for result history views.
    pub async fn image(&self, image_id: Uuid) -> Result<ImageDetails> {
        let image = self
            .repo
            .get(image_id)
            .await?
            .ok_or_else(|| AppError::not_found("Image", image_id))?;
        let classification = self.repo.latest_classification(image_id).await?;
        Ok(ImageDetails {
            image,
            classification,
        })
    }

    pub async fn images_of(&self, owner_id: &str) -> Result<Vec<ImageRecord>> {
        Ok(self.repo.list_by_owner(owner_id).await?)
    }

    pub async fn urls(&self, image: &ImageRecord) -> ImageUrls {
        ImageUrls {
            original: self.media.get_url(&image.media_id).await,
            thumbnail: self.media.get_thumbnail_url(&image.media_id).await,
        }
    }
}
