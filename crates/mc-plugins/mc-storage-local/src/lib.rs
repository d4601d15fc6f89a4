//! # mc-storage-local
//!
//! Filesystem `MediaStore` for mushroom photos. Uploads are named by their
//! SHA-256 digest under `root/ab/cd/`, next to a PNG thumbnail.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use image::{ImageFormat, ImageReader};
use mc_core::traits::MediaStore;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

const THUMBNAIL_EDGE: u32 = 250;

pub struct LocalMediaStore {
    root_path: PathBuf,
    /// Served path of `root_path`, without trailing slash
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    fn sharded_path(&self, media_id: &str) -> anyhow::Result<PathBuf> {
        let (a, b) = shards(media_id)?;
        Ok(self.root_path.join(a).join(b).join(media_id))
    }

    fn public_path(&self, media_id: &str, file: &str) -> String {
        match shards(media_id) {
            Ok((a, b)) => format!("{}/{}/{}/{}", self.url_prefix, a, b, file),
            Err(_) => format!("{}/{}", self.url_prefix, file),
        }
    }
}

/// Media ids are lowercase SHA-256 hex; anything else never came from this store.
fn shards(media_id: &str) -> anyhow::Result<(&str, &str)> {
    if media_id.len() != 64 || !media_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        anyhow::bail!("malformed media id '{media_id}'");
    }
    Ok((&media_id[0..2], &media_id[2..4]))
}

fn thumbnail_name(media_id: &str) -> String {
    format!("thumb_{media_id}.png")
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Identical bytes map to the same media id and are written once.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        let hash = hex::encode(Sha256::digest(&data));
        let target_path = self.sharded_path(&hash)?;

        if fs::try_exists(&target_path).await? {
            debug!(media_id = %hash, "upload already stored");
            return Ok(hash);
        }

        // Decode first: undecodable uploads never reach the disk.
        let thumbnail = render_thumbnail(data.clone()).await?;

        let parent = target_path
            .parent()
            .context("sharded path has no parent")?;
        fs::create_dir_all(parent).await?;

        fs::write(parent.join(thumbnail_name(&hash)), thumbnail).await?;
        fs::write(&target_path, &data).await?;

        debug!(media_id = %hash, content_type, bytes = data.len(), "upload stored");
        Ok(hash)
    }

    async fn load(&self, media_id: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.sharded_path(media_id)?;
        fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }

    async fn get_url(&self, media_id: &str) -> String {
        self.public_path(media_id, media_id)
    }

    async fn get_thumbnail_url(&self, media_id: &str) -> String {
        self.public_path(media_id, &thumbnail_name(media_id))
    }
}

/// Decodes and shrinks to a PNG thumbnail on the blocking pool.
async fn render_thumbnail(data: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
        let img = ImageReader::new(Cursor::new(data))
            .with_guessed_format()?
            .decode()
            .context("upload is not a decodable image")?;

        let thumb = img.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE);
        let mut out = Vec::new();
        thumb.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(out)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(w, h));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[tokio::test]
    async fn test_save_is_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().to_path_buf(), "/static/uploads/".into());

        let data = png_bytes(600, 300);
        let id = store.save_upload(data.clone(), "image/png").await.unwrap();
        let again = store.save_upload(data.clone(), "image/png").await.unwrap();
        assert_eq!(id, again);
        assert_eq!(store.load(&id).await.unwrap(), data);

        let thumb_path = dir
            .path()
            .join(&id[0..2])
            .join(&id[2..4])
            .join(thumbnail_name(&id));
        let thumb = image::open(thumb_path).unwrap();
        assert_eq!(thumb.width(), THUMBNAIL_EDGE);
    }

    #[tokio::test]
    async fn test_urls_are_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().to_path_buf(), "/static/uploads".into());
        let id = store.save_upload(png_bytes(4, 4), "image/png").await.unwrap();

        let url = store.get_url(&id).await;
        assert_eq!(url, format!("/static/uploads/{}/{}/{}", &id[0..2], &id[2..4], id));
        assert!(store.get_thumbnail_url(&id).await.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_garbage_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalMediaStore::new(dir.path().to_path_buf(), "/u".into());
        assert!(store
            .save_upload(b"definitely not a jpeg".to_vec(), "image/jpeg")
            .await
            .is_err());
        assert!(store.load("../../etc/passwd").await.is_err());
    }
}
