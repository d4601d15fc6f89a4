//! # Mycocheck Binary
//!
//! Assembles the storage, identity and media plugins from configuration,
//! seeds the admin account and reports the moderation queue.

use std::sync::Arc;

use anyhow::Context;
use mc_auth_simple::SimpleAuthProvider;
use mc_config::Settings;
use mc_core::{AuthProvider, FeedbackRepo, FeedbackStatus, FeedbackStore, ImageRepo, MediaStore};
use mc_storage_local::LocalMediaStore;
use secrecy::ExposeSecret;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[cfg(feature = "db-sqlite")]
use mc_db_sqlite::SqliteDb;

/// Everything a presentation layer needs, built once and shared.
struct AppState {
    feedback: FeedbackStore,
    images: Arc<dyn ImageRepo>,
    media: LocalMediaStore,
    auth: SimpleAuthProvider,
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(feature = "db-sqlite")]
async fn open_storage(settings: &Settings) -> anyhow::Result<(Arc<dyn FeedbackRepo>, Arc<dyn ImageRepo>)> {
    let db = SqliteDb::connect(&settings.database_url)
        .await
        .with_context(|| format!("opening {}", settings.database_url))?;
    Ok((Arc::new(db.feedback_repo()), Arc::new(db.image_repo())))
}

#[cfg(not(feature = "db-sqlite"))]
async fn open_storage(_settings: &Settings) -> anyhow::Result<(Arc<dyn FeedbackRepo>, Arc<dyn ImageRepo>)> {
    use mc_core::memory::{InMemoryFeedbackRepo, InMemoryImageRepo};
    tracing::warn!("db-sqlite disabled, feedback will not survive a restart");
    Ok((
        Arc::new(InMemoryFeedbackRepo::new()),
        Arc::new(InMemoryImageRepo::new()),
    ))
}

async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    // 1. Storage
    let (feedback_repo, images) = open_storage(settings).await?;

    // 2. Media
    let media = LocalMediaStore::new(
        settings.upload_dir.clone(),
        settings.media_url_prefix.clone(),
    );
    tokio::fs::create_dir_all(media.root())
        .await
        .with_context(|| format!("creating {}", media.root().display()))?;

    // 3. Identity
    let auth = SimpleAuthProvider::new();
    let admin = auth
        .seed_admin(
            &settings.admin.name,
            &settings.admin.email,
            settings.admin.password.expose_secret(),
        )
        .await?;
    info!(admin_id = %admin.id, email = %admin.email, "moderator available");

    Ok(AppState {
        feedback: FeedbackStore::new(feedback_repo),
        images,
        media,
        auth,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings);

    let state = build_state(&settings).await?;

    let all = state.feedback.query_all().await?;
    let pending = all
        .iter()
        .filter(|r| r.status == FeedbackStatus::Pending)
        .count();
    info!(total = all.len(), pending, "moderation queue loaded");

    for record in state.feedback.query_recent_public(5).await? {
        // Feedback may point at images that were never stored here.
        let image = match Uuid::parse_str(&record.subject_image_id) {
            Ok(id) => state.images.get(id).await?,
            Err(_) => None,
        };
        let (thumbnail, verdict) = match &image {
            Some(image) => (
                state.media.get_thumbnail_url(&image.media_id).await,
                state
                    .images
                    .latest_classification(image.id)
                    .await?
                    .map_or("unclassified", |c| c.verdict.as_str()),
            ),
            None => ("-".to_string(), "-"),
        };
        info!(
            feedback_id = %record.id,
            author = %record.author_display_name,
            %thumbnail,
            verdict,
            "recent approved feedback"
        );
    }

    let admin = state
        .auth
        .authenticate(&settings.admin.email, settings.admin.password.expose_secret())
        .await?;
    info!(admin = %admin.name, "startup checks passed");
    Ok(())
}
