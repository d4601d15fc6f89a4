//! mycocheck/crates/mc-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Mycocheck.

pub mod error;
pub mod feedback;
pub mod images;
pub mod memory;
pub mod models;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use feedback::FeedbackStore;
pub use images::{ImageService, ImageUrls};
pub use models::*;
pub use traits::*;
