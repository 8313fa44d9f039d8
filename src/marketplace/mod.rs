//! Marketplace Cache (C7): zip download/extraction, classification, and
//! on-disk persistence for skill bundles.

pub mod cache;
pub mod client;
pub mod model;

pub use cache::{inline_images, new_metadata, prepare, set_was_installed, store, store_from_dir, ExtractedBundle};
pub use client::{HttpMarketplaceClient, MarketplaceClient};
pub use model::{SkillMetadata, SkillSource};
