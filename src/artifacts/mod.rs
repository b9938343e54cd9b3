//! Artifact rendering and storage
//!
//! - `renderer`: raw-signal PNG via plotters + image
//! - `store`: the [`BlobStore`] seam with local-directory and HTTP backends

pub mod renderer;
pub mod store;

pub use renderer::{SignalRenderer, PNG_CONTENT_TYPE};
pub use store::{new_key, store_artifact, store_from_config, BlobStore, HttpBlobStore, LocalBlobStore, StoreError};
