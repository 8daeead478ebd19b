//! Progress-callback trait for per-image enrichment events.
//!
//! Inject an [`Arc<dyn EnrichmentProgressCallback>`] via
//! [`crate::config::ParseConfigBuilder::progress_callback`] to observe the
//! enrichment stage as it resolves each image.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docparse::{EnrichmentProgressCallback, ParseConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl EnrichmentProgressCallback for CountingCallback {
//!     fn on_image_complete(&self, image_id: &str, _total: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("image {image_id} done ({n})");
//!     }
//! }
//!
//! let config = ParseConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the enrichment stage as it processes each image.
///
/// Images are processed concurrently, so methods may be called from several
/// tasks at once. All methods default to no-ops.
pub trait EnrichmentProgressCallback: Send + Sync {
    /// Called once before any image is fetched.
    fn on_enrichment_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called after an image acquires its concurrency permit.
    fn on_image_start(&self, image_id: &str, total_images: usize) {
        let _ = (image_id, total_images);
    }

    /// Called when an image is stored and attached (OCR or caption may still
    /// have degraded).
    fn on_image_complete(&self, image_id: &str, total_images: usize) {
        let _ = (image_id, total_images);
    }

    /// Called when an image is dropped from its chunk.
    fn on_image_error(&self, image_id: &str, total_images: usize, error: &str) {
        let _ = (image_id, total_images, error);
    }

    /// Called once after every image finished or was abandoned.
    fn on_enrichment_complete(&self, total_images: usize, attached: usize) {
        let _ = (total_images, attached);
    }
}

/// A no-op implementation, the default when no callback is configured.
pub struct NoopProgressCallback;

impl EnrichmentProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ParseConfig`].
pub type ProgressCallback = Arc<dyn EnrichmentProgressCallback>;
