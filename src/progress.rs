//! Progress-callback trait for per-stage pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PrepConfigBuilder::progress_callback`] to receive events
//! as each stage of a pipeline runs.
//!
//! Callers can forward events to a channel, a terminal progress bar or a log
//! without the library knowing how the host application reports progress.
//! The trait is `Send + Sync` because batch runs process several sources
//! concurrently.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocrprep::{PipelineProgressCallback, PrepConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, source: &str, stage_num: usize, total: usize, path: &Path) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{source}: stage {stage_num}/{total} → {}", path.display());
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = PrepConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the pipeline orchestrator as it runs each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `source` is the source image's file name and
/// `stage_num` is 1-indexed.
///
/// # Thread safety
///
/// During a batch, events for different sources may arrive concurrently from
/// different tasks. Events for one source are always delivered in order.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once the source has been validated, before the first stage.
    fn on_pipeline_start(&self, source: &str, total_stages: usize) {
        let _ = (source, total_stages);
    }

    /// Called just before a stage's transform runs.
    fn on_stage_start(&self, source: &str, stage_num: usize, total_stages: usize, stage: &str) {
        let _ = (source, stage_num, total_stages, stage);
    }

    /// Called after a stage's artifact has been written.
    fn on_stage_complete(&self, source: &str, stage_num: usize, total_stages: usize, path: &Path) {
        let _ = (source, stage_num, total_stages, path);
    }

    /// Called when a stage fails. No further stages run for this source.
    fn on_stage_error(&self, source: &str, stage_num: usize, total_stages: usize, error: &str) {
        let _ = (source, stage_num, total_stages, error);
    }

    /// Called once after the run ends, successfully or not.
    ///
    /// `completed` is the number of stages whose artifact was written.
    fn on_pipeline_complete(&self, source: &str, total_stages: usize, completed: usize) {
        let _ = (source, total_stages, completed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PrepConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        started_total: AtomicUsize,
        completed_total: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_pipeline_start(&self, _source: &str, total_stages: usize) {
            self.started_total.store(total_stages, Ordering::SeqCst);
        }

        fn on_stage_start(&self, _source: &str, _n: usize, _total: usize, _stage: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _source: &str, _n: usize, _total: usize, _path: &Path) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, _source: &str, _n: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pipeline_complete(&self, _source: &str, _total: usize, completed: usize) {
            self.completed_total.store(completed, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_pipeline_start("a.png", 5);
        cb.on_stage_start("a.png", 1, 5, "grayscale");
        cb.on_stage_complete("a.png", 1, 5, Path::new("/images/grayscale/gray_a.png"));
        cb.on_stage_error("a.png", 2, 5, "boom");
        cb.on_pipeline_complete("a.png", 5, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_pipeline_start("r.png", 3);
        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);

        tracker.on_stage_start("r.png", 1, 3, "grayscale");
        tracker.on_stage_complete("r.png", 1, 3, Path::new("/x/1.png"));
        tracker.on_stage_start("r.png", 2, 3, "threshold");
        tracker.on_stage_complete("r.png", 2, 3, Path::new("/x/2.png"));
        tracker.on_stage_start("r.png", 3, 3, "equalize");
        tracker.on_stage_error("r.png", 3, 3, "expected a single-channel image");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);

        tracker.on_pipeline_complete("r.png", 3, 2);
        assert_eq!(tracker.completed_total.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_pipeline_start("a.png", 1);
        cb.on_stage_start("a.png", 1, 1, "invert");
    }
}
