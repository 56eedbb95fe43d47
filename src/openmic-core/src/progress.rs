//! Progress reporting hook shared by the writing session and the speech pipeline.

use std::sync::Arc;

use tracing::debug;

/// Observer invoked with `(stage_label, fraction_complete)`.
pub type ProgressSink = Arc<dyn Fn(&str, f32) + Send + Sync>;

/// Optional progress observer. Reports are dropped when no sink is set.
#[derive(Clone, Default)]
pub struct Progress {
    sink: Option<ProgressSink>,
}

impl Progress {
    pub fn new(sink: ProgressSink) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Report a step. `fraction` is clamped to `[0, 1]`.
    pub fn report(&self, stage: &str, fraction: f32) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        debug!(stage, fraction, "progress");
        if let Some(sink) = &self.sink {
            sink(stage, fraction);
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
