use std::sync::Arc;

use crate::config::Config;
use crate::screening::pipeline::ScreeningPipeline;
use crate::screening::progress::ProgressBoard;
use crate::store::ScreeningStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScreeningStore>,
    pub pipeline: Arc<ScreeningPipeline>,
    /// Same board the pipeline reports into; handlers read snapshots from it.
    pub progress: Arc<ProgressBoard>,
    pub config: Config,
}
