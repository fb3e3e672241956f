pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::jobs::handlers as jobs;
use crate::screening::handlers as screening;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Jobs API
        .route(
            "/api/v1/jobs",
            post(jobs::handle_create_job).get(jobs::handle_list_jobs),
        )
        .route("/api/v1/jobs/:job_name", get(jobs::handle_get_job))
        // Screening API
        .route(
            "/api/v1/jobs/:job_name/screenings",
            post(screening::handle_screen).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/jobs/:job_name/candidates",
            get(screening::handle_list_candidates).delete(screening::handle_clean_candidates),
        )
        .route("/api/v1/resumes/:id", get(screening::handle_get_resume))
        .route(
            "/api/v1/screenings/:batch_key/progress",
            get(screening::handle_progress),
        )
        .route(
            "/api/v1/screenings/:batch_key",
            delete(screening::handle_reset),
        )
        .with_state(state)
}
