//! HTTP surface for the research pipeline: `POST /research` (streaming)
//! plus its supporting endpoints - public probes unguarded, everything
//! else under `DefaultBodyLimit`.

pub mod error;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::ApiState;

/// Router for API functionality, version 1.
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    let public = Router::new()
        .route("/live", get(routes::liveness::live))
        .route("/ready", get(routes::readiness::ready));

    let research = Router::new().route(
        "/research",
        post(routes::research::research).layer(DefaultBodyLimit::max(
            app_state.config.ingest_max_body_bytes,
        )),
    );

    let rest = Router::new()
        .route(
            "/ingest",
            post(routes::ingest::ingest).layer(DefaultBodyLimit::max(
                app_state.config.ingest_max_body_bytes,
            )),
        )
        .route("/search", post(routes::search::search))
        .route("/verify", post(routes::verify::verify))
        .route("/source/:id", get(routes::source::get_source))
        .route(
            "/ingest-job",
            get(routes::ingest_job::ingest_job).post(routes::ingest_job::ingest_job),
        );

    public
        .merge(research)
        .merge(rest)
        .layer(TraceLayer::new_for_http())
}
