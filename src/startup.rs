use crate::chart::{BarChart, ChartRenderer};
use crate::config::Config;
use crate::db::{MemoryStore, PgStore, PollStore, init_db};
use crate::polls::{
    create_poll, delete_poll, list_polls, poll_detail, poll_results, reset_votes, vote,
};
use crate::sse::{SseSender, create_sse_broadcaster, poll_stats_sse};
use crate::stats::{
    get_statistic, overall_stats, poll_chart, poll_stats, refresh_statistic, search_polls,
};
use axum::{
    Json, Router,
    extract::Extension,
    http::{
        Method, StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub charts: Arc<dyn ChartRenderer>,
    pub events: SseSender,
}

impl AppState {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        AppState {
            store,
            charts: Arc::new(BarChart::default()),
            events: create_sse_broadcaster(),
        }
    }

    /// Connects to Postgres when `DATABASE_URL` is configured, otherwise
    /// falls back to the in-memory store.
    pub async fn from_config(config: &Config) -> Result<Self, sqlx::Error> {
        let store: Arc<dyn PollStore> = match &config.database_url {
            Some(url) => {
                let pool = init_db(url, config.max_connections).await?;
                info!("connected to PostgreSQL");
                let store = PgStore::new(pool);
                store.spawn_health_check();
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set, polls are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(AppState::new(store))
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/polls", get(list_polls).post(create_poll))
        .route("/polls/search", get(search_polls))
        .route("/polls/:question_id", get(poll_detail).delete(delete_poll))
        .route("/polls/:question_id/results", get(poll_results))
        .route("/polls/:question_id/vote", post(vote))
        .route("/polls/:question_id/reset", post(reset_votes))
        .route("/polls/:question_id/stats", get(poll_stats))
        .route("/polls/:question_id/stats/stream", get(poll_stats_sse))
        .route("/polls/:question_id/chart", get(poll_chart))
        .route(
            "/polls/:question_id/statistic",
            get(get_statistic).post(refresh_statistic),
        )
        .route("/stats/overall", get(overall_stats))
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::mirror_request())
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .layer(TraceLayer::new_for_http())
        .fallback(handler_404)
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "Not found", "details": "nothing to see here"})),
    )
}
