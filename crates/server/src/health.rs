use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use clarifier_core::flows::FlowRunner;
use clarifier_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    runner: Arc<FlowRunner>,
    db_pool: Option<DbPool>,
}

impl HealthState {
    pub fn new(runner: Arc<FlowRunner>, db_pool: Option<DbPool>) -> Self {
        Self { runner, db_pool }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub sessions: HealthCheck,
    pub database: HealthCheck,
    pub flows: Vec<String>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let sessions = sessions_check(&state.runner).await;
    let database = match &state.db_pool {
        Some(pool) => database_check(pool).await,
        None => HealthCheck {
            status: "skipped",
            detail: "sessions are kept in memory".to_string(),
        },
    };
    let ready = sessions.status == "ready" && database.status != "degraded";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "clarifier-server runtime initialized".to_string(),
        },
        sessions,
        database,
        flows: state.runner.flow_ids(),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn sessions_check(runner: &FlowRunner) -> HealthCheck {
    match runner.all_sessions().await {
        Ok(sessions) => HealthCheck {
            status: "ready",
            detail: format!("{} session(s) in store", sessions.len()),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("session store failed: {error}") }
        }
    }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use clarifier_core::flows::{BulletSummaryFlow, FlowRunner};
    use clarifier_core::session::InMemorySessionStore;
    use clarifier_db::{connect_with_settings, SqlSessionStore};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn memory_sessions_report_ready_and_skip_the_database() {
        let runner = FlowRunner::new(Arc::new(InMemorySessionStore::new()));
        runner.register_flow(BulletSummaryFlow::default());

        let (status, Json(payload)) =
            health(State(HealthState::new(Arc::new(runner), None))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "skipped");
        assert_eq!(payload.sessions.detail, "0 session(s) in store");
        assert_eq!(payload.flows, vec!["bullet_summary".to_string()]);
    }

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        clarifier_db::migrations::run_pending(&pool).await.expect("migrations");
        let runner = FlowRunner::new(Arc::new(SqlSessionStore::new(pool.clone())));

        let (status, Json(payload)) =
            health(State(HealthState::new(Arc::new(runner), Some(pool.clone())))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.sessions.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool");
        let runner = FlowRunner::new(Arc::new(SqlSessionStore::new(pool.clone())));
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState::new(Arc::new(runner), Some(pool)))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.sessions.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
