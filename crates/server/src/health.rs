use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use proptalk_db::repositories::PropertyRepository;
use proptalk_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    properties: Arc<dyn PropertyRepository>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, properties: Arc<dyn PropertyRepository>) -> Self {
        Self { db_pool, properties }
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
    pub database: HealthCheck,
    pub inventory: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

/// 503 only when the database is unreachable. An empty inventory still
/// serves conversations (every search ends in market guidance), so it
/// degrades the status without failing the check.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let inventory = if database.status == "ready" {
        inventory_check(state.properties.as_ref()).await
    } else {
        HealthCheck { status: "unknown", detail: "database unavailable".to_string() }
    };

    let database_ready = database.status == "ready";
    let ready = database_ready && inventory.status == "ready";
    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        inventory,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if database_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn inventory_check(properties: &dyn PropertyRepository) -> HealthCheck {
    match properties.count().await {
        Ok(0) => HealthCheck {
            status: "empty",
            detail: "no properties loaded; run `proptalk seed`".to_string(),
        },
        Ok(count) => HealthCheck { status: "ready", detail: format!("{count} properties listed") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("inventory count failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::{extract::State, Json};
    use proptalk_db::fixtures::DemoInventory;
    use proptalk_db::repositories::SqlPropertyRepository;
    use proptalk_db::{connect_with_settings, migrations, DbPool};
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn state(pool: &DbPool) -> HealthState {
        HealthState::new(pool.clone(), Arc::new(SqlPropertyRepository::new(pool.clone())))
    }

    #[tokio::test]
    async fn ready_when_database_reachable_and_inventory_seeded() {
        let pool = migrated_pool().await;
        DemoInventory::load(&SqlPropertyRepository::new(pool.clone())).await.expect("seed");

        let (status, Json(payload)) = health(State(state(&pool))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.inventory.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn empty_inventory_degrades_without_failing_the_check() {
        let pool = migrated_pool().await;

        let (status, Json(payload)) = health(State(state(&pool))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.inventory.status, "empty");

        pool.close().await;
    }

    #[tokio::test]
    async fn service_unavailable_when_database_is_closed() {
        let pool = migrated_pool().await;
        let health_state = state(&pool);
        pool.close().await;

        let (status, Json(payload)) = health(State(health_state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.inventory.status, "unknown");
    }

    #[tokio::test]
    async fn router_serves_health_route() {
        let pool = migrated_pool().await;

        let response = router(state(&pool))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(payload["status"], "degraded");
        assert_eq!(payload["database"]["status"], "ready");
        assert!(payload["checked_at"].is_string());

        pool.close().await;
    }
}
