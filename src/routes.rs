use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    bot::category_label,
    cache::SlotState,
    reading::Reading,
    sensor::SnapshotSource,
    service::ReadingService,
};

// Shared application state
pub struct AppState<S: SnapshotSource> {
    pub service: Arc<ReadingService<S>>,
}

impl<S: SnapshotSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub cache: SlotState,
    pub refreshing: bool,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ReadingResponse {
    pub sensor_id: String,
    pub category_label: &'static str,
    #[serde(flatten)]
    pub reading: Reading,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

// Route handlers
pub async fn health<S: SnapshotSource>(State(state): State<AppState<S>>) -> Json<HealthResponse> {
    let cache = state.service.cache();
    Json(HealthResponse {
        status: "healthy".to_string(),
        cache: cache.state(state.service.now()),
        refreshing: cache.is_refreshing(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_reading<S: SnapshotSource>(
    State(state): State<AppState<S>>,
) -> Result<Json<ReadingResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.service.get_reading().await {
        Ok(reading) => Ok(Json(ReadingResponse {
            sensor_id: state.service.sensor_id().to_string(),
            category_label: category_label(reading.category),
            reading: (*reading).clone(),
        })),
        Err(e) => {
            tracing::error!("Reading unavailable: {}", e);
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new("Sensor data unavailable", "reading_unavailable")),
            ))
        }
    }
}

// Create the router
pub fn create_router<S: SnapshotSource>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/reading", get(get_reading::<S>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ReadingCache;
    use crate::error::ReadingError;
    use crate::service::testing::{snapshot, t0, FakeSource, ManualClock};
    use serde_json::Value;

    async fn serve(source: FakeSource) -> String {
        let service = ReadingService::new(
            Arc::new(source),
            Arc::new(ReadingCache::new(chrono::Duration::minutes(2))),
            Arc::new(ManualClock::new(t0())),
            "49489",
        );
        let router = create_router(AppState {
            service: Arc::new(service),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_reading_then_health_reports_fresh_cache() {
        let url = serve(FakeSource::always(Ok(snapshot(
            "50",
            r#"{"v":60.0,"v1":55.4}"#,
        ))))
        .await;

        let health: Value = reqwest::get(format!("{}/health", url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["cache"], "empty");

        let response = reqwest::get(format!("{}/reading", url)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["sensor_id"], "49489");
        assert_eq!(body["aqi_score"], 150.0);
        assert_eq!(body["category"], "SensitiveGroups");
        assert_eq!(body["category_label"], "Ризик для людей з респіраторними хворобами 🟡");

        let health: Value = reqwest::get(format!("{}/health", url))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["cache"], "fresh");
        assert_eq!(health["refreshing"], false);
    }

    #[tokio::test]
    async fn test_reading_failure_is_generic_503() {
        let url = serve(FakeSource::always(Err(ReadingError::MissingRecord))).await;

        let response = reqwest::get(format!("{}/reading", url)).await.unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "reading_unavailable");
        assert_eq!(body["error"], "Sensor data unavailable");
    }
}
