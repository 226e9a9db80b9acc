//! The `/healthz`-style HTTP responder (spec §6).

use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::{checker::HealthChecker, config::HealthConfig, error::HealthError};

pub struct HealthServer {
    listener: TcpListener,
    router: Router,
}

impl HealthServer {
    /// # Errors
    /// Returns [`HealthError::BindError`] if the listen address can't be
    /// bound.
    pub async fn new(
        config: &HealthConfig,
        checker: Arc<HealthChecker>,
    ) -> Result<Self, HealthError> {
        let listener =
            TcpListener::bind(&config.listen_address)
                .await
                .map_err(|e| HealthError::BindError {
                    address: config.listen_address.clone(),
                    source: e,
                })?;

        tracing::info!(address = %config.listen_address, "health server bound");

        let router = Router::new()
            .route("/health/live", get(liveness))
            .route("/health/ready", get(readiness))
            .with_state(checker)
            .layer(TimeoutLayer::new(Duration::from_secs(1)));

        Ok(Self { listener, router })
    }

    /// Serve until `shutdown` fires.
    ///
    /// # Errors
    /// Returns [`HealthError::ServerError`] if the underlying HTTP
    /// server returns an I/O error.
    pub async fn serve(
        self,
        shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), HealthError> {
        let mut shutdown = shutdown;
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("health server received shutdown signal");
            })
            .await
            .map_err(|e| HealthError::ServerError(e.to_string()))
    }
}

async fn liveness(State(checker): State<Arc<HealthChecker>>) -> Response {
    if checker.is_alive() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response()
    }
}

async fn readiness(State(checker): State<Arc<HealthChecker>>) -> Response {
    let status = checker.status();
    if status.ready {
        (StatusCode::OK, Json(status)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_common::EmergencyFlag;

    #[tokio::test]
    async fn liveness_always_passes() {
        let checker = Arc::new(HealthChecker::new(EmergencyFlag::new()));
        let response = liveness(State(checker)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_fails_until_ready() {
        let checker = Arc::new(HealthChecker::new(EmergencyFlag::new()));
        let response = readiness(State(checker)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
