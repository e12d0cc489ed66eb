//! # Downstream Coordinator
//!
//! Receives the archived reference of every finished room and drives the
//! quality analysis that follows. Notification is awaited by the handoff but
//! its failure is only ever logged.
//!
//! ## Implementations:
//! - **HttpCoordinator**: POSTs the reference to the coordinator service
//! - **LogOnlyCoordinator**: used when no coordinator URL is configured

use crate::archive::storage::ArchivedAudioReference;
use crate::config::DownstreamConfig;
use crate::error::NotifyError;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[async_trait]
pub trait DownstreamCoordinator: Send + Sync {
    async fn set_monitoring_reference(
        &self,
        room_id: &str,
        reference: &ArchivedAudioReference,
    ) -> Result<(), NotifyError>;
}

#[derive(Debug, Serialize)]
struct MonitoringReferenceRequest<'a> {
    call_session_id: &'a str,
    monitoring_reference: &'a ArchivedAudioReference,
}

/// Notifies the coordinator over HTTP.
///
/// ## Request:
/// `POST <coordinator_url>/api/internal/monitoring-reference`
/// ```json
/// { "call_session_id": "room-1", "monitoring_reference": { "file_id": "...", ... } }
/// ```
pub struct HttpCoordinator {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpCoordinator {
    /// Build the client with the request timeout applied.
    ///
    /// Fails only if the TLS backend cannot be initialised.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!(
                "{}/api/internal/monitoring-reference",
                base_url.trim_end_matches('/')
            ),
            client,
        })
    }

    #[cfg(test)]
    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DownstreamCoordinator for HttpCoordinator {
    async fn set_monitoring_reference(
        &self,
        room_id: &str,
        reference: &ArchivedAudioReference,
    ) -> Result<(), NotifyError> {
        let body = MonitoringReferenceRequest {
            call_session_id: room_id,
            monitoring_reference: reference,
        };

        debug!(room_id = %room_id, endpoint = %self.endpoint, "Sending monitoring reference");
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        info!(room_id = %room_id, file_id = %reference.file_id, "Coordinator accepted monitoring reference");
        Ok(())
    }
}

/// Stands in for the coordinator when none is configured.
pub struct LogOnlyCoordinator;

#[async_trait]
impl DownstreamCoordinator for LogOnlyCoordinator {
    async fn set_monitoring_reference(
        &self,
        room_id: &str,
        reference: &ArchivedAudioReference,
    ) -> Result<(), NotifyError> {
        info!(
            room_id = %room_id,
            file_id = %reference.file_id,
            path = %reference.file_path,
            "No downstream coordinator configured, monitoring reference logged only"
        );
        Ok(())
    }
}

/// Pick the coordinator for the configured downstream.
///
/// An HTTP client that cannot be built is logged and replaced by the
/// log-only coordinator; a client without the configured timeout is never used.
pub fn from_config(config: &DownstreamConfig) -> Arc<dyn DownstreamCoordinator> {
    let Some(url) = config.coordinator_url.as_deref() else {
        return Arc::new(LogOnlyCoordinator);
    };

    match HttpCoordinator::new(url, Duration::from_secs(config.timeout_secs)) {
        Ok(coordinator) => Arc::new(coordinator),
        Err(e) => {
            warn!(
                coordinator_url = %url,
                error = %e,
                "Could not build coordinator HTTP client, monitoring references will only be logged"
            );
            Arc::new(LogOnlyCoordinator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reference() -> ArchivedAudioReference {
        ArchivedAudioReference {
            file_id: "f-1".to_string(),
            file_path: "/tmp/f-1.wav".to_string(),
            duration_seconds: 1.5,
            file_size_bytes: 48044,
            format: "wav".to_string(),
            created_at: Utc::now(),
            call_session_id: "room-1".to_string(),
            participant_ids: vec!["alice".to_string()],
        }
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let coordinator = HttpCoordinator::new("http://localhost:8002/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            coordinator.endpoint(),
            "http://localhost:8002/api/internal/monitoring-reference"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let reference = reference();
        let body = MonitoringReferenceRequest {
            call_session_id: "room-1",
            monitoring_reference: &reference,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["call_session_id"], "room-1");
        assert_eq!(json["monitoring_reference"]["file_id"], "f-1");
        assert_eq!(json["monitoring_reference"]["participant_ids"][0], "alice");
    }

    #[tokio::test]
    async fn test_log_only_always_succeeds() {
        assert!(LogOnlyCoordinator
            .set_monitoring_reference("room-1", &reference())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_coordinator_is_a_request_error() {
        // port 9 (discard) on loopback is expected to refuse connections
        let coordinator = HttpCoordinator::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = coordinator.set_monitoring_reference("room-1", &reference()).await;
        assert!(matches!(result, Err(NotifyError::Request(_))));
    }

    #[tokio::test]
    async fn test_from_config_without_url_logs_only() {
        let coordinator = from_config(&DownstreamConfig {
            coordinator_url: None,
            timeout_secs: 1,
        });
        assert!(coordinator
            .set_monitoring_reference("room-1", &reference())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_from_config_with_url_notifies_over_http() {
        let coordinator = from_config(&DownstreamConfig {
            coordinator_url: Some("http://127.0.0.1:9".to_string()),
            timeout_secs: 2,
        });
        let result = coordinator.set_monitoring_reference("room-1", &reference()).await;
        assert!(matches!(result, Err(NotifyError::Request(_))));
    }
}
