//! Remote trip-write endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::queue::OfflineTripRecord;

/// Permanent storage reference for one uploaded photo, keyed by file name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePhotoRef {
    pub file_name: String,
    pub storage_path: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: String,
}

/// Successful response of the remote trip-write endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSyncResponse {
    /// Identifier assigned by the remote authority. May differ from the
    /// locally generated one; the local entry adopts it.
    pub trip_id: String,
    #[serde(default)]
    pub photos_uploaded: usize,
    #[serde(default)]
    pub photos: Vec<RemotePhotoRef>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({0}): {1}")]
    Api(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl SyncError {
    /// Human-readable message surfaced to the user and persisted on the
    /// queue record.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

/// Abstract contract of the remote authority.
#[async_trait]
pub trait TripWriteApi: Send + Sync {
    /// Submit one trip report with its raw photo payloads. Failure is a
    /// rejected call with a human-readable message; the caller converts it
    /// into a queued, retryable record.
    async fn submit_trip(&self, record: &OfflineTripRecord) -> Result<TripSyncResponse, SyncError>;
}

#[derive(Serialize)]
struct SyncRequestBody<'a> {
    trip: &'a tripdesk_trips::TripReportInput,
    attachments: &'a [crate::queue::QueuedPhoto],
}

/// HTTP implementation of [`TripWriteApi`].
pub struct HttpTripApi {
    api_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpTripApi {
    pub fn new(api_url: String) -> Self {
        Self {
            api_url,
            token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_token(api_url: String, token: String) -> Self {
        Self {
            api_url,
            token: Some(token),
            client: reqwest::Client::new(),
        }
    }

    /// Pull a human-readable detail out of an error response body.
    fn error_detail(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
            for key in ["detail", "message"] {
                if let Some(detail) = json.get(key).and_then(|v| v.as_str()) {
                    return detail.to_string();
                }
            }
        }
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    }
}

#[async_trait]
impl TripWriteApi for HttpTripApi {
    async fn submit_trip(&self, record: &OfflineTripRecord) -> Result<TripSyncResponse, SyncError> {
        let url = format!("{}/trips/sync", self.api_url);
        let body = SyncRequestBody {
            trip: &record.payload,
            attachments: &record.attachments,
        };

        // Bounded exponential backoff on retryable failures; a 4xx is not
        // retried here (it will stay queued and be retried by a later drain).
        let max_retries = 3;
        let mut delay = Duration::from_secs(1);

        for attempt in 0..=max_retries {
            let mut req = self.client.post(&url).json(&body);
            if let Some(token) = &self.token {
                req = req.bearer_auth(token);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .json::<TripSyncResponse>()
                            .await
                            .map_err(|e| SyncError::Parse(e.to_string()));
                    }

                    let text = resp.text().await.unwrap_or_default();
                    let detail = Self::error_detail(status, &text);
                    if status.is_server_error() && attempt < max_retries {
                        tracing::warn!(
                            booking_id = %record.payload.booking_id,
                            %status,
                            attempt = attempt + 1,
                            "trip submit failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }
                    return Err(SyncError::Api(status.as_u16(), detail));
                }
                Err(e) => {
                    if attempt < max_retries {
                        tracing::warn!(
                            booking_id = %record.payload.booking_id,
                            error = %e,
                            attempt = attempt + 1,
                            "network error submitting trip, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }
                    return Err(SyncError::Network(e.to_string()));
                }
            }
        }

        Err(SyncError::Network("max retries exceeded".to_string()))
    }
}
