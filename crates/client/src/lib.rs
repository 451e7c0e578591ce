//! `tripdesk-client`
//!
//! **Responsibility:** the offline-first trip submission and synchronization
//! engine.
//!
//! This crate provides:
//! - Photo capture pipeline (durable base64 payloads + revocable previews)
//! - Durable SQLite offline queue for not-yet-confirmed submissions
//! - Date-scoped local aggregate store for confirmed entries
//! - Remote trip-write API client
//! - Connectivity monitoring with a reconnect signal
//! - The synchronization orchestrator tying all of it together
//!
//! The remote API remains the authority; the local store and queue exist so
//! a submission is never lost to connectivity.

pub mod api;
pub mod connectivity;
pub mod notify;
pub mod orchestrator;
pub mod photos;
pub mod queue;
pub mod store;

pub use api::{HttpTripApi, RemotePhotoRef, SyncError, TripSyncResponse, TripWriteApi};
pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use notify::{Notification, NotificationKind, NotificationSink, TracingNotifier};
pub use orchestrator::{
    DrainOutcome, DrainReport, SubmitError, SubmitOutcome, SyncOrchestrator, TripSubmission,
};
pub use photos::{CapturedBatch, CapturedPhoto, CaptureError, PhotoCandidate, PhotoPipeline, PreviewRegistry};
pub use queue::{OfflineQueue, OfflineTripRecord, QueuedPhoto, QueueStatus};
pub use store::{DayStore, SqliteDayStore, TripsSection};
