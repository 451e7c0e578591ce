//! Synchronization orchestrator.
//!
//! Owns the offline queue, the day store, the remote API client and the
//! connectivity monitor, and implements the full submission lifecycle:
//! validate, persist pending, branch once on connectivity, and drain the
//! queue when the network comes back.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use tripdesk_core::{TripId, UserId};
use tripdesk_trips::{
    next_booking_id, SyncSource, SyncStatus, TripAttachment, TripChecklist, TripEntry,
    TripFormSnapshot, BOOKING_PREFIX,
};

use crate::api::{TripSyncResponse, TripWriteApi};
use crate::connectivity::ConnectivityMonitor;
use crate::notify::{Notification, NotificationSink};
use crate::photos::CapturedBatch;
use crate::queue::{OfflineQueue, OfflineTripRecord, QueueStatus, QueuedPhoto};
use crate::store::{DayStore, TripsSection};

/// One submission as handed over by the capture surface.
pub struct TripSubmission {
    pub date: NaiveDate,
    pub form: TripFormSnapshot,
    pub checklist: TripChecklist,
    pub photos: CapturedBatch,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The form is incomplete. The photo batch is handed back so the user
    /// can fix the form without recapturing.
    #[error("missing required fields: {}", missing.join(", "))]
    Validation {
        missing: Vec<String>,
        photos: CapturedBatch,
    },
    /// A submission carries no photos.
    #[error("at least one photo is required")]
    NoPhotos,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Terminal outcome of a submission. Every variant leaves the entry
/// persisted; none of them loses the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Remote write confirmed; entry is synced.
    Synced,
    /// No connectivity; entry pending, record queued for the next drain.
    QueuedOffline,
    /// Remote write rejected; entry failed, record queued for retry.
    FailedQueued,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub success: usize,
    pub failed: usize,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Outcome of a drain trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    /// Another drain already holds the guard; this trigger was rejected,
    /// not coalesced.
    AlreadyRunning,
    Offline,
    QueueEmpty,
}

/// Orchestrates submissions and queue drains over the durable stores.
pub struct SyncOrchestrator {
    queue: OfflineQueue,
    store: Arc<dyn DayStore>,
    api: Arc<dyn TripWriteApi>,
    connectivity: ConnectivityMonitor,
    notifier: Arc<dyn NotificationSink>,
    identity: Option<UserId>,
    booking_prefix: String,
    drain_guard: Mutex<()>,
    shutdown: Notify,
}

impl SyncOrchestrator {
    pub fn new(
        queue: OfflineQueue,
        store: Arc<dyn DayStore>,
        api: Arc<dyn TripWriteApi>,
        connectivity: ConnectivityMonitor,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            queue,
            store,
            api,
            connectivity,
            notifier,
            identity: None,
            booking_prefix: BOOKING_PREFIX.to_string(),
            drain_guard: Mutex::new(()),
            shutdown: Notify::new(),
        }
    }

    /// Attribute subsequent submissions to this user.
    pub fn with_identity(mut self, user: UserId) -> Self {
        self.identity = Some(user);
        self
    }

    pub fn with_booking_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.booking_prefix = prefix.into();
        self
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Submit one trip report.
    ///
    /// Validation happens before anything is persisted. After that the entry
    /// is written pending, connectivity is checked exactly once, and the
    /// submission either syncs, queues offline, or queues failed. Preview
    /// handles are released on every path out of this function past
    /// validation.
    pub async fn submit(&self, submission: TripSubmission) -> Result<SubmitOutcome, SubmitError> {
        let TripSubmission {
            date,
            form,
            checklist,
            photos,
        } = submission;

        let missing = form.missing_required_fields();
        if !missing.is_empty() {
            // Rejects before any persistence or preview release.
            let missing: Vec<String> = missing.into_iter().map(str::to_string).collect();
            self.notifier.notify(Notification::error(
                "Missing required fields",
                format!("Please fill: {}", missing.join(", ")),
            ));
            return Err(SubmitError::Validation { missing, photos });
        }
        if photos.photos.is_empty() {
            self.notifier.notify(Notification::error(
                "No photos attached",
                "Attach at least one photo before submitting",
            ));
            return Err(SubmitError::NoPhotos);
        }

        let mut section = self.store.read_trips(date).await?;
        let queued = self.queue.load().await?;

        let booking_id = next_booking_id(
            &self.booking_prefix,
            date,
            section.entries.iter().map(|e| e.booking_id.as_str()),
            queued.iter().map(|r| r.payload.booking_id.as_str()),
        );

        let attachments: Vec<TripAttachment> = photos
            .photos
            .iter()
            .map(|p| TripAttachment {
                id: p.id.clone(),
                name: p.name.clone(),
                mime_type: p.mime_type.clone(),
                size: p.size,
                storage_path: None,
            })
            .collect();
        let queued_photos: Vec<QueuedPhoto> = photos
            .photos
            .iter()
            .map(|p| QueuedPhoto {
                id: p.id.clone(),
                name: p.name.clone(),
                mime_type: p.mime_type.clone(),
                size: p.size,
                base64: p.base64.clone(),
            })
            .collect();

        let mut entry = TripEntry::compose(
            TripId::new(),
            booking_id,
            date,
            form,
            checklist,
            attachments,
            self.identity,
            Utc::now(),
        );

        // The entry is on disk as pending before any network attempt.
        section.upsert_entry(entry.clone());
        self.persist_section(date, section).await?;

        if self.connectivity.is_offline() {
            let record = OfflineTripRecord {
                id: entry.id,
                payload: entry.to_report_input(SyncSource::OfflineCache),
                attachments: queued_photos,
                created_at: entry.created_at,
                status: QueueStatus::Pending,
                error: None,
                last_attempt_at: None,
            };
            self.queue.upsert(&record).await?;

            tracing::info!(booking_id = %entry.booking_id, "trip queued offline");
            self.notifier.notify(Notification::info(
                "Saved offline",
                format!(
                    "Trip {} will sync when connection returns",
                    entry.booking_id
                ),
            ));
            photos.release_previews();
            return Ok(SubmitOutcome::QueuedOffline);
        }

        let record = OfflineTripRecord {
            id: entry.id,
            payload: entry.to_report_input(SyncSource::Web),
            attachments: queued_photos,
            created_at: entry.created_at,
            status: QueueStatus::Pending,
            error: None,
            last_attempt_at: None,
        };

        match self.api.submit_trip(&record).await {
            Ok(response) => {
                let local_id = entry.id;
                self.adopt_response(&mut entry, &response);
                entry
                    .mark_sync_status(SyncStatus::Synced)
                    .map_err(anyhow::Error::from)?;
                self.replace_entry(date, local_id, entry.clone()).await?;
                // Clears any stale record from an earlier attempt with the
                // same id.
                self.queue.remove(local_id).await?;

                tracing::info!(booking_id = %entry.booking_id, "trip synced");
                self.notifier.notify(Notification::success(
                    "Trip submitted",
                    format!("Trip {} saved", entry.booking_id),
                ));
                photos.release_previews();
                Ok(SubmitOutcome::Synced)
            }
            Err(err) => {
                let message = err.user_message();
                let mut failed = record;
                failed.status = QueueStatus::Failed;
                failed.error = Some(message.clone());
                failed.last_attempt_at = Some(Utc::now());
                self.queue.upsert(&failed).await?;

                entry
                    .mark_sync_status(SyncStatus::Failed)
                    .map_err(anyhow::Error::from)?;
                self.replace_entry(date, entry.id, entry.clone()).await?;

                tracing::warn!(booking_id = %entry.booking_id, error = %message, "trip submit failed, queued for retry");
                self.notifier.notify(Notification::error(
                    "Submission failed",
                    format!("Trip {} queued for retry: {}", entry.booking_id, message),
                ));
                photos.release_previews();
                Ok(SubmitOutcome::FailedQueued)
            }
        }
    }

    /// Drain the offline queue in FIFO order.
    ///
    /// Each record is attempted once per drain. Success removes the record
    /// and marks the entry synced; failure keeps the record queued with the
    /// fresh error and marks the entry failed. After the batch, entries
    /// whose record disappeared from the durable queue under a concurrent
    /// writer are reconciled to synced.
    pub async fn drain(&self) -> anyhow::Result<DrainOutcome> {
        let Ok(_guard) = self.drain_guard.try_lock() else {
            tracing::debug!("drain already running, trigger rejected");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        if self.connectivity.is_offline() {
            return Ok(DrainOutcome::Offline);
        }

        let records = self.queue.load().await?;
        if records.is_empty() {
            return Ok(DrainOutcome::QueueEmpty);
        }

        tracing::info!(count = records.len(), "draining offline queue");
        let mut report = DrainReport::default();
        let mut touched_dates: HashSet<NaiveDate> = HashSet::new();

        for record in &records {
            touched_dates.insert(record.payload.date);
            match self.api.submit_trip(record).await {
                Ok(response) => {
                    self.queue.remove(record.id).await?;
                    self.patch_synced(record, &response).await?;
                    report.success += 1;
                }
                Err(err) => {
                    let message = err.user_message();
                    tracing::warn!(
                        booking_id = %record.payload.booking_id,
                        error = %message,
                        "queued trip failed to sync"
                    );
                    self.queue.mark_failed(record.id, &message).await?;
                    self.patch_status(record.payload.date, record.id, SyncStatus::Failed)
                        .await?;
                    report.failed += 1;
                }
            }
        }

        // Another writer may have drained records concurrently. Anything
        // still marked pending or failed locally but absent from the durable
        // queue has in fact been synced.
        let remaining: HashSet<TripId> = self.queue.load().await?.iter().map(|r| r.id).collect();
        for date in touched_dates {
            let mut section = self.store.read_trips(date).await?;
            let mut changed = false;
            for entry in &mut section.entries {
                if entry.sync_status != SyncStatus::Synced && !remaining.contains(&entry.id) {
                    entry.mark_sync_status(SyncStatus::Synced)?;
                    changed = true;
                }
            }
            if changed {
                self.persist_section(date, section).await?;
            }
        }

        if report.is_clean() {
            self.notifier.notify(Notification::success(
                "Sync complete",
                format!("{} trip(s) synced", report.success),
            ));
        } else {
            self.notifier.notify(Notification::error(
                "Sync incomplete",
                format!(
                    "{} synced, {} still queued",
                    report.success, report.failed
                ),
            ));
        }

        Ok(DrainOutcome::Completed(report))
    }

    /// Spawn the background task that drains the queue whenever
    /// connectivity transitions to online. Stop it with [`Self::shutdown`].
    pub fn spawn_reconnect_listener(self: Arc<Self>) -> JoinHandle<()> {
        let this = self;
        let mut rx = this.connectivity.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.shutdown.notified() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if rx.borrow_and_update().is_online() {
                            tracing::info!("connection restored, triggering queue drain");
                            if let Err(e) = this.drain().await {
                                tracing::error!(error = %e, "reconnect drain failed");
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    async fn persist_section(&self, date: NaiveDate, mut section: TripsSection) -> anyhow::Result<()> {
        section.trip_count = section.entries.len();
        section.pending_sync_count = section
            .entries
            .iter()
            .filter(|e| e.sync_status != SyncStatus::Synced)
            .count();
        self.store.write_trips(date, &section).await
    }

    /// Replace the entry stored under `previous_id` with `entry`, which may
    /// carry a server-assigned id.
    async fn replace_entry(
        &self,
        date: NaiveDate,
        previous_id: TripId,
        entry: TripEntry,
    ) -> anyhow::Result<()> {
        let mut section = self.store.read_trips(date).await?;
        section.entries.retain(|e| e.id != previous_id);
        section.upsert_entry(entry);
        self.persist_section(date, section).await
    }

    async fn patch_status(
        &self,
        date: NaiveDate,
        id: TripId,
        status: SyncStatus,
    ) -> anyhow::Result<()> {
        let mut section = self.store.read_trips(date).await?;
        if let Some(entry) = section.entries.iter_mut().find(|e| e.id == id) {
            entry.mark_sync_status(status)?;
        }
        self.persist_section(date, section).await
    }

    async fn patch_synced(
        &self,
        record: &OfflineTripRecord,
        response: &TripSyncResponse,
    ) -> anyhow::Result<()> {
        let date = record.payload.date;
        let mut section = self.store.read_trips(date).await?;
        if let Some(entry) = section.entries.iter_mut().find(|e| e.id == record.id) {
            self.adopt_response(entry, response);
            entry.mark_sync_status(SyncStatus::Synced)?;
        }
        self.persist_section(date, section).await
    }

    /// Fold the remote response into a local entry: adopt the server trip
    /// id when it parses and differs, and merge photo storage paths by
    /// file name.
    fn adopt_response(&self, entry: &mut TripEntry, response: &TripSyncResponse) {
        match response.trip_id.parse::<TripId>() {
            Ok(remote_id) => {
                if remote_id != entry.id {
                    tracing::debug!(local = %entry.id, remote = %remote_id, "adopting server trip id");
                    entry.id = remote_id;
                }
            }
            Err(_) => {
                tracing::warn!(remote = %response.trip_id, "server trip id is not a UUID, keeping local id");
            }
        }
        entry.merge_storage_paths(
            response
                .photos
                .iter()
                .map(|p| (p.file_name.as_str(), p.storage_path.as_str())),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_report_cleanliness() {
        assert!(DrainReport { success: 3, failed: 0 }.is_clean());
        assert!(!DrainReport { success: 2, failed: 1 }.is_clean());
        assert!(DrainReport::default().is_clean());
    }
}
