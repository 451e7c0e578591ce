//! Trip entries, form snapshots, and the sync-status state machine.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tripdesk_core::{DomainError, DomainResult, TripId, UserId};

use crate::checklist::{TripChecklist, TripStatus};

/// Mutable, user-edited trip metadata. Pure value object; no identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TripFormSnapshot {
    pub source_ref: String,
    pub booking_source: String,
    pub supplier: String,
    pub client_name: String,
    pub driver_name: String,
    pub car_type: String,
    pub parking_location: String,
    pub pickup_point: String,
    pub dropoff_point: String,
    pub supervisor_name: String,
    pub supervisor_rating: u8,
    pub supervisor_notes: String,
    pub passenger_feedback: String,
}

impl TripFormSnapshot {
    /// Required-field names that are currently empty.
    ///
    /// `source_ref`, supervisor notes and passenger feedback are optional;
    /// everything else must be filled before submission.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let required: [(&'static str, &str); 8] = [
            ("bookingSource", &self.booking_source),
            ("supplier", &self.supplier),
            ("clientName", &self.client_name),
            ("driverName", &self.driver_name),
            ("carType", &self.car_type),
            ("parkingLocation", &self.parking_location),
            ("pickupPoint", &self.pickup_point),
            ("dropoffPoint", &self.dropoff_point),
        ];
        required
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

/// Photo metadata attached to a trip entry.
///
/// `storage_path` is absent until the remote write succeeds. Preview handles
/// are a client-side resource and are deliberately not representable here:
/// nothing ephemeral is ever persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripAttachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}

/// Synchronization state of a trip entry against the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    /// Validate a transition. `Synced` is terminal; identity transitions are
    /// no-ops. Anything else outside the allowed set is rejected.
    pub fn transition(self, next: SyncStatus) -> DomainResult<SyncStatus> {
        use SyncStatus::*;
        match (self, next) {
            (a, b) if a == b => Ok(b),
            (Pending, Synced) | (Pending, Failed) => Ok(next),
            (Failed, Synced) | (Failed, Pending) => Ok(next),
            (Synced, _) => Err(DomainError::invariant(format!(
                "sync status is terminal: synced -> {}",
                next.as_str()
            ))),
            (a, b) => Err(DomainError::invariant(format!(
                "illegal sync transition: {} -> {}",
                a.as_str(),
                b.as_str()
            ))),
        }
    }
}

/// Where a submission came from, for remote provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncSource {
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "offline-cache")]
    OfflineCache,
}

/// Wire shape sent to the remote trip-write endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripReportInput {
    pub id: TripId,
    pub booking_id: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub form: TripFormSnapshot,
    pub checklist: TripChecklist,
    pub status: TripStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub sync_source: SyncSource,
    pub offline: bool,
}

/// The authoritative local view of one trip.
///
/// Created at submission time; `status` is classified exactly once from the
/// values present at that instant and is immutable thereafter. Only the
/// synchronization orchestrator mutates `sync_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripEntry {
    pub id: TripId,
    pub booking_id: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub form: TripFormSnapshot,
    pub checklist: TripChecklist,
    pub attachments: Vec<TripAttachment>,
    pub status: TripStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    pub sync_status: SyncStatus,
}

impl TripEntry {
    /// Compose a new entry at submission time. Classifies the status once
    /// from the checklist and supervisor rating present right now.
    #[allow(clippy::too_many_arguments)]
    pub fn compose(
        id: TripId,
        booking_id: String,
        date: NaiveDate,
        form: TripFormSnapshot,
        checklist: TripChecklist,
        attachments: Vec<TripAttachment>,
        created_by: Option<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let status = TripStatus::classify(&checklist, form.supervisor_rating);
        Self {
            id,
            booking_id,
            date,
            form,
            checklist,
            attachments,
            status,
            created_at,
            created_by,
            sync_status: SyncStatus::Pending,
        }
    }

    /// Apply a sync-status transition, rejecting anything outside the
    /// allowed set.
    pub fn mark_sync_status(&mut self, next: SyncStatus) -> DomainResult<()> {
        self.sync_status = self.sync_status.transition(next)?;
        Ok(())
    }

    /// Build the wire payload for the remote write.
    pub fn to_report_input(&self, sync_source: SyncSource) -> TripReportInput {
        TripReportInput {
            id: self.id,
            booking_id: self.booking_id.clone(),
            date: self.date,
            form: self.form.clone(),
            checklist: self.checklist,
            status: self.status,
            created_by: self.created_by,
            sync_source,
            offline: matches!(sync_source, SyncSource::OfflineCache),
        }
    }

    /// Merge remote storage references into the attachment list, matching by
    /// file name. Unmatched attachments are left untouched.
    pub fn merge_storage_paths<'a, I>(&mut self, refs: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (file_name, storage_path) in refs {
            for attachment in &mut self.attachments {
                if attachment.name == file_name {
                    attachment.storage_path = Some(storage_path.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checklist::ChecklistRating;

    fn filled_form() -> TripFormSnapshot {
        TripFormSnapshot {
            source_ref: "2499301".into(),
            booking_source: "airport-app".into(),
            supplier: "fleet-a".into(),
            client_name: "client".into(),
            driver_name: "driver".into(),
            car_type: "sedan".into(),
            parking_location: "p1".into(),
            pickup_point: "terminal".into(),
            dropoff_point: "hotel".into(),
            supervisor_name: "supervisor".into(),
            supervisor_rating: 5,
            supervisor_notes: String::new(),
            passenger_feedback: String::new(),
        }
    }

    fn compose_entry(form: TripFormSnapshot, checklist: TripChecklist) -> TripEntry {
        TripEntry::compose(
            TripId::new(),
            "TRP-26-08-0001".into(),
            NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            form,
            checklist,
            vec![],
            None,
            Utc::now(),
        )
    }

    #[test]
    fn missing_required_fields_reports_empty_ones() {
        let mut form = filled_form();
        form.supplier = String::new();
        form.dropoff_point = "  ".into();
        assert_eq!(
            form.missing_required_fields(),
            vec!["supplier", "dropoffPoint"]
        );
    }

    #[test]
    fn optional_fields_are_never_required() {
        let mut form = filled_form();
        form.source_ref = String::new();
        form.supervisor_notes = String::new();
        form.passenger_feedback = String::new();
        assert!(form.missing_required_fields().is_empty());
    }

    #[test]
    fn compose_classifies_status_once() {
        let entry = compose_entry(filled_form(), TripChecklist::all_good());
        assert_eq!(entry.status, TripStatus::Approved);
        assert_eq!(entry.sync_status, SyncStatus::Pending);

        let mut checklist = TripChecklist::all_good();
        checklist.driver_appearance = ChecklistRating::Bad;
        let entry = compose_entry(filled_form(), checklist);
        assert_eq!(entry.status, TripStatus::Warning);
    }

    #[test]
    fn synced_is_terminal() {
        let mut entry = compose_entry(filled_form(), TripChecklist::all_good());
        entry.mark_sync_status(SyncStatus::Synced).unwrap();

        let err = entry.mark_sync_status(SyncStatus::Pending).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        let err = entry.mark_sync_status(SyncStatus::Failed).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        // identity transition is a no-op
        entry.mark_sync_status(SyncStatus::Synced).unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn failed_can_retry_or_resolve() {
        let mut entry = compose_entry(filled_form(), TripChecklist::all_good());
        entry.mark_sync_status(SyncStatus::Failed).unwrap();
        entry.mark_sync_status(SyncStatus::Pending).unwrap();
        entry.mark_sync_status(SyncStatus::Failed).unwrap();
        entry.mark_sync_status(SyncStatus::Synced).unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn merge_storage_paths_matches_by_name() {
        let mut entry = compose_entry(filled_form(), TripChecklist::all_good());
        entry.attachments = vec![
            TripAttachment {
                id: "a1".into(),
                name: "front.jpg".into(),
                mime_type: "image/jpeg".into(),
                size: 100,
                storage_path: None,
            },
            TripAttachment {
                id: "a2".into(),
                name: "back.jpg".into(),
                mime_type: "image/jpeg".into(),
                size: 200,
                storage_path: None,
            },
        ];

        entry.merge_storage_paths([("front.jpg", "trips/x/front.jpg")]);
        assert_eq!(
            entry.attachments[0].storage_path.as_deref(),
            Some("trips/x/front.jpg")
        );
        assert_eq!(entry.attachments[1].storage_path, None);
    }

    #[test]
    fn report_input_carries_offline_provenance() {
        let entry = compose_entry(filled_form(), TripChecklist::all_good());
        let input = entry.to_report_input(SyncSource::OfflineCache);
        assert!(input.offline);
        assert_eq!(input.sync_source, SyncSource::OfflineCache);
        let input = entry.to_report_input(SyncSource::Web);
        assert!(!input.offline);
    }

    #[test]
    fn wire_serialization_uses_camel_case_and_lowercase_statuses() {
        let entry = compose_entry(filled_form(), TripChecklist::all_good());
        let input = entry.to_report_input(SyncSource::Web);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["bookingId"], "TRP-26-08-0001");
        assert_eq!(json["status"], "approved");
        assert_eq!(json["syncSource"], "web");
        assert_eq!(json["checklist"]["externalClean"], "good");
    }
}
