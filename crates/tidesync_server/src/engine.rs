//! Request processing.
//!
//! A request runs through a fixed sequence of checks and stops at the first
//! failure, so a response never carries more than one error:
//!
//! 1. the request carries an application id
//! 2. the application exists
//! 3. the access key matches
//! 4. the device exists, when one is named
//! 5. every change path parses; the changes are appended as one batch
//! 6. each requested group is pulled
//!
//! Step 5 is the only write. Nothing is appended unless every path parses.

use crate::auth::AuthGate;
use crate::clock::{Clock, SystemClock};
use crate::error::{SyncError, SyncResult};
use std::sync::Arc;
use std::time::Instant;
use tidesync_log::ChangeLog;
use tidesync_protocol::{
    Change, ChangeRequest, GroupRequest, GroupResponse, NewChange, PartitionKey, RecordPath,
    SyncRequest,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Validates sync requests, appends their changes and pulls their groups.
pub struct SyncEngine<A: AuthGate, L: ChangeLog> {
    auth: A,
    log: L,
    clock: Arc<dyn Clock>,
}

impl<A: AuthGate, L: ChangeLog> SyncEngine<A, L> {
    /// Creates an engine stamping changes with the system clock.
    pub fn new(auth: A, log: L) -> Self {
        Self::with_clock(auth, log, Arc::new(SystemClock))
    }

    /// Creates an engine with an explicit time source.
    pub fn with_clock(auth: A, log: L, clock: Arc<dyn Clock>) -> Self {
        Self { auth, log, clock }
    }

    /// Returns the auth gate.
    pub fn auth(&self) -> &A {
        &self.auth
    }

    /// Returns the change log.
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Processes a request.
    ///
    /// Returns the pulled groups, or `None` when the request asked for none.
    ///
    /// # Errors
    ///
    /// Returns the first failing check, see the module docs.
    pub fn sync(&self, request: Option<&SyncRequest>) -> SyncResult<Option<Vec<GroupResponse>>> {
        let started = Instant::now();
        let result = self.run(request);

        match &result {
            Ok(groups) => debug!(
                groups = groups.as_ref().map_or(0, Vec::len),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "sync request processed"
            ),
            Err(e) if e.is_server_error() => error!(error = %e, "sync request failed"),
            Err(e) => warn!(error = %e, "sync request rejected"),
        }
        result
    }

    fn run(&self, request: Option<&SyncRequest>) -> SyncResult<Option<Vec<GroupResponse>>> {
        let request = request
            .filter(|request| !request.app_id.is_nil())
            .ok_or(SyncError::InvalidRequest)?;

        let application = self
            .auth
            .get_application(request.app_id)
            .ok_or(SyncError::UnknownApplication)?;

        if !application.verify_access_key(request.app_api_access_key) {
            return Err(SyncError::AccessDenied);
        }

        let device_id = request.device();
        if let Some(device_id) = device_id {
            if self.auth.get_device(device_id).is_none() {
                return Err(SyncError::UnknownDevice);
            }
        }

        if let Some(changes) = &request.changes {
            self.ingest(application.id, device_id, changes)?;
        }

        request
            .groups
            .as_ref()
            .map(|groups| {
                groups
                    .iter()
                    .map(|group| self.pull(application.id, group))
                    .collect::<SyncResult<Vec<_>>>()
            })
            .transpose()
    }

    fn ingest(
        &self,
        app_id: Uuid,
        device_id: Option<Uuid>,
        changes: &[ChangeRequest],
    ) -> SyncResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let received = self.clock.now();
        let batch = changes
            .iter()
            .map(|change| -> SyncResult<NewChange> {
                let path = RecordPath::parse(&change.path)?;
                Ok(NewChange::new(
                    change.group.clone(),
                    path,
                    change.value.clone(),
                    change.modified_at(received),
                )
                .with_entity(change.entity.clone())
                .with_device(device_id))
            })
            .collect::<SyncResult<Vec<_>>>()?;

        let appended = self.log.append_batch(app_id, batch)?;
        info!(%app_id, count = appended.len(), "ingested changes");
        Ok(())
    }

    fn pull(&self, app_id: Uuid, request: &GroupRequest) -> SyncResult<GroupResponse> {
        let key = PartitionKey::new(app_id, request.group.clone());
        let changes = self.log.after(&key, request.tidemark)?;

        Ok(GroupResponse {
            group: request.group.clone(),
            tidemark: changes
                .last()
                .map(|change| change.tidemark)
                .or(request.tidemark),
            changes: changes.iter().map(Change::to_response).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Application, Device, MemoryAuthGate};
    use crate::clock::ManualClock;
    use chrono::{TimeDelta, TimeZone, Utc};
    use tidesync_log::ChangeStore;

    struct Fixture {
        engine: SyncEngine<MemoryAuthGate, ChangeStore>,
        clock: Arc<ManualClock>,
        app: Application,
        device: Uuid,
    }

    fn fixture() -> Fixture {
        let gate = MemoryAuthGate::new();
        let app = Application::new(Uuid::new_v4(), Uuid::new_v4());
        let device = Uuid::new_v4();
        gate.register_application(app.clone());
        gate.register_device(Device { id: device });

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap(),
        ));
        let engine = SyncEngine::with_clock(gate, ChangeStore::in_memory(), clock.clone());
        Fixture {
            engine,
            clock,
            app,
            device,
        }
    }

    impl Fixture {
        fn request(&self) -> SyncRequest {
            SyncRequest::new(self.app.id, self.app.access_key)
        }
    }

    #[test]
    fn absent_request_is_invalid() {
        let f = fixture();
        assert_eq!(f.engine.sync(None), Err(SyncError::InvalidRequest));
    }

    #[test]
    fn credentials_only_succeeds_without_groups() {
        let f = fixture();
        assert_eq!(f.engine.sync(Some(&f.request())), Ok(None));
    }

    #[test]
    fn known_device_is_recorded() {
        let f = fixture();
        let record = Uuid::new_v4();
        let request = f
            .request()
            .with_device(f.device)
            .with_change(ChangeRequest::new("g", format!("{record}/name"), Some("a".into())));
        f.engine.sync(Some(&request)).unwrap();

        let stored = f.engine.log().after(&PartitionKey::new(f.app.id, "g"), None).unwrap();
        assert_eq!(stored[0].device_id, Some(f.device));
        assert_eq!(stored[0].record_id, record);
    }

    #[test]
    fn nil_device_is_not_looked_up() {
        let f = fixture();
        let request = f.request().with_device(Uuid::nil());
        assert_eq!(f.engine.sync(Some(&request)), Ok(None));
    }

    #[test]
    fn modified_is_receipt_time_minus_age() {
        let f = fixture();
        let record = Uuid::new_v4();
        let request = f
            .request()
            .with_change(
                ChangeRequest::new("g", format!("{record}/name"), Some("a".into()))
                    .milliseconds_ago(2500.0),
            )
            .with_group("g", None);

        let groups = f.engine.sync(Some(&request)).unwrap().unwrap();
        let expected = f.clock.now() - TimeDelta::milliseconds(2500);
        assert_eq!(groups[0].changes[0].modified, expected);
    }

    #[test]
    fn empty_changes_and_groups() {
        let f = fixture();
        let mut request = f.request();
        request.changes = Some(Vec::new());
        request.groups = Some(Vec::new());

        assert_eq!(f.engine.sync(Some(&request)), Ok(Some(Vec::new())));
        assert!(f.engine.log().partitions().is_empty());
    }

    #[test]
    fn empty_pull_echoes_tidemark() {
        let f = fixture();
        let request = f.request().with_group("g", Some(17)).with_group("h", None);
        let groups = f.engine.sync(Some(&request)).unwrap().unwrap();

        assert_eq!(groups[0].tidemark, Some(17));
        assert!(groups[0].changes.is_empty());
        assert_eq!(groups[1].tidemark, None);
    }

    #[test]
    fn unknown_application_is_rejected() {
        let f = fixture();
        let result = f.engine.sync(Some(&SyncRequest::new(Uuid::new_v4(), Uuid::new_v4())));
        assert_eq!(result, Err(SyncError::UnknownApplication));
    }
}
