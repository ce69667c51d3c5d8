//! End-to-end sync scenarios through the transport boundary.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;
use tidesync_log::{ChangeLog, ChangeStore, LogError, LogResult};
use tidesync_protocol::{
    latest_per_path, Change, ChangeRequest, NewChange, PartitionKey, SyncRequest, Tidemark,
};
use tidesync_server::{
    Application, Device, ManualClock, MemoryAuthGate, ServerConfig, SyncEngine, SyncError,
    SyncReply, SyncServer,
};
use uuid::Uuid;

const MALFORMED_PATH: &str =
    "Path is incorrectly formatted, should be formatted <guid>/property.name";

struct Harness {
    server: SyncServer,
    clock: Arc<ManualClock>,
    app: Application,
    device: Uuid,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
}

fn harness_with(config: ServerConfig) -> Harness {
    let gate = MemoryAuthGate::new();
    let app = Application::new(Uuid::new_v4(), Uuid::new_v4());
    let device = Uuid::new_v4();
    gate.register_application(app.clone());
    gate.register_device(Device { id: device });

    let clock = Arc::new(ManualClock::new(start()));
    let server = SyncServer::open_with_clock(config, Arc::new(gate), clock.clone()).unwrap();
    Harness {
        server,
        clock,
        app,
        device,
    }
}

fn harness() -> Harness {
    harness_with(ServerConfig::default())
}

impl Harness {
    fn credentials(&self) -> Value {
        json!({ "app_id": self.app.id, "app_api_access_key": self.app.access_key })
    }

    fn post(&self, body: &Value) -> (u16, Value) {
        let reply = self.server.handle_body(body.to_string().as_bytes());
        let json = serde_json::to_value(&reply.response).unwrap();
        (reply.status, json)
    }

    fn pull(&self, group: &str, tidemark: Option<Tidemark>) -> Value {
        let mut body = self.credentials();
        body["groups"] = json!([{ "group": group, "tidemark": tidemark }]);
        let (status, response) = self.post(&body);
        assert_eq!(status, 200, "{response}");
        response["groups"][0].clone()
    }
}

fn assert_single_error(status: u16, response: &Value, message: &str) {
    assert_eq!(status, 400);
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["errors"], json!([message]));
    assert!(response.get("groups").is_none());
}

#[test]
fn missing_app_id_is_rejected() {
    let h = harness();
    let (status, response) = h.post(&json!({ "app_api_access_key": h.app.access_key }));
    assert_single_error(status, &response, "app_id missing or invalid request");
}

#[test]
fn unknown_app_id_is_rejected() {
    let h = harness();
    let (status, response) = h.post(&json!({
        "app_id": Uuid::new_v4(),
        "app_api_access_key": h.app.access_key,
    }));
    assert_single_error(status, &response, "No application found for app_id");
}

#[test]
fn wrong_or_missing_access_key_is_rejected() {
    let h = harness();
    for body in [
        json!({ "app_id": h.app.id, "app_api_access_key": Uuid::new_v4() }),
        json!({ "app_id": h.app.id }),
        json!({ "app_id": h.app.id, "app_api_access_key": Uuid::nil() }),
    ] {
        let (status, response) = h.post(&body);
        assert_single_error(status, &response, "app_api_access_key incorrect for app_id");
    }
}

#[test]
fn unknown_device_is_rejected() {
    let h = harness();
    let mut body = h.credentials();
    body["device_id"] = json!(Uuid::new_v4());
    let (status, response) = h.post(&body);
    assert_single_error(status, &response, "No device found for device_id");
}

#[test]
fn first_failing_check_wins() {
    let h = harness();
    // Bad key, unknown device and a malformed path: only the key is reported.
    let body = json!({
        "app_id": h.app.id,
        "app_api_access_key": Uuid::new_v4(),
        "device_id": Uuid::new_v4(),
        "changes": [{ "group": "g", "path": "bad format", "value": "x" }],
    });
    let (status, response) = h.post(&body);
    assert_single_error(status, &response, "app_api_access_key incorrect for app_id");

    // Unknown device reported before the malformed path.
    let mut body = h.credentials();
    body["device_id"] = json!(Uuid::new_v4());
    body["changes"] = json!([{ "group": "g", "path": "bad format", "value": "x" }]);
    let (status, response) = h.post(&body);
    assert_single_error(status, &response, "No device found for device_id");
}

#[test]
fn malformed_path_appends_nothing() {
    let h = harness();
    let record = Uuid::new_v4();
    let mut body = h.credentials();
    body["changes"] = json!([
        { "group": "g", "path": format!("{record}/name"), "value": "valid" },
        { "group": "g", "path": "bad format", "value": "x" },
    ]);

    let (status, response) = h.post(&body);
    assert_single_error(status, &response, MALFORMED_PATH);
    assert!(h.server.log().partitions().is_empty());
    assert_eq!(h.pull("g", None)["changes"], json!([]));
}

#[test]
fn round_trip_seconds_ago() {
    let h = harness();
    let record = Uuid::new_v4();
    let mut body = h.credentials();
    body["device_id"] = json!(h.device);
    body["changes"] = json!([
        { "group": "people", "path": format!("{record}/name"), "value": "Neil", "secondsAgo": 10 }
    ]);
    let (status, response) = h.post(&body);
    assert_eq!(status, 200);
    assert_eq!(response, json!({ "success": true }));

    h.clock.advance(TimeDelta::seconds(30));
    let group = h.pull("people", None);
    assert_eq!(group["group"], json!("people"));
    assert_eq!(group["tidemark"], json!(1));

    let changes = group["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["path"], json!("name"));
    assert_eq!(changes[0]["value"], json!("Neil"));

    let modified: DateTime<Utc> = serde_json::from_value(changes[0]["modified"].clone()).unwrap();
    assert_eq!(modified, start() - TimeDelta::seconds(10));
}

#[test]
fn pull_without_changes_echoes_tidemark() {
    let h = harness();
    let group = h.pull("empty", Some(41));
    assert_eq!(group["tidemark"], json!(41));
    assert_eq!(group["changes"], json!([]));

    let group = h.pull("empty", None);
    assert_eq!(group["tidemark"], Value::Null);
}

#[test]
fn pagination_over_sixty_changes() {
    let h = harness();
    let record = Uuid::new_v4();
    let changes: Vec<Value> = (0..60)
        .map(|i| json!({ "group": "g", "path": format!("{record}/field{i}"), "value": i.to_string() }))
        .collect();
    let mut body = h.credentials();
    body["changes"] = json!(changes);
    assert_eq!(h.post(&body).0, 200);

    let first = h.pull("g", None);
    assert_eq!(first["changes"].as_array().unwrap().len(), 50);
    assert_eq!(first["tidemark"], json!(50));

    let second = h.pull("g", Some(50));
    let rest = second["changes"].as_array().unwrap();
    assert_eq!(rest.len(), 10);
    assert_eq!(rest[0]["path"], json!("field50"));
    assert_eq!(second["tidemark"], json!(60));

    assert_eq!(h.pull("g", Some(60))["changes"], json!([]));
}

#[test]
fn same_record_edits_keep_submission_order() {
    let h = harness();
    let record = Uuid::new_v4();
    let mut body = h.credentials();
    body["changes"] = json!([
        { "group": "g", "path": format!("{record}/name"), "value": "Neil", "millisecondsAgo": 10000 },
        { "group": "g", "path": format!("{record}/age"), "value": "10", "millisecondsAgo": 10000 },
    ]);
    body["groups"] = json!([{ "group": "g", "tidemark": null }]);

    let (status, response) = h.post(&body);
    assert_eq!(status, 200);
    let changes = response["groups"][0]["changes"].as_array().unwrap();
    let paths: Vec<&str> = changes.iter().map(|c| c["path"].as_str().unwrap()).collect();
    assert_eq!(paths, vec!["name", "age"]);
    assert_eq!(response["groups"][0]["tidemark"], json!(2));

    let stored = h
        .server
        .log()
        .after(&PartitionKey::new(h.app.id, "g"), None)
        .unwrap();
    assert_eq!(stored[0].tidemark + 1, stored[1].tidemark);
}

#[test]
fn history_is_not_collapsed() {
    let h = harness();
    let record = Uuid::new_v4();
    let path = format!("{record}/name");
    let mut body = h.credentials();
    body["changes"] = json!([
        { "group": "g", "path": path, "value": "old", "secondsAgo": 5 },
        { "group": "g", "path": path, "value": "new", "secondsAgo": 1 },
        { "group": "g", "path": path, "value": "stale", "secondsAgo": 60 },
    ]);
    body["groups"] = json!([{ "group": "g" }]);

    let reply = h.server.handle_body(body.to_string().as_bytes());
    let groups = reply.response.groups.unwrap();
    assert_eq!(groups[0].changes.len(), 3);

    let merged = latest_per_path(&groups[0].changes);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].value.as_deref(), Some("new"));
}

#[test]
fn groups_are_isolated_per_application() {
    let gate = MemoryAuthGate::new();
    let first = Application::new(Uuid::new_v4(), Uuid::new_v4());
    let second = Application::new(Uuid::new_v4(), Uuid::new_v4());
    gate.register_application(first.clone());
    gate.register_application(second.clone());
    let server = SyncServer::open(ServerConfig::default(), Arc::new(gate)).unwrap();

    let record = Uuid::new_v4();
    let push = SyncRequest::new(first.id, first.access_key).with_change(ChangeRequest::new(
        "shared",
        format!("{record}/name"),
        Some("first".into()),
    ));
    assert_eq!(server.handle_request(Some(&push)).status, 200);

    let pull = SyncRequest::new(second.id, second.access_key).with_group("shared", None);
    let reply = server.handle_request(Some(&pull));
    let groups = reply.response.groups.unwrap();
    assert!(groups[0].changes.is_empty());
}

#[test]
fn persistent_log_survives_restart() {
    let temp = tempdir().unwrap();
    let record = Uuid::new_v4();
    let config = ServerConfig::new().with_log_dir(temp.path());

    let (app, first_pull) = {
        let h = harness_with(config.clone());
        let mut body = h.credentials();
        body["changes"] = json!([{ "group": "g", "path": format!("{record}/name"), "value": "kept" }]);
        assert_eq!(h.post(&body).0, 200);
        (h.app.clone(), h.pull("g", None))
    };

    let gate = MemoryAuthGate::new();
    gate.register_application(app.clone());
    let server = SyncServer::open(config, Arc::new(gate)).unwrap();
    let pull = SyncRequest::new(app.id, app.access_key).with_group("g", None);
    let reply = server.handle_request(Some(&pull));
    let response = serde_json::to_value(&reply.response).unwrap();
    assert_eq!(response["groups"][0], first_pull);
}

#[test]
fn concurrent_requests_share_one_sequence() {
    let h = Arc::new(harness_with(ServerConfig::new().with_page_size(100)));
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let h = Arc::clone(&h);
            thread::spawn(move || {
                for round in 0..10 {
                    let record = Uuid::new_v4();
                    let mut body = h.credentials();
                    body["changes"] = json!([
                        { "group": "g", "path": format!("{record}/a"), "value": format!("{worker}-{round}") },
                        { "group": "g", "path": format!("{record}/b"), "value": format!("{worker}-{round}") },
                    ]);
                    assert_eq!(h.post(&body).0, 200);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stored = h
        .server
        .log()
        .after(&PartitionKey::new(h.app.id, "g"), None)
        .unwrap();
    let tidemarks: Vec<Tidemark> = stored.iter().map(|c| c.tidemark).collect();
    assert_eq!(tidemarks, (1..=80).collect::<Vec<_>>());

    // The two edits of one request are always adjacent.
    for pair in stored.chunks(2) {
        assert_eq!(pair[0].value, pair[1].value);
        assert_eq!(pair[0].property, "a");
    }
}

/// A change log whose storage is gone.
struct UnavailableLog;

impl ChangeLog for UnavailableLog {
    fn append_batch(&self, _app_id: Uuid, _changes: Vec<NewChange>) -> LogResult<Vec<Change>> {
        Err(LogError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk unplugged",
        )))
    }

    fn after(&self, _key: &PartitionKey, _since: Option<Tidemark>) -> LogResult<Vec<Change>> {
        Err(LogError::Codec("unreadable".into()))
    }
}

#[test]
fn storage_failure_is_server_error() {
    let gate = MemoryAuthGate::new();
    let app = Application::new(Uuid::new_v4(), Uuid::new_v4());
    gate.register_application(app.clone());
    let engine = SyncEngine::new(gate, UnavailableLog);

    let push = SyncRequest::new(app.id, app.access_key).with_change(ChangeRequest::new(
        "g",
        format!("{}/name", Uuid::new_v4()),
        None,
    ));
    let err = engine.sync(Some(&push)).unwrap_err();
    assert!(matches!(err, SyncError::StorageUnavailable(ref msg) if msg.contains("disk unplugged")));
    assert_eq!(err.status_code(), 500);

    let pull = SyncRequest::new(app.id, app.access_key).with_group("g", None);
    let reply = SyncReply::from(engine.sync(Some(&pull)));
    assert_eq!(reply.status, 500);
    assert!(!reply.response.success);
    assert_eq!(reply.response.errors.map(|e| e.len()), Some(1));

    // Validation still runs first.
    let bad = SyncRequest::new(app.id, Uuid::new_v4()).with_group("g", None);
    assert_eq!(engine.sync(Some(&bad)), Err(SyncError::AccessDenied));
}

#[test]
fn persistent_store_can_back_a_custom_engine() {
    let temp = tempdir().unwrap();
    let store = Arc::new(ChangeStore::open(temp.path(), Default::default()).unwrap());
    let gate = MemoryAuthGate::new();
    let app = Application::new(Uuid::new_v4(), Uuid::new_v4());
    gate.register_application(app.clone());

    let engine = SyncEngine::new(gate, Arc::clone(&store));
    let push = SyncRequest::new(app.id, app.access_key).with_change(ChangeRequest::new(
        "g",
        format!("{}/name", Uuid::new_v4()),
        Some("v".into()),
    ));
    engine.sync(Some(&push)).unwrap();
    assert_eq!(store.verify().unwrap().changes, 1);
}
