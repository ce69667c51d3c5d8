//! Dump command implementation.

use serde::Serialize;
use std::path::Path;
use tidesync_log::{ChangeLog, ChangeStore};
use tidesync_protocol::{Change, PartitionKey, Tidemark};
use tracing::info;
use uuid::Uuid;

/// A change as printed by the dump command.
#[derive(Debug, Serialize)]
pub struct ChangeInfo {
    /// Position within the partition.
    pub tidemark: Tidemark,
    /// `<record-id>/<property>` path.
    pub path: String,
    /// Stored value.
    pub value: Option<String>,
    /// Client modification time, RFC 3339.
    pub modified: String,
    /// Entity tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Reporting device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Uuid>,
    /// Server-generated change id.
    pub id: Uuid,
}

impl From<&Change> for ChangeInfo {
    fn from(change: &Change) -> Self {
        Self {
            tidemark: change.tidemark,
            path: change.path().to_string(),
            value: change.value.clone(),
            modified: change.client_modified.to_rfc3339(),
            entity: change.entity.clone(),
            device_id: change.device_id,
            id: change.id,
        }
    }
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    app_id: Uuid,
    group: &str,
    since: Option<Tidemark>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_read_only(path)?;
    let key = PartitionKey::new(app_id, group);
    info!("Dumping partition {} from {:?}", key, path);

    let changes = collect(&store, &key, since)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
        _ => {
            print_text_output(&key, &changes);
        }
    }

    Ok(())
}

/// Follows tidemarks page by page until the partition is exhausted.
fn collect(
    store: &ChangeStore,
    key: &PartitionKey,
    since: Option<Tidemark>,
) -> Result<Vec<ChangeInfo>, Box<dyn std::error::Error>> {
    let mut changes = Vec::new();
    let mut cursor = since;
    loop {
        let page = store.after(key, cursor)?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(last.tidemark);
        changes.extend(page.iter().map(ChangeInfo::from));
    }
    Ok(changes)
}

fn print_text_output(key: &PartitionKey, changes: &[ChangeInfo]) {
    println!("Partition {key}: {} changes", changes.len());
    println!();
    for change in changes {
        let value = change.value.as_deref().unwrap_or("<null>");
        println!(
            "{:>8}  {}  {} = {}",
            change.tidemark, change.modified, change.path, value
        );
    }
}
