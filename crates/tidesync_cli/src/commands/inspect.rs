//! Inspect command implementation.

use serde::Serialize;
use std::path::Path;
use tidesync_log::PartitionSummary;
use tidesync_protocol::Tidemark;
use tracing::info;
use uuid::Uuid;

/// Change log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Change log path.
    pub path: String,
    /// Number of partitions.
    pub partition_count: usize,
    /// Number of stored changes.
    pub change_count: usize,
    /// Per-partition statistics.
    pub partitions: Vec<PartitionStats>,
}

/// Statistics for a single partition.
#[derive(Debug, Serialize)]
pub struct PartitionStats {
    /// Owning application.
    pub app_id: Uuid,
    /// Group name.
    pub group: String,
    /// Number of changes.
    pub changes: usize,
    /// Highest tidemark.
    pub last_tidemark: Option<Tidemark>,
}

impl From<PartitionSummary> for PartitionStats {
    fn from(summary: PartitionSummary) -> Self {
        Self {
            app_id: summary.key.app_id,
            group: summary.key.group,
            changes: summary.count,
            last_tidemark: summary.last_tidemark,
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    info!("Inspecting change log at {:?}", path);
    let store = super::open_read_only(path)?;
    let result = summarize(path, store.partitions());

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn summarize(path: &Path, partitions: Vec<PartitionSummary>) -> InspectResult {
    let partitions: Vec<PartitionStats> = partitions.into_iter().map(PartitionStats::from).collect();
    InspectResult {
        path: path.display().to_string(),
        partition_count: partitions.len(),
        change_count: partitions.iter().map(|p| p.changes).sum(),
        partitions,
    }
}

fn print_text_output(result: &InspectResult) {
    println!("tidesync Change Log Inspection");
    println!("==============================");
    println!();
    println!("Path:       {}", result.path);
    println!("Partitions: {}", result.partition_count);
    println!("Changes:    {}", result.change_count);

    if result.partitions.is_empty() {
        return;
    }

    println!();
    println!("{:<36}  {:<20}  {:>8}  {:>10}", "Application", "Group", "Changes", "Tidemark");
    for partition in &result.partitions {
        let tidemark = partition
            .last_tidemark
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        println!(
            "{:<36}  {:<20}  {:>8}  {:>10}",
            partition.app_id, partition.group, partition.changes, tidemark
        );
    }
}
