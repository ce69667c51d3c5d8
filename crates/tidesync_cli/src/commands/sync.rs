//! Sync command implementation.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tidesync_server::{MemoryAuthGate, ServerConfig, SyncReply, SyncServer};
use tracing::info;

/// Runs the sync command and returns the reply status.
///
/// Without a log path the request runs against an empty in-memory log.
pub fn run(
    path: Option<&Path>,
    registry: &Path,
    request: Option<&Path>,
) -> Result<u16, Box<dyn std::error::Error>> {
    let body = match request {
        Some(file) => std::fs::read(file)?,
        None => {
            let mut body = Vec::new();
            std::io::stdin().read_to_end(&mut body)?;
            body
        }
    };

    let reply = execute(path, registry, &body)?;
    println!("{}", serde_json::to_string_pretty(&reply.response)?);
    Ok(reply.status)
}

fn execute(
    path: Option<&Path>,
    registry: &Path,
    body: &[u8],
) -> Result<SyncReply, Box<dyn std::error::Error>> {
    info!("Loading registry from {:?}", registry);
    let auth = MemoryAuthGate::load(registry)?;

    let mut config = ServerConfig::new();
    if let Some(path) = path {
        config = config.with_log_dir(path);
    }

    let server = SyncServer::open(config, Arc::new(auth))?;
    Ok(server.handle_body(body))
}
