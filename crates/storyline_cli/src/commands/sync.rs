//! Sync command implementation.
//!
//! Replays a client delta sync against a local catalog, through the same
//! request path the server uses.

use std::path::Path;
use std::sync::Arc;
use storyline_protocol::{decode, encode, DeltaSyncRequest, DeltaSyncResponse, ErrorResponse};
use storyline_sync_server::{CallerIdentity, HmacUrlSigner, ServerConfig, SyncServer};
use tracing::info;

const DELTA_SYNC_REQUEST: u8 = 1;
const ERROR_REPLY: u8 = 255;

/// Runs the sync command.
///
/// `request` is a wire-format request body; without it an initial sync
/// (empty client) is replayed.
pub fn run(
    path: &Path,
    request: Option<&Path>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Replaying delta sync against {:?}", path);
    let engine = super::open_existing(path)?;
    let server = SyncServer::new(
        ServerConfig::default(),
        engine,
        Arc::new(HmacUrlSigner::new(Vec::new(), "")),
    );

    let body = match request {
        Some(file) => std::fs::read(file)?,
        None => encode(&DeltaSyncRequest::initial())?,
    };
    let (code, reply) = replay(&server, &body);

    if code == ERROR_REPLY {
        let err: ErrorResponse = decode(&reply)?;
        return Err(format!("{}: {}", err.code, err.message).into());
    }

    let response: DeltaSyncResponse = decode(&reply)?;
    match format {
        "json" => {
            let value: serde_json::Value = serde_json::from_slice(&reply)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            println!("Server version:  {}", response.server_version);
            println!("Total stories:   {}", response.total_stories);
            println!("Updated stories: {}", response.updated_stories);
            println!("Last updated:    {}", response.last_updated);
            for story in &response.stories {
                println!("  + {} (v{}, {} pages)", story.id, story.version, story.pages.len());
            }
        }
    }
    Ok(())
}

/// Sends a request body through the server and returns the reply.
pub fn replay(server: &SyncServer, body: &[u8]) -> (u8, Vec<u8>) {
    server.handle_bytes(&CallerIdentity::new("cli"), DELTA_SYNC_REQUEST, body)
}
