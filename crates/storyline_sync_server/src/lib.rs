//! # Storyline Sync Server
//!
//! Request handling for Storyline content sync.
//!
//! This crate provides:
//! - Delta sync and version check endpoints over a [`storyline_core::ContentEngine`]
//! - Batch signed asset URLs with path validation
//! - Asset delta sync against the asset version aggregate
//! - HMAC-SHA256 URL signing
//! - Error classification into client, server and retryable failures
//!
//! # Architecture
//!
//! The server is transport-agnostic. A front end (HTTP, RPC, a queue
//! consumer) authenticates the caller into a [`CallerIdentity`], then calls
//! [`SyncServer::handle_message`] with a decoded [`storyline_protocol::SyncMessage`]
//! or [`SyncServer::handle_bytes`] with the raw JSON body and its type code.
//!
//! Handlers are stateless between requests. All shared state lives in the
//! document store behind the engine, so any number of server instances can
//! serve the same catalog.
//!
//! # Protocol
//!
//! 1. Client sends its last seen version and the checksums it holds
//! 2. Server compares them against the current aggregate
//! 3. Server returns the full checksum map plus every story that differs
//! 4. Client requests signed URLs for the assets those stories reference,
//!    either as a batch of paths or as an asset sync with its own checksums

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod assets;
mod config;
mod error;
mod handler;
mod identity;
mod server;
mod signer;

pub use assets::{validate_asset_path, AssetPathError, AssetResolver};
pub use config::{ServerConfig, DEFAULT_ASSET_PREFIXES};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use identity::CallerIdentity;
pub use server::SyncServer;
pub use signer::{content_type_for, AssetMetadata, HmacUrlSigner, SignError, UrlSigner};
