//! # Storyline Protocol
//!
//! Wire and content types for Storyline delta sync.
//!
//! This crate provides:
//! - [`Story`], [`StoryPage`] and [`InteractiveElement`] content documents
//! - Delta sync, version check, batch asset and asset sync messages
//! - JSON encoding/decoding with required-field and size validation
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod story;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode, encode, AssetSyncRequest, AssetSyncResponse, BatchUrlsRequest, BatchUrlsResponse, ChecksumMap, DeltaSyncRequest,
    DeltaSyncResponse, ErrorResponse, SignedAsset, SyncMessage, VersionCheckRequest,
    VersionCheckResponse,
};
pub use story::{HitArea, InteractiveElement, Position, Size, Story, StoryPage, MAX_GEOMETRY};
