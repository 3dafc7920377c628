//! Protocol messages for delta sync, version checks, asset batches and
//! asset sync.

use crate::error::{ProtocolError, ProtocolResult};
use crate::story::Story;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Story ID to checksum map. Ordered so encodings are byte-stable.
pub type ChecksumMap = BTreeMap<String, String>;

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    /// Delta sync request.
    DeltaSyncRequest(DeltaSyncRequest),
    /// Delta sync response.
    DeltaSyncResponse(DeltaSyncResponse),
    /// Version check request.
    VersionCheckRequest(VersionCheckRequest),
    /// Version check response.
    VersionCheckResponse(VersionCheckResponse),
    /// Batch asset URL request.
    BatchUrlsRequest(BatchUrlsRequest),
    /// Batch asset URL response.
    BatchUrlsResponse(BatchUrlsResponse),
    /// Asset delta sync request.
    AssetSyncRequest(AssetSyncRequest),
    /// Asset delta sync response.
    AssetSyncResponse(AssetSyncResponse),
    /// Error response.
    Error(ErrorResponse),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::DeltaSyncRequest(_) => 1,
            SyncMessage::DeltaSyncResponse(_) => 2,
            SyncMessage::VersionCheckRequest(_) => 3,
            SyncMessage::VersionCheckResponse(_) => 4,
            SyncMessage::BatchUrlsRequest(_) => 5,
            SyncMessage::BatchUrlsResponse(_) => 6,
            SyncMessage::AssetSyncRequest(_) => 7,
            SyncMessage::AssetSyncResponse(_) => 8,
            SyncMessage::Error(_) => 255,
        }
    }

    /// Encodes the message body to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            SyncMessage::DeltaSyncRequest(m) => encode(m),
            SyncMessage::DeltaSyncResponse(m) => encode(m),
            SyncMessage::VersionCheckRequest(m) => encode(m),
            SyncMessage::VersionCheckResponse(m) => encode(m),
            SyncMessage::BatchUrlsRequest(m) => encode(m),
            SyncMessage::BatchUrlsResponse(m) => encode(m),
            SyncMessage::AssetSyncRequest(m) => encode(m),
            SyncMessage::AssetSyncResponse(m) => encode(m),
            SyncMessage::Error(m) => encode(m),
        }
    }

    /// Decodes a JSON body given its type code.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown type code or an invalid body.
    pub fn decode(type_code: u8, bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(match type_code {
            1 => SyncMessage::DeltaSyncRequest(DeltaSyncRequest::decode(bytes)?),
            2 => SyncMessage::DeltaSyncResponse(decode(bytes)?),
            3 => SyncMessage::VersionCheckRequest(decode(bytes)?),
            4 => SyncMessage::VersionCheckResponse(decode(bytes)?),
            5 => SyncMessage::BatchUrlsRequest(BatchUrlsRequest::decode(bytes)?),
            6 => SyncMessage::BatchUrlsResponse(decode(bytes)?),
            7 => SyncMessage::AssetSyncRequest(decode(bytes)?),
            8 => SyncMessage::AssetSyncResponse(decode(bytes)?),
            255 => SyncMessage::Error(decode(bytes)?),
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// Serializes a message body to JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode<T: Serialize>(message: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Parses a JSON message body.
///
/// # Errors
///
/// Returns `Malformed` if the bytes are not a valid body.
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// A client's request for stories changed since its last sync.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncRequest {
    /// Aggregate version the client last saw.
    pub client_version: u64,
    /// Checksums the client holds.
    pub story_checksums: ChecksumMap,
    /// Client clock at last sync (epoch ms). Advisory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeltaSyncRequest {
    client_version: Option<u64>,
    story_checksums: Option<ChecksumMap>,
    last_sync_timestamp: Option<u64>,
}

impl DeltaSyncRequest {
    /// Creates a request.
    pub fn new(client_version: u64, story_checksums: ChecksumMap) -> Self {
        Self {
            client_version,
            story_checksums,
            last_sync_timestamp: None,
        }
    }

    /// Creates the request a client sends on its very first sync.
    pub fn initial() -> Self {
        Self::default()
    }

    /// Parses a request, requiring `clientVersion` and `storyChecksums`.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for invalid JSON and `MissingField` when a
    /// required field is absent or null.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let raw: RawDeltaSyncRequest = serde_json::from_slice(bytes)?;
        Ok(Self {
            client_version: raw
                .client_version
                .ok_or(ProtocolError::MissingField("clientVersion"))?,
            story_checksums: raw
                .story_checksums
                .ok_or(ProtocolError::MissingField("storyChecksums"))?,
            last_sync_timestamp: raw.last_sync_timestamp,
        })
    }

    /// Checks the checksum map against the accepted maximum.
    ///
    /// # Errors
    ///
    /// Returns `TooManyChecksums` when the map is larger than `max_checksums`.
    pub fn validate(&self, max_checksums: usize) -> ProtocolResult<()> {
        let actual = self.story_checksums.len();
        if actual > max_checksums {
            return Err(ProtocolError::TooManyChecksums {
                max: max_checksums,
                actual,
            });
        }
        Ok(())
    }
}

/// The server's answer to a delta sync.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaSyncResponse {
    /// Current aggregate version.
    pub server_version: u64,
    /// Number of available stories.
    pub total_stories: u64,
    /// Number of stories in the diff set.
    pub updated_stories: u64,
    /// Aggregate last-updated time (epoch ms).
    pub last_updated: u64,
    /// The complete current checksum map.
    pub story_checksums: ChecksumMap,
    /// Full content of changed stories, ordered by ID.
    pub stories: Vec<Story>,
}

impl DeltaSyncResponse {
    /// Returns true if nothing changed for this client.
    ///
    /// Based on the diff count, not the shipped stories: a story that
    /// vanished between diffing and fetching still counts as a change.
    pub fn is_empty(&self) -> bool {
        self.updated_stories == 0
    }
}

/// A lightweight "am I current?" request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheckRequest {
    /// Aggregate version the client last saw, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<u64>,
}

/// The current aggregate state and whether the client matches it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheckResponse {
    /// Current aggregate version.
    pub version: u64,
    /// Number of available stories.
    pub total_stories: u64,
    /// Aggregate last-updated time (epoch ms).
    pub last_updated: u64,
    /// The complete current checksum map.
    pub story_checksums: ChecksumMap,
    /// Whether `clientVersion` equals `version`.
    pub up_to_date: bool,
}

/// A request for signed URLs for a batch of asset paths.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BatchUrlsRequest {
    /// Asset paths relative to the bucket root.
    pub paths: Vec<String>,
}

#[derive(Deserialize)]
struct RawBatchUrlsRequest {
    paths: Option<Vec<String>>,
}

impl BatchUrlsRequest {
    /// Creates a request.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a request, requiring `paths`.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` for invalid JSON and `MissingField` without `paths`.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let raw: RawBatchUrlsRequest = serde_json::from_slice(bytes)?;
        Ok(Self {
            paths: raw.paths.ok_or(ProtocolError::MissingField("paths"))?,
        })
    }

    /// Checks the batch size.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBatch` or `BatchTooLarge`.
    pub fn validate(&self, max_paths: usize) -> ProtocolResult<()> {
        if self.paths.is_empty() {
            return Err(ProtocolError::EmptyBatch);
        }
        if self.paths.len() > max_paths {
            return Err(ProtocolError::BatchTooLarge {
                max: max_paths,
                actual: self.paths.len(),
            });
        }
        Ok(())
    }
}

/// A signed URL for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedAsset {
    /// The requested path.
    pub path: String,
    /// Time-limited URL.
    pub signed_url: String,
    /// Content checksum, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Object size, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Signed URLs for the accepted paths plus the paths that failed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchUrlsResponse {
    /// Signed entries in request order.
    pub urls: Vec<SignedAsset>,
    /// Rejected or unsigned paths in request order.
    pub failed: Vec<String>,
}

/// A client's request for assets changed since its last sync.
///
/// Unlike story sync, every field is optional: a missing checksum map is an
/// initial sync.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSyncRequest {
    /// Asset aggregate version the client last saw.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<u64>,
    /// Asset path to checksum, as held by the client.
    #[serde(default)]
    pub asset_checksums: ChecksumMap,
    /// Client clock at last sync (epoch ms). Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<u64>,
}

impl AssetSyncRequest {
    /// Creates a request.
    pub fn new(client_version: Option<u64>, asset_checksums: ChecksumMap) -> Self {
        Self {
            client_version,
            asset_checksums,
            last_sync_timestamp: None,
        }
    }

    /// Checks the checksum map against the accepted maximum.
    ///
    /// # Errors
    ///
    /// Returns `TooManyChecksums` when the map is larger than `max_checksums`.
    pub fn validate(&self, max_checksums: usize) -> ProtocolResult<()> {
        let actual = self.asset_checksums.len();
        if actual > max_checksums {
            return Err(ProtocolError::TooManyChecksums {
                max: max_checksums,
                actual,
            });
        }
        Ok(())
    }
}

/// The server's answer to an asset sync.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSyncResponse {
    /// Current asset aggregate version.
    pub server_version: u64,
    /// Number of tracked assets.
    pub total_assets: u64,
    /// Number of assets in the diff set.
    pub updated_count: u64,
    /// Asset aggregate last-updated time (epoch ms).
    pub last_updated: u64,
    /// The complete current asset checksum map.
    pub asset_checksums: ChecksumMap,
    /// Signed URLs for changed assets, ordered by path.
    pub updated_assets: Vec<SignedAsset>,
    /// Changed assets that could not be signed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

/// An error reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Whether the same request may succeed later.
    pub retryable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_request_requires_fields() {
        let ok = DeltaSyncRequest::decode(br#"{"clientVersion": 3, "storyChecksums": {"a": "x"}}"#)
            .unwrap();
        assert_eq!(ok.client_version, 3);
        assert_eq!(ok.story_checksums.get("a").map(String::as_str), Some("x"));
        assert_eq!(ok.last_sync_timestamp, None);

        let missing = DeltaSyncRequest::decode(br#"{"storyChecksums": {}}"#);
        assert!(matches!(
            missing,
            Err(ProtocolError::MissingField("clientVersion"))
        ));

        let null = DeltaSyncRequest::decode(br#"{"clientVersion": 0, "storyChecksums": null}"#);
        assert!(matches!(
            null,
            Err(ProtocolError::MissingField("storyChecksums"))
        ));

        let garbage = DeltaSyncRequest::decode(b"{not json");
        assert!(matches!(garbage, Err(ProtocolError::Malformed(_))));

        let negative = DeltaSyncRequest::decode(br#"{"clientVersion": -1, "storyChecksums": {}}"#);
        assert!(matches!(negative, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn delta_request_checksum_limit() {
        let checksums: ChecksumMap = (0..501).map(|i| (format!("s{i}"), "c".into())).collect();
        let request = DeltaSyncRequest::new(1, checksums);
        assert!(matches!(
            request.validate(500),
            Err(ProtocolError::TooManyChecksums {
                max: 500,
                actual: 501
            })
        ));
        assert!(request.validate(501).is_ok());
    }

    #[test]
    fn batch_request_validation() {
        assert!(matches!(
            BatchUrlsRequest::decode(b"{}"),
            Err(ProtocolError::MissingField("paths"))
        ));
        assert!(matches!(
            BatchUrlsRequest::new(Vec::<String>::new()).validate(100),
            Err(ProtocolError::EmptyBatch)
        ));
        let big = BatchUrlsRequest::new((0..101).map(|i| format!("stories/{i}.webp")));
        assert!(matches!(
            big.validate(100),
            Err(ProtocolError::BatchTooLarge {
                max: 100,
                actual: 101
            })
        ));
    }

    #[test]
    fn signed_asset_omits_unknown_metadata() {
        let asset = SignedAsset {
            path: "stories/a/cover.webp".into(),
            signed_url: "https://cdn/x".into(),
            ..SignedAsset::default()
        };
        let value = serde_json::to_value(&asset).unwrap();
        assert_eq!(
            value,
            json!({"path": "stories/a/cover.webp", "signedUrl": "https://cdn/x"})
        );
    }

    #[test]
    fn sync_response_wire_shape() {
        let response = DeltaSyncResponse {
            server_version: 7,
            total_stories: 1,
            updated_stories: 0,
            last_updated: 42,
            story_checksums: [("a".to_string(), "x".to_string())].into(),
            stories: Vec::new(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "serverVersion": 7,
                "totalStories": 1,
                "updatedStories": 0,
                "lastUpdated": 42,
                "storyChecksums": {"a": "x"},
                "stories": []
            })
        );
    }

    #[test]
    fn emptiness_follows_diff_count() {
        let mut response = DeltaSyncResponse::default();
        assert!(response.is_empty());

        response.updated_stories = 2;
        assert!(!response.is_empty());
    }

    #[test]
    fn asset_sync_request_defaults_to_initial() {
        let request: AssetSyncRequest = decode(b"{}").unwrap();
        assert_eq!(request, AssetSyncRequest::default());

        let request: AssetSyncRequest =
            decode(br#"{"clientVersion": 4, "assetChecksums": {"images/a.png": "c1"}}"#).unwrap();
        assert_eq!(request.client_version, Some(4));
        assert_eq!(request.asset_checksums.len(), 1);

        assert!(matches!(
            request.validate(0),
            Err(ProtocolError::TooManyChecksums { max: 0, actual: 1 })
        ));
    }

    #[test]
    fn asset_sync_response_wire_shape() {
        let response = AssetSyncResponse {
            server_version: 3,
            total_assets: 1,
            updated_count: 1,
            last_updated: 9,
            asset_checksums: [("images/a.png".to_string(), "c1".to_string())].into(),
            updated_assets: vec![SignedAsset {
                path: "images/a.png".into(),
                signed_url: "https://cdn/images/a.png".into(),
                checksum: Some("c1".into()),
                ..SignedAsset::default()
            }],
            failed: Vec::new(),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "serverVersion": 3,
                "totalAssets": 1,
                "updatedCount": 1,
                "lastUpdated": 9,
                "assetChecksums": {"images/a.png": "c1"},
                "updatedAssets": [{
                    "path": "images/a.png",
                    "signedUrl": "https://cdn/images/a.png",
                    "checksum": "c1"
                }]
            })
        );
    }

    #[test]
    fn message_dispatch_by_type_code() {
        let message = SyncMessage::VersionCheckRequest(VersionCheckRequest {
            client_version: Some(4),
        });
        assert_eq!(message.type_code(), 3);

        let bytes = message.encode().unwrap();
        let decoded = SyncMessage::decode(message.type_code(), &bytes).unwrap();
        assert_eq!(decoded, message);

        assert_eq!(
            SyncMessage::decode(7, b"{}").unwrap(),
            SyncMessage::AssetSyncRequest(AssetSyncRequest::default())
        );

        assert!(matches!(
            SyncMessage::decode(99, b"{}"),
            Err(ProtocolError::UnknownMessageType(99))
        ));
    }
}
