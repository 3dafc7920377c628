//! Signed asset URLs.
//!
//! [`UrlSigner`] is the seam to whatever object store serves story assets.
//! [`HmacUrlSigner`] is a self-contained implementation: URLs carry an
//! expiry and an HMAC-SHA256 signature over the path and expiry.
//!
//! ## URL Format
//!
//! ```text
//! <base_url>/<path>?expires=<unix seconds>&signature=<hex hmac>
//! ```
//!
//! Each path segment is percent-encoded into the URL; the signature covers
//! the decoded path.

use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use storyline_protocol::SignedAsset;
use thiserror::Error;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Why a single asset could not be signed.
#[derive(Debug, Error)]
pub enum SignError {
    /// The object does not exist.
    #[error("asset not found: {0}")]
    NotFound(String),

    /// The signing backend cannot be reached.
    #[error("signer unavailable: {0}")]
    Unavailable(String),

    /// The configured base URL cannot carry asset paths.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The signing key was rejected.
    #[error("signing key rejected: {0}")]
    Key(String),
}

/// Produces time-limited URLs for asset paths.
///
/// Paths passed in have already been validated.
pub trait UrlSigner: Send + Sync {
    /// Signs one path.
    ///
    /// # Errors
    ///
    /// Returns an error if this path cannot be signed; other paths in the
    /// same batch are unaffected.
    fn sign(&self, path: &str, ttl: Duration) -> Result<SignedAsset, SignError>;
}

/// Known facts about a stored object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetMetadata {
    /// Content checksum.
    pub checksum: Option<String>,
    /// Size in bytes.
    pub size_bytes: Option<u64>,
    /// MIME type, overriding the extension guess.
    pub content_type: Option<String>,
}

/// HMAC-SHA256 URL signer.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use storyline_sync_server::{HmacUrlSigner, UrlSigner};
///
/// let signer = HmacUrlSigner::new(b"secret".to_vec(), "https://cdn.example.com");
/// let asset = signer.sign("stories/moon/cover.webp", Duration::from_secs(60)).unwrap();
/// assert!(signer.verify_url(&asset.signed_url));
/// ```
pub struct HmacUrlSigner {
    secret: Vec<u8>,
    base_url: String,
    metadata: RwLock<HashMap<String, AssetMetadata>>,
    require_registered: bool,
}

impl std::fmt::Debug for HmacUrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacUrlSigner")
            .field("base_url", &self.base_url)
            .field("require_registered", &self.require_registered)
            .finish_non_exhaustive()
    }
}

impl HmacUrlSigner {
    /// Creates a signer for URLs under `base_url`.
    pub fn new(secret: Vec<u8>, base_url: impl Into<String>) -> Self {
        Self {
            secret,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            metadata: RwLock::new(HashMap::new()),
            require_registered: false,
        }
    }

    /// Only sign paths that were registered; others fail with `NotFound`.
    pub fn with_require_registered(mut self, require: bool) -> Self {
        self.require_registered = require;
        self
    }

    /// Records metadata for an object.
    pub fn register(&self, path: impl Into<String>, metadata: AssetMetadata) {
        self.metadata.write().insert(path.into(), metadata);
    }

    /// Signs a path with an explicit expiry (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns `InvalidBaseUrl` if the base URL does not parse or cannot
    /// take a path, and `Key` if the secret is unusable.
    pub fn sign_until(&self, path: &str, expires: u64) -> Result<String, SignError> {
        let signature = hex::encode(self.mac(path, expires)?);
        let mut url = self.base()?;
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|()| SignError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(path.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    /// Checks a signature for a path and expiry at time `now` (unix seconds).
    pub fn verify(&self, path: &str, expires: u64, signature: &str, now: u64) -> bool {
        if now > expires {
            return false;
        }
        let Ok(given) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(signing_input(path, expires).as_bytes());
        mac.verify_slice(&given).is_ok()
    }

    /// Parses and checks a URL produced by this signer against the clock.
    pub fn verify_url(&self, url: &str) -> bool {
        self.parse_signed(url).is_some_and(|(path, expires, signature)| {
            self.verify(&path, expires, &signature, unix_seconds())
        })
    }

    /// Splits a signed URL into `(path, expires, signature)`.
    fn parse_signed(&self, url: &str) -> Option<(String, u64, String)> {
        let base = self.base().ok()?;
        let url = Url::parse(url).ok()?;
        if url.origin() != base.origin() || url.fragment().is_some() {
            return None;
        }

        let prefix: Vec<&str> = base.path_segments()?.filter(|s| !s.is_empty()).collect();
        let segments: Vec<&str> = url.path_segments()?.collect();
        let path = segments
            .strip_prefix(prefix.as_slice())?
            .iter()
            .map(|segment| urlencoding::decode(segment).map(Cow::into_owned))
            .collect::<Result<Vec<_>, _>>()
            .ok()?
            .join("/");

        let mut expires = None;
        let mut signature = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "expires" => expires = Some(value.parse::<u64>().ok()?),
                "signature" => signature = Some(value.into_owned()),
                _ => return None,
            }
        }
        Some((path, expires?, signature?))
    }

    fn base(&self) -> Result<Url, SignError> {
        Url::parse(&self.base_url)
            .map_err(|e| SignError::InvalidBaseUrl(format!("{}: {e}", self.base_url)))
    }

    fn mac(&self, path: &str, expires: u64) -> Result<Vec<u8>, SignError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| SignError::Key(e.to_string()))?;
        mac.update(signing_input(path, expires).as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl UrlSigner for HmacUrlSigner {
    fn sign(&self, path: &str, ttl: Duration) -> Result<SignedAsset, SignError> {
        let metadata = self.metadata.read().get(path).cloned();
        if metadata.is_none() && self.require_registered {
            return Err(SignError::NotFound(path.to_string()));
        }
        let metadata = metadata.unwrap_or_default();

        let expires = unix_seconds().saturating_add(ttl.as_secs());
        Ok(SignedAsset {
            path: path.to_string(),
            signed_url: self.sign_until(path, expires)?,
            checksum: metadata.checksum,
            size_bytes: metadata.size_bytes,
            content_type: metadata
                .content_type
                .or_else(|| content_type_for(path).map(str::to_string)),
        })
    }
}

fn signing_input(path: &str, expires: u64) -> String {
    format!("{path}\n{expires}")
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Guesses a MIME type from the file extension.
pub fn content_type_for(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match ext.as_str() {
        "webp" => "image/webp",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "json" => "application/json",
        _ => return None,
    })
}
