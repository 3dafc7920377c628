//! Batch asset URL resolution.
//!
//! Each path in a batch is judged on its own: rejected paths and paths the
//! signer cannot sign land in `failed`, the rest come back signed. Only an
//! empty or oversized batch fails as a whole.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::signer::UrlSigner;
use std::sync::Arc;
use storyline_protocol::{BatchUrlsRequest, BatchUrlsResponse, SignedAsset};
use thiserror::Error;
use tracing::{debug, warn};

/// Why an asset path was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetPathError {
    /// Empty or blank path.
    #[error("path is empty")]
    Empty,
    /// Contains a `..` segment, raw or percent-encoded.
    #[error("path traversal")]
    Traversal,
    /// A segment does not percent-decode to UTF-8, or is nested too deep.
    #[error("undecodable path segment")]
    BadEncoding,
    /// Starts at a filesystem root or drive.
    #[error("absolute path")]
    Absolute,
    /// Contains a raw or percent-encoded NUL.
    #[error("null byte")]
    NullByte,
    /// Outside every allowed prefix.
    #[error("path outside allowed prefixes")]
    DisallowedPrefix,
}

/// Checks an asset path against the safety rules and prefix allowlist.
///
/// # Errors
///
/// Returns the first rule the path breaks.
pub fn validate_asset_path(path: &str, allowed_prefixes: &[String]) -> Result<(), AssetPathError> {
    if path.trim().is_empty() {
        return Err(AssetPathError::Empty);
    }

    let lower = path.to_ascii_lowercase();
    if path.contains('\0') || lower.contains("%00") || lower.contains("%2500") {
        return Err(AssetPathError::NullByte);
    }
    for segment in path.split(['/', '\\']) {
        let decoded = fully_decoded(segment).ok_or(AssetPathError::BadEncoding)?;
        if decoded.split(['/', '\\']).any(|part| part == "..") {
            return Err(AssetPathError::Traversal);
        }
    }
    if path.starts_with('/') || path.starts_with('\\') || has_drive_letter(path) {
        return Err(AssetPathError::Absolute);
    }
    if !allowed_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return Err(AssetPathError::DisallowedPrefix);
    }
    Ok(())
}

const MAX_DECODE_ROUNDS: usize = 4;

/// Percent-decodes until the text stops changing.
fn fully_decoded(segment: &str) -> Option<String> {
    let mut current = segment.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        let decoded = urlencoding::decode(&current).ok()?.into_owned();
        if decoded == current {
            return Some(current);
        }
        current = decoded;
    }
    None
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Validates asset batches and signs the valid paths.
pub struct AssetResolver {
    signer: Arc<dyn UrlSigner>,
    config: ServerConfig,
}

impl std::fmt::Debug for AssetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AssetResolver {
    /// Creates a resolver.
    pub fn new(signer: Arc<dyn UrlSigner>, config: ServerConfig) -> Self {
        Self { signer, config }
    }

    /// Resolves a batch. Per-path failures are data, not errors.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty batch or one over the size limit;
    /// nothing is signed in that case.
    pub fn resolve(&self, request: &BatchUrlsRequest) -> ServerResult<BatchUrlsResponse> {
        request.validate(self.config.max_batch_paths)?;

        let (urls, failed) = self.sign_paths(request.paths.iter().map(String::as_str));
        let response = BatchUrlsResponse { urls, failed };

        debug!(
            requested = request.paths.len(),
            signed = response.urls.len(),
            failed = response.failed.len(),
            "asset batch resolved"
        );
        Ok(response)
    }

    /// Validates and signs each path on its own, without a batch limit.
    ///
    /// Returns the signed assets and the failed paths, both in input order.
    pub fn sign_paths<'a>(
        &self,
        paths: impl IntoIterator<Item = &'a str>,
    ) -> (Vec<SignedAsset>, Vec<String>) {
        let mut signed = Vec::new();
        let mut failed = Vec::new();
        for path in paths {
            if let Err(reason) = validate_asset_path(path, &self.config.allowed_prefixes) {
                warn!(path = %path, %reason, "asset path rejected");
                failed.push(path.to_string());
                continue;
            }
            match self.signer.sign(path, self.config.signed_url_ttl) {
                Ok(asset) => signed.push(asset),
                Err(e) => {
                    warn!(path = %path, error = %e, "asset signing failed");
                    failed.push(path.to_string());
                }
            }
        }
        (signed, failed)
    }
}
