//! Sign command implementation.

use std::sync::Arc;
use std::time::Duration;
use storyline_protocol::{BatchUrlsRequest, BatchUrlsResponse};
use storyline_sync_server::{AssetResolver, HmacUrlSigner, ServerConfig};
use tracing::info;

/// Environment variable holding the signing secret.
pub const SECRET_ENV: &str = "STORYLINE_SIGNING_SECRET";

/// Runs the sign command.
pub fn run(
    base_url: &str,
    secret: Option<String>,
    ttl_secs: u64,
    paths: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let secret = secret
        .or_else(|| std::env::var(SECRET_ENV).ok())
        .ok_or_else(|| format!("Signing secret required (--secret or {SECRET_ENV})"))?;
    info!("Signing {} asset paths under {}", paths.len(), base_url);
    let signer = HmacUrlSigner::new(secret.into_bytes(), base_url);

    let response = sign(signer, Duration::from_secs(ttl_secs), paths)?;
    for asset in &response.urls {
        println!("{}", asset.signed_url);
    }
    for path in &response.failed {
        eprintln!("✗ {}", path);
    }

    if response.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} paths could not be signed", response.failed.len()).into())
    }
}

/// Validates and signs a batch of paths.
pub fn sign(
    signer: HmacUrlSigner,
    ttl: Duration,
    paths: Vec<String>,
) -> Result<BatchUrlsResponse, Box<dyn std::error::Error>> {
    let config = ServerConfig::default().with_signed_url_ttl(ttl);
    let resolver = AssetResolver::new(Arc::new(signer), config);
    Ok(resolver.resolve(&BatchUrlsRequest::new(paths))?)
}

/// Checks a signed URL against the secret.
pub fn verify(
    base_url: &str,
    secret: Option<String>,
    url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let secret = secret
        .or_else(|| std::env::var(SECRET_ENV).ok())
        .ok_or_else(|| format!("Signing secret required (--secret or {SECRET_ENV})"))?;
    let signer = HmacUrlSigner::new(secret.into_bytes(), base_url);
    if signer.verify_url(url) {
        println!("✓ Signature valid");
        Ok(())
    } else {
        Err("Signature invalid or expired".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_valid_paths_only() {
        let signer = HmacUrlSigner::new(b"s".to_vec(), "https://cdn.example.com");
        let response = sign(
            signer,
            Duration::from_secs(60),
            vec!["stories/a/cover.webp".into(), "../x".into()],
        )
        .unwrap();
        assert_eq!(response.urls.len(), 1);
        assert_eq!(response.failed, vec!["../x".to_string()]);

        let url = response.urls[0].signed_url.clone();
        assert!(verify("https://cdn.example.com", Some("s".into()), &url).is_ok());
        assert!(verify("https://cdn.example.com", Some("other".into()), &url).is_err());
    }

    #[test]
    fn empty_batch_is_an_error() {
        let signer = HmacUrlSigner::new(b"s".to_vec(), "https://cdn.example.com");
        assert!(sign(signer, Duration::from_secs(60), Vec::new()).is_err());
    }
}
