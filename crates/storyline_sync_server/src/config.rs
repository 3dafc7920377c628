//! Server configuration.

use std::time::Duration;

/// Asset path prefixes accepted by default.
pub const DEFAULT_ASSET_PREFIXES: [&str; 4] = ["stories/", "audio/", "images/", "thumbnails/"];

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum paths in one batch asset request.
    pub max_batch_paths: usize,
    /// Maximum entries in a client's checksum map.
    pub max_client_checksums: usize,
    /// Asset paths must start with one of these.
    pub allowed_prefixes: Vec<String>,
    /// Lifetime of signed asset URLs.
    pub signed_url_ttl: Duration,
}

impl ServerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_batch_paths: 100,
            max_client_checksums: 500,
            allowed_prefixes: DEFAULT_ASSET_PREFIXES
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
            signed_url_ttl: Duration::from_secs(15 * 60),
        }
    }

    /// Sets the maximum batch size.
    pub fn with_max_batch_paths(mut self, max: usize) -> Self {
        self.max_batch_paths = max;
        self
    }

    /// Sets the maximum client checksum map size.
    pub fn with_max_client_checksums(mut self, max: usize) -> Self {
        self.max_client_checksums = max;
        self
    }

    /// Replaces the allowed asset prefixes.
    pub fn with_allowed_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the signed URL lifetime.
    pub fn with_signed_url_ttl(mut self, ttl: Duration) -> Self {
        self.signed_url_ttl = ttl;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_batch_paths, 100);
        assert_eq!(config.max_client_checksums, 500);
        assert_eq!(config.allowed_prefixes.len(), 4);
        assert_eq!(config.signed_url_ttl, Duration::from_secs(900));
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_batch_paths(5)
            .with_max_client_checksums(7)
            .with_allowed_prefixes(["covers/"])
            .with_signed_url_ttl(Duration::from_secs(60));

        assert_eq!(config.max_batch_paths, 5);
        assert_eq!(config.max_client_checksums, 7);
        assert_eq!(config.allowed_prefixes, vec!["covers/".to_string()]);
        assert_eq!(config.signed_url_ttl, Duration::from_secs(60));
    }
}
