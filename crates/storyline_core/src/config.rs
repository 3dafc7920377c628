//! Core configuration.

use storyline_store::DEFAULT_MAX_IN_QUERY;

/// Configuration for the story store and repair services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Upper bound on IDs per "in" query. The effective limit is the smaller
    /// of this and the document store's own limit.
    pub max_in_query: usize,

    /// Documents fetched per page during full scans.
    pub scan_batch_size: usize,

    /// Largest page size accepted by paginated listings.
    pub max_page_size: usize,

    /// Page size used when a listing does not ask for one.
    pub default_page_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_in_query: DEFAULT_MAX_IN_QUERY,
            scan_batch_size: 100,
            max_page_size: 500,
            default_page_size: 100,
        }
    }
}

impl CoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the "in" query bound.
    #[must_use]
    pub const fn max_in_query(mut self, value: usize) -> Self {
        self.max_in_query = value;
        self
    }

    /// Sets the scan batch size.
    #[must_use]
    pub const fn scan_batch_size(mut self, value: usize) -> Self {
        self.scan_batch_size = value;
        self
    }

    /// Sets the maximum page size.
    #[must_use]
    pub const fn max_page_size(mut self, value: usize) -> Self {
        self.max_page_size = value;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_page_size(mut self, value: usize) -> Self {
        self.default_page_size = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.max_in_query, 10);
        assert_eq!(config.scan_batch_size, 100);
        assert_eq!(config.max_page_size, 500);
        assert_eq!(config.default_page_size, 100);
    }

    #[test]
    fn builder_chain() {
        let config = CoreConfig::new().max_in_query(3).scan_batch_size(7);
        assert_eq!(config.max_in_query, 3);
        assert_eq!(config.scan_batch_size, 7);
    }
}
