//! Sync metadata configuration.

/// Page size used by the upload-candidate query when a type sets none.
pub const DEFAULT_UPLOAD_LIMIT: usize = 100;

/// Configuration for a [`SyncDatabase`](crate::SyncDatabase).
#[derive(Debug, Clone)]
pub struct Config {
    /// Page size of `find_marked_for_upload` for types without their own.
    pub default_upload_limit: usize,

    /// How many upload parents `mark_parent_for_upload` follows at most.
    pub max_parent_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_upload_limit: DEFAULT_UPLOAD_LIMIT,
            max_parent_depth: 8,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default upload page size.
    #[must_use]
    pub const fn default_upload_limit(mut self, limit: usize) -> Self {
        self.default_upload_limit = limit;
        self
    }

    /// Sets the maximum upload parent depth.
    #[must_use]
    pub const fn max_parent_depth(mut self, depth: usize) -> Self {
        self.max_parent_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.default_upload_limit, 100);
        assert_eq!(config.max_parent_depth, 8);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new().default_upload_limit(25).max_parent_depth(2);

        assert_eq!(config.default_upload_limit, 25);
        assert_eq!(config.max_parent_depth, 2);
    }
}
