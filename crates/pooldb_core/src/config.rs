//! Record store configuration.

use pooldb_driver::PoolOptions;
use std::path::PathBuf;

/// What happens to the previous blob when a file slot is overwritten or
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// Rotate into the parallel `_versions` tree, retaining at most this
    /// many versions per slot (oldest pruned).
    Versions(u32),
    /// Move into the parallel `_trashcan` tree under a unique name.
    Trashcan,
    /// Remove the blob outright.
    Remove,
}

/// Configuration for opening a [`crate::Pool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Root directory of the blob tree. `None` disables file storage;
    /// file operations then fail with [`crate::PoolError::FilesDisabled`].
    pub file_root: Option<PathBuf>,

    /// Disposal policy for replaced and deleted blobs.
    pub replace_policy: ReplacePolicy,

    /// Upper bound on ancestry traversal depth. Crossing it (or meeting
    /// the same id twice) is reported as an inconsistency, never silently
    /// truncated.
    pub max_tree_depth: usize,

    /// Connection pool tuning.
    pub connections: PoolOptions,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            file_root: None,
            replace_policy: ReplacePolicy::Trashcan,
            max_tree_depth: 10,
            connections: PoolOptions::default(),
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the blob tree root, enabling file storage.
    #[must_use]
    pub fn file_root(mut self, value: impl Into<PathBuf>) -> Self {
        self.file_root = Some(value.into());
        self
    }

    /// Sets the disposal policy for replaced blobs.
    #[must_use]
    pub const fn replace_policy(mut self, value: ReplacePolicy) -> Self {
        self.replace_policy = value;
        self
    }

    /// Sets the ancestry traversal depth bound.
    #[must_use]
    pub const fn max_tree_depth(mut self, value: usize) -> Self {
        self.max_tree_depth = value;
        self
    }

    /// Sets the connection pool tuning.
    #[must_use]
    pub fn connections(mut self, value: PoolOptions) -> Self {
        self.connections = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.file_root, None);
        assert_eq!(config.replace_policy, ReplacePolicy::Trashcan);
        assert_eq!(config.max_tree_depth, 10);
    }

    #[test]
    fn builder_pattern() {
        let config = PoolConfig::new()
            .file_root("/var/pool/files")
            .replace_policy(ReplacePolicy::Versions(3))
            .max_tree_depth(4);

        assert_eq!(config.file_root, Some(PathBuf::from("/var/pool/files")));
        assert_eq!(config.replace_policy, ReplacePolicy::Versions(3));
        assert_eq!(config.max_tree_depth, 4);
    }
}
