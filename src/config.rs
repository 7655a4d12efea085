//! Configuration layer: validates the parameters a [`crate::Cache`] is opened with before
//! recovery ever touches the filesystem, following the builder-plus-`build()`-validation shape
//! the teacher uses for its own buffer configuration (`disk_v2::common::DiskBufferConfigBuilder`).

use std::path::PathBuf;

use crate::error::CacheError;

/// Validated parameters for [`crate::Cache::open`].
///
/// Build one with [`CacheConfig::builder`]; `Cache::open` accepts either a fully-built
/// `CacheConfig` or the four raw parameters directly, for callers who don't need the builder.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub(crate) directory: PathBuf,
    pub(crate) app_version: u32,
    pub(crate) value_count: usize,
    pub(crate) max_size: u64,
}

impl CacheConfig {
    /// Starts building a [`CacheConfig`] rooted at `directory`.
    pub fn builder(directory: impl Into<PathBuf>) -> CacheConfigBuilder {
        CacheConfigBuilder {
            directory: directory.into(),
            app_version: 1,
            value_count: None,
            max_size: None,
        }
    }

    pub fn directory(&self) -> &std::path::Path {
        &self.directory
    }

    pub fn app_version(&self) -> u32 {
        self.app_version
    }

    pub fn value_count(&self) -> usize {
        self.value_count
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }
}

/// Builder for [`CacheConfig`].
#[derive(Clone, Debug)]
pub struct CacheConfigBuilder {
    directory: PathBuf,
    app_version: u32,
    value_count: Option<usize>,
    max_size: Option<u64>,
}

impl CacheConfigBuilder {
    /// Sets the version stamped into the journal header; a mismatch against a previously
    /// written journal invalidates the cache and starts it fresh.
    ///
    /// Defaults to `1`.
    pub fn app_version(mut self, version: u32) -> Self {
        self.app_version = version;
        self
    }

    /// Sets the number of value files stored per key. Required.
    pub fn value_count(mut self, value_count: usize) -> Self {
        self.value_count = Some(value_count);
        self
    }

    /// Sets the soft byte budget for the cache. Required.
    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Validates and constructs the [`CacheConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidArgument`] if `value_count` or `max_size` were left unset
    /// or set to zero.
    pub fn build(self) -> Result<CacheConfig, CacheError> {
        let value_count = self.value_count.unwrap_or(0);
        let max_size = self.max_size.unwrap_or(0);

        if value_count == 0 {
            return Err(CacheError::invalid_argument(
                "value_count must be greater than zero",
            ));
        }

        if max_size == 0 {
            return Err(CacheError::invalid_argument(
                "max_size must be greater than zero",
            ));
        }

        Ok(CacheConfig {
            directory: self.directory,
            app_version: self.app_version,
            value_count,
            max_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_value_count() {
        let err = CacheConfig::builder("/tmp/x")
            .max_size(1024)
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
    }

    #[test]
    fn rejects_zero_max_size() {
        let err = CacheConfig::builder("/tmp/x")
            .value_count(2)
            .max_size(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument { .. }));
    }

    #[test]
    fn accepts_valid_config() {
        let config = CacheConfig::builder("/tmp/x")
            .app_version(3)
            .value_count(2)
            .max_size(4096)
            .build()
            .expect("valid config should build");
        assert_eq!(config.app_version(), 3);
        assert_eq!(config.value_count(), 2);
        assert_eq!(config.max_size(), 4096);
    }

    #[cfg(test)]
    mod proptests {
        use proptest::prelude::*;

        use super::super::*;

        proptest! {
            #[test]
            fn never_builds_with_zero_fields(value_count in 0usize..8, max_size in 0u64..4096) {
                let result = CacheConfig::builder("/tmp/x")
                    .value_count(value_count)
                    .max_size(max_size)
                    .build();

                if value_count == 0 || max_size == 0 {
                    prop_assert!(result.is_err());
                } else {
                    prop_assert!(result.is_ok());
                }
            }
        }
    }
}
