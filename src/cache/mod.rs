//! Multi-index read-through caching.
//!
//! A [`Cache`] owns one [`SubCache`] per table and a dispatch table of
//! named accessors. Each accessor binds a sub-cache and one of its paths;
//! [`Cache::value`] consults the path's index first and delegates to the
//! sub-cache's read-through load on a miss, so two identical lookups issue
//! exactly one SELECT between them.
//!
//! The cache is single-owner: no locking, exclusive serialized access, and
//! invalidation is whole-cache or whole-sub-cache [`Cache::clear`].

mod path;
mod sub_cache;

pub use path::{CacheKey, CacheValue, KeyNormalizer, Path, PathKind, PathSpec};
pub use sub_cache::SubCache;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::driver::DbConnection;
use crate::error::{DataAccessError, Result};
use crate::records::Record;
use crate::types::SqlValue;

/// One generated accessor: a sub-cache name and a path name.
#[derive(Debug, Clone)]
struct Accessor {
    sub_cache: String,
    path: String,
}

/// A set of cached tables behind named accessors.
#[derive(Default)]
pub struct Cache {
    sub_caches: HashMap<String, SubCache>,
    accessors: HashMap<String, Accessor>,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Cache::default()
    }

    /// Register a sub-cache under a name.
    pub fn insert_sub_cache(&mut self, name: &str, sub_cache: SubCache) {
        self.sub_caches.insert(name.to_string(), sub_cache);
    }

    /// Bind an accessor name to a sub-cache path.
    pub fn register_accessor(&mut self, accessor: &str, sub_cache: &str, path: &str) {
        self.accessors.insert(
            accessor.to_string(),
            Accessor {
                sub_cache: sub_cache.to_string(),
                path: path.to_string(),
            },
        );
    }

    /// The sub-cache registered under a name.
    ///
    /// # Errors
    /// Unknown sub-cache name.
    pub fn sub_cache(&self, name: &str) -> Result<&SubCache> {
        self.sub_caches
            .get(name)
            .ok_or_else(|| DataAccessError::Other(format!("unknown sub-cache {name}")))
    }

    fn sub_cache_mut(&mut self, name: &str) -> Result<&mut SubCache> {
        self.sub_caches
            .get_mut(name)
            .ok_or_else(|| DataAccessError::Other(format!("unknown sub-cache {name}")))
    }

    /// Look a value up through a named accessor: index hit first, then a
    /// read-through load.
    ///
    /// # Errors
    /// Unknown accessor, plus the path's load errors.
    pub async fn value(
        &mut self,
        conn: &mut dyn DbConnection,
        accessor: &str,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<CacheValue> {
        let target = self
            .accessors
            .get(accessor)
            .cloned()
            .ok_or_else(|| DataAccessError::Other(format!("unknown accessor {accessor}")))?;
        let sub_cache = self.sub_cache_mut(&target.sub_cache)?;
        if let Some(hit) = sub_cache.get_cached_value(&target.path, args)? {
            return Ok(hit);
        }
        sub_cache.load(conn, &target.path, args, cancel).await
    }

    /// Every row of a cached table, loading the table on first use.
    ///
    /// # Errors
    /// Unknown sub-cache, plus load errors.
    pub async fn all_rows(
        &mut self,
        conn: &mut dyn DbConnection,
        sub_cache: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Record>>> {
        let sub_cache = self.sub_cache_mut(sub_cache)?;
        if !sub_cache.all_rows_loaded() {
            sub_cache.load_all_rows(conn, cancel).await?;
        }
        Ok(sub_cache.rows().to_vec())
    }

    /// Drop every cached row in every sub-cache.
    pub fn clear(&mut self) {
        for sub_cache in self.sub_caches.values_mut() {
            sub_cache.clear();
        }
    }

    /// Drop every cached row of one sub-cache.
    ///
    /// # Errors
    /// Unknown sub-cache name.
    pub fn clear_sub_cache(&mut self, name: &str) -> Result<()> {
        self.sub_cache_mut(name)?.clear();
        Ok(())
    }
}
