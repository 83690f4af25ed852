//! Per-table caching: one sub-cache owns a table's loaded rows and paths.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::path::{CacheValue, Path, PathKind, PathSpec};
use crate::dialect::Dialect;
use crate::driver::{DbConnection, RowFactory};
use crate::error::{DataAccessError, Result};
use crate::query::{Conditions, QueryBuilder};
use crate::records::{Record, TableSpec};
use crate::types::SqlValue;

/// The caching unit for one table.
///
/// Owns the loaded row instances and one [`Path`] per index. Loading a row
/// through any path write-throughs it into every single-row path, so later
/// lookups by other keys hit without a round-trip.
pub struct SubCache {
    spec: Arc<TableSpec>,
    dialect: Arc<dyn Dialect>,
    paths: Vec<Path>,
    all_rows: Vec<Arc<Record>>,
    all_rows_loaded: bool,
    load_all_rows_on_first_load: bool,
}

impl SubCache {
    #[must_use]
    pub fn new(spec: Arc<TableSpec>, dialect: Arc<dyn Dialect>) -> Self {
        SubCache {
            spec,
            dialect,
            paths: Vec::new(),
            all_rows: Vec::new(),
            all_rows_loaded: false,
            load_all_rows_on_first_load: false,
        }
    }

    /// The first miss on any path loads the whole table.
    #[must_use]
    pub fn load_all_rows_on_first_load(mut self) -> Self {
        self.load_all_rows_on_first_load = true;
        self
    }

    #[must_use]
    pub fn with_path(mut self, spec: PathSpec) -> Self {
        self.paths.push(Path::new(spec));
        self
    }

    #[must_use]
    pub fn spec(&self) -> &Arc<TableSpec> {
        &self.spec
    }

    #[must_use]
    pub fn all_rows_loaded(&self) -> bool {
        self.all_rows_loaded
    }

    /// The path registered under a name.
    ///
    /// # Errors
    /// Unknown path name.
    pub fn path(&self, name: &str) -> Result<&Path> {
        self.paths
            .iter()
            .find(|path| path.spec().name == name)
            .ok_or_else(|| DataAccessError::Other(format!("unknown path {name}")))
    }

    fn path_index(&self, name: &str) -> Result<usize> {
        self.paths
            .iter()
            .position(|path| path.spec().name == name)
            .ok_or_else(|| DataAccessError::Other(format!("unknown path {name}")))
    }

    /// Drop every cached row and index entry.
    pub fn clear(&mut self) {
        for path in &mut self.paths {
            path.clear();
        }
        self.all_rows.clear();
        self.all_rows_loaded = false;
    }

    /// Answer a lookup from the index alone, without touching the driver.
    ///
    /// # Errors
    /// Key-shape or normalizer errors.
    pub fn get_cached_value(
        &self,
        path_name: &str,
        args: &[SqlValue],
    ) -> Result<Option<CacheValue>> {
        let index = self.path_index(path_name)?;
        let path = &self.paths[index];
        let key = path.lookup_key(args)?;
        Ok(path.get_cached(&key).map(|rows| path.shape(rows)))
    }

    /// Read-through load for one path.
    ///
    /// # Errors
    /// `NoDataFound`/`TooManyRows` per the path's cardinality contract
    /// (unless `ignore_row_not_cached` tolerates the miss), plus
    /// composition and driver errors.
    pub async fn load(
        &mut self,
        conn: &mut dyn DbConnection,
        path_name: &str,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<CacheValue> {
        let index = self.path_index(path_name)?;
        if self.load_all_rows_on_first_load && !self.all_rows_loaded {
            self.load_all_rows(conn, cancel).await?;
            return self.answer_cached(index, args);
        }
        if let Some(via) = self.paths[index].spec().load_via_path_name.clone() {
            let via_index = self.path_index(&via)?;
            let rows = self.fetch(conn, via_index, args, cancel).await?;
            self.on_load_rows(&rows)?;
            if self.paths[index].spec().kind == PathKind::MultipleRows {
                let table = self.spec.table_name.clone();
                return self.paths[index].on_load(&table, args, rows);
            }
            return self.answer_cached(index, args);
        }
        let rows = self.fetch(conn, index, args, cancel).await?;
        // cardinality before indexing: an over-full single-row load must
        // not surface as a write-through key conflict
        if self.paths[index].spec().kind == PathKind::SingleRow && rows.len() > 1 {
            return Err(DataAccessError::TooManyRows {
                table: self.spec.table_name.clone(),
                count: rows.len(),
            });
        }
        self.on_load_rows(&rows)?;
        if rows.is_empty() && self.paths[index].spec().ignore_row_not_cached {
            return Ok(self.paths[index].on_row_not_cached());
        }
        let table = self.spec.table_name.clone();
        self.paths[index].on_load(&table, args, rows)
    }

    /// Fetch every row of the table and rebuild all indexes.
    ///
    /// # Errors
    /// Composition, driver, and indexing errors.
    pub async fn load_all_rows(
        &mut self,
        conn: &mut dyn DbConnection,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let rows = QueryBuilder::new(conn, self.dialect.as_ref())
            .get_rows(&self.spec, &Conditions::new(), cancel)
            .await?;
        for path in &mut self.paths {
            path.clear();
        }
        self.all_rows = rows.into_iter().map(Arc::new).collect();
        let loaded = self.all_rows.clone();
        for row in &loaded {
            for path in &mut self.paths {
                match path.spec().kind {
                    PathKind::SingleRow => path.on_load_row(row)?,
                    PathKind::MultipleRows => path.append_row(row)?,
                }
            }
        }
        self.all_rows_loaded = true;
        Ok(())
    }

    /// Every loaded row, after a load-all.
    #[must_use]
    pub fn rows(&self) -> &[Arc<Record>] {
        &self.all_rows
    }

    /// Write-through: index freshly loaded rows into every single-row path.
    fn on_load_rows(&mut self, rows: &[Arc<Record>]) -> Result<()> {
        for row in rows {
            for path in &mut self.paths {
                if path.spec().kind == PathKind::SingleRow {
                    path.on_load_row(row)?;
                }
            }
        }
        Ok(())
    }

    fn answer_cached(&self, index: usize, args: &[SqlValue]) -> Result<CacheValue> {
        let path = &self.paths[index];
        let key = path.lookup_key(args)?;
        if let Some(rows) = path.get_cached(&key) {
            return Ok(path.shape(rows));
        }
        if path.spec().ignore_row_not_cached {
            return Ok(path.on_row_not_cached());
        }
        match path.spec().kind {
            PathKind::SingleRow => Err(DataAccessError::NoDataFound {
                table: self.spec.table_name.clone(),
                conditions: format!("{}={args:?}", path.spec().name),
            }),
            PathKind::MultipleRows => Ok(CacheValue::Rows(Vec::new())),
        }
    }

    /// One SELECT for a path's key: equality conditions over the key shape.
    ///
    /// With normalizers, the normalized key columns are omitted from the
    /// column list and the row factory is seeded with their cache-key
    /// values instead.
    async fn fetch(
        &self,
        conn: &mut dyn DbConnection,
        index: usize,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Record>>> {
        let path_spec = self.paths[index].spec();
        if args.len() != path_spec.retrieval_attr_names.len() {
            return Err(DataAccessError::Other(format!(
                "path {} takes {} key values, got {}",
                path_spec.name,
                path_spec.retrieval_attr_names.len(),
                args.len()
            )));
        }
        let pairs: Vec<(String, SqlValue)> = path_spec
            .retrieval_attr_names
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        let conditions = Conditions::from_pairs(&pairs);
        let mut builder = QueryBuilder::new(conn, self.dialect.as_ref());
        let rows = if path_spec.normalizers.is_empty() {
            builder.get_rows(&self.spec, &conditions, cancel).await?
        } else {
            let omitted = &path_spec.retrieval_attr_names[..path_spec.normalizers.len()];
            let mut seeded = Vec::with_capacity(path_spec.normalizers.len());
            for (normalize, raw) in path_spec.normalizers.iter().zip(args.iter().cloned()) {
                seeded.push(normalize(raw)?);
            }
            let columns: Vec<String> = self
                .spec
                .attr_names
                .iter()
                .filter(|attr| !omitted.contains(attr))
                .cloned()
                .collect();
            let factory = seeded_factory(
                self.spec.clone(),
                omitted.to_vec(),
                seeded,
                columns.clone(),
            );
            builder
                .get_rows_with(&self.spec.table_name, &columns, &conditions, factory, cancel)
                .await?
        };
        Ok(rows.into_iter().map(Arc::new).collect())
    }
}

/// A row factory pre-seeded with normalized key values for the columns the
/// SELECT omitted.
fn seeded_factory(
    spec: Arc<TableSpec>,
    omitted: Vec<String>,
    seeded: Vec<SqlValue>,
    columns: Vec<String>,
) -> RowFactory {
    Arc::new(move |fetched| {
        if fetched.len() != columns.len() {
            return Err(DataAccessError::Other(format!(
                "expected {} columns, fetched {}",
                columns.len(),
                fetched.len()
            )));
        }
        let mut record = Record::empty(spec.clone());
        for (attr, value) in omitted.iter().zip(seeded.iter().cloned()) {
            record.set(attr, value)?;
        }
        for (attr, value) in columns.iter().zip(fetched) {
            record.set(attr, value)?;
        }
        Ok(record)
    })
}
