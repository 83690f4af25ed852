//! Secondary indexes over a cached table.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{DataAccessError, Result};
use crate::records::Record;
use crate::types::SqlValue;

/// Normalizes a raw key value to its cache-key form (case folding,
/// resolving an id to a canonical value, and so on).
pub type KeyNormalizer = Arc<dyn Fn(SqlValue) -> Result<SqlValue> + Send + Sync>;

/// Cardinality contract of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// At most one row per key; a load of zero rows is `NoDataFound`, more
    /// than one is `TooManyRows`.
    SingleRow,
    /// Any number of rows per key, stored verbatim.
    MultipleRows,
}

/// Declarative definition of one path.
#[derive(Clone)]
pub struct PathSpec {
    pub name: String,
    pub kind: PathKind,
    /// Ordered key shape; arity 1 keys look up by scalar, arity >= 2 by
    /// tuple.
    pub retrieval_attr_names: Vec<String>,
    /// Normalizers for a leading prefix of the key shape. When non-empty,
    /// loads omit the normalized columns from the SELECT and the row
    /// factory is seeded with the normalized key values.
    pub normalizers: Vec<KeyNormalizer>,
    /// Key attributes upper-cased on lookup and indexing.
    pub string_retrieval_attr_names: Vec<String>,
    /// Perform miss-loads through this sibling path; this path then answers
    /// from its own index, populated as a side-effect.
    pub load_via_path_name: Option<String>,
    /// A lookup miss answers with the path's empty value instead of
    /// failing.
    pub ignore_row_not_cached: bool,
}

impl PathSpec {
    #[must_use]
    pub fn single_row(name: &str, retrieval_attr_names: &[&str]) -> Self {
        Self::with_kind(name, PathKind::SingleRow, retrieval_attr_names)
    }

    #[must_use]
    pub fn multiple_rows(name: &str, retrieval_attr_names: &[&str]) -> Self {
        Self::with_kind(name, PathKind::MultipleRows, retrieval_attr_names)
    }

    fn with_kind(name: &str, kind: PathKind, retrieval_attr_names: &[&str]) -> Self {
        PathSpec {
            name: name.to_string(),
            kind,
            retrieval_attr_names: retrieval_attr_names
                .iter()
                .map(ToString::to_string)
                .collect(),
            normalizers: Vec::new(),
            string_retrieval_attr_names: Vec::new(),
            load_via_path_name: None,
            ignore_row_not_cached: false,
        }
    }

    #[must_use]
    pub fn with_normalizers(mut self, normalizers: Vec<KeyNormalizer>) -> Self {
        self.normalizers = normalizers;
        self
    }

    #[must_use]
    pub fn with_string_attrs(mut self, attr_names: &[&str]) -> Self {
        self.string_retrieval_attr_names =
            attr_names.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn load_via(mut self, path_name: &str) -> Self {
        self.load_via_path_name = Some(path_name.to_string());
        self
    }

    #[must_use]
    pub fn ignoring_row_not_cached(mut self) -> Self {
        self.ignore_row_not_cached = true;
        self
    }
}

impl fmt::Debug for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("retrieval_attr_names", &self.retrieval_attr_names)
            .field("normalizers", &self.normalizers.len())
            .field(
                "string_retrieval_attr_names",
                &self.string_retrieval_attr_names,
            )
            .field("load_via_path_name", &self.load_via_path_name)
            .field("ignore_row_not_cached", &self.ignore_row_not_cached)
            .finish()
    }
}

/// A hashable index key built from normalized key values.
///
/// `SqlValue` itself is not `Eq` because of floats; the key compares and
/// hashes floats by bit pattern and JSON by its serialized form.
#[derive(Debug, Clone)]
pub struct CacheKey(Vec<SqlValue>);

impl CacheKey {
    #[must_use]
    pub fn new(values: Vec<SqlValue>) -> Self {
        CacheKey(values)
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }
}

fn key_value_eq(a: &SqlValue, b: &SqlValue) -> bool {
    match (a, b) {
        (SqlValue::Float(x), SqlValue::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

fn hash_key_value<S: Hasher>(value: &SqlValue, state: &mut S) {
    std::mem::discriminant(value).hash(state);
    match value {
        SqlValue::Int(v) => v.hash(state),
        SqlValue::Float(v) => v.to_bits().hash(state),
        SqlValue::Text(v) => v.hash(state),
        SqlValue::Bool(v) => v.hash(state),
        SqlValue::Timestamp(v) => v.hash(state),
        SqlValue::Blob(v) => v.hash(state),
        SqlValue::Json(v) => v.to_string().hash(state),
        SqlValue::Null => {}
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| key_value_eq(a, b))
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<S: Hasher>(&self, state: &mut S) {
        for value in &self.0 {
            hash_key_value(value, state);
        }
    }
}

/// A cached answer, shaped by the owning path's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// Single-row path result; `None` only under `ignore_row_not_cached`.
    Row(Option<Arc<Record>>),
    /// Multiple-row path result, possibly empty.
    Rows(Vec<Arc<Record>>),
}

impl CacheValue {
    /// The single row, when this value came from a single-row path.
    #[must_use]
    pub fn as_row(&self) -> Option<&Arc<Record>> {
        match self {
            CacheValue::Row(row) => row.as_ref(),
            CacheValue::Rows(_) => None,
        }
    }

    /// The row list, when this value came from a multiple-row path.
    #[must_use]
    pub fn as_rows(&self) -> &[Arc<Record>] {
        match self {
            CacheValue::Rows(rows) => rows,
            CacheValue::Row(_) => &[],
        }
    }
}

/// One live index: a path spec plus its keyed rows.
pub struct Path {
    spec: PathSpec,
    rows: HashMap<CacheKey, Vec<Arc<Record>>>,
}

impl Path {
    #[must_use]
    pub fn new(spec: PathSpec) -> Self {
        Path {
            spec,
            rows: HashMap::new(),
        }
    }

    #[must_use]
    pub fn spec(&self) -> &PathSpec {
        &self.spec
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    fn uppercase_if_string_attr(&self, attr: &str, value: SqlValue) -> SqlValue {
        if self.spec.string_retrieval_attr_names.iter().any(|a| a == attr) {
            if let SqlValue::Text(text) = &value {
                return SqlValue::Text(text.to_uppercase());
            }
        }
        value
    }

    /// Build the index key for a lookup: normalizers over the leading
    /// prefix, then canonical-case folding for string key attributes.
    ///
    /// # Errors
    /// Key arity mismatch, or a normalizer failure.
    pub fn lookup_key(&self, args: &[SqlValue]) -> Result<CacheKey> {
        if args.len() != self.spec.retrieval_attr_names.len() {
            return Err(DataAccessError::Other(format!(
                "path {} takes {} key values, got {}",
                self.spec.name,
                self.spec.retrieval_attr_names.len(),
                args.len()
            )));
        }
        let mut values = Vec::with_capacity(args.len());
        for (position, (attr, raw)) in self
            .spec
            .retrieval_attr_names
            .iter()
            .zip(args.iter().cloned())
            .enumerate()
        {
            let normalized = match self.spec.normalizers.get(position) {
                Some(normalize) => normalize(raw)?,
                None => raw,
            };
            values.push(self.uppercase_if_string_attr(attr, normalized));
        }
        Ok(CacheKey(values))
    }

    /// Build the index key from a loaded row. Normalized key attributes
    /// already carry their cache-key form in the record, so only case
    /// folding applies here.
    ///
    /// # Errors
    /// A key attribute missing from the record.
    pub fn row_key(&self, row: &Record) -> Result<CacheKey> {
        let mut values = Vec::with_capacity(self.spec.retrieval_attr_names.len());
        for attr in &self.spec.retrieval_attr_names {
            let value = row.get(attr).cloned().ok_or_else(|| {
                DataAccessError::Other(format!(
                    "path {} key attribute {attr} not in row",
                    self.spec.name
                ))
            })?;
            values.push(self.uppercase_if_string_attr(attr, value));
        }
        Ok(CacheKey(values))
    }

    /// The cached entry for a key, if present.
    #[must_use]
    pub fn get_cached(&self, key: &CacheKey) -> Option<&Vec<Arc<Record>>> {
        self.rows.get(key)
    }

    /// Shape a cached entry as this path's value.
    #[must_use]
    pub fn shape(&self, rows: &[Arc<Record>]) -> CacheValue {
        match self.spec.kind {
            PathKind::SingleRow => CacheValue::Row(rows.first().cloned()),
            PathKind::MultipleRows => CacheValue::Rows(rows.to_vec()),
        }
    }

    /// The path's empty answer for a tolerated miss.
    #[must_use]
    pub fn on_row_not_cached(&self) -> CacheValue {
        match self.spec.kind {
            PathKind::SingleRow => CacheValue::Row(None),
            PathKind::MultipleRows => CacheValue::Rows(Vec::new()),
        }
    }

    /// Write-through for single-row paths: index one freshly loaded row.
    ///
    /// Re-indexing the same row is a no-op; a different row under an
    /// occupied key is `DuplicateKey`.
    ///
    /// # Errors
    /// `DuplicateKey` on a conflicting entry; key-shape errors from
    /// [`Path::row_key`].
    pub fn on_load_row(&mut self, row: &Arc<Record>) -> Result<()> {
        debug_assert_eq!(self.spec.kind, PathKind::SingleRow);
        let key = self.row_key(row)?;
        if let Some(existing) = self.rows.get(&key) {
            if existing.first().is_some_and(|cached| cached.as_ref() != row.as_ref()) {
                return Err(DataAccessError::DuplicateKey {
                    scope: self.spec.name.clone(),
                    key: format!("{:?}", key.values()),
                });
            }
        }
        self.rows.insert(key, vec![row.clone()]);
        Ok(())
    }

    /// Append a row under its key (multiple-row indexing during load-all).
    ///
    /// # Errors
    /// Key-shape errors from [`Path::row_key`].
    pub fn append_row(&mut self, row: &Arc<Record>) -> Result<()> {
        let key = self.row_key(row)?;
        self.rows.entry(key).or_default().push(row.clone());
        Ok(())
    }

    /// Store a freshly loaded result set under its lookup key and return
    /// the path's answer.
    ///
    /// # Errors
    /// For single-row paths, `NoDataFound` on zero rows and `TooManyRows`
    /// on more than one.
    pub fn on_load(
        &mut self,
        table: &str,
        args: &[SqlValue],
        rows: Vec<Arc<Record>>,
    ) -> Result<CacheValue> {
        if self.spec.kind == PathKind::SingleRow {
            match rows.len() {
                1 => {}
                0 => {
                    return Err(DataAccessError::NoDataFound {
                        table: table.to_string(),
                        conditions: format!("{}={args:?}", self.spec.name),
                    });
                }
                count => {
                    return Err(DataAccessError::TooManyRows {
                        table: table.to_string(),
                        count,
                    });
                }
            }
        }
        let key = self.lookup_key(args)?;
        let value = self.shape(&rows);
        self.rows.insert(key, rows);
        Ok(value)
    }
}
