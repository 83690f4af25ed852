//! Table descriptors and dynamic row records.
//!
//! A [`TableSpec`] declares the persisted shape of one table: attribute
//! names in column order, primary-key attributes, retrieval keys, LOB
//! columns, and the optional stored-procedure or sequence plumbing used at
//! flush time. A [`Record`] is one row image over a shared spec.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DataAccessError, Result};
use crate::types::SqlValue;

/// Split a whitespace-delimited name list.
///
/// Loaders that ingest text config accept `"id name salary"` wherever an
/// explicit list is expected; the API itself only takes lists.
#[must_use]
pub fn split_names(names: &str) -> Vec<String> {
    names.split_whitespace().map(str::to_string).collect()
}

/// Static description of one persisted table.
#[derive(Debug, Clone, Default)]
pub struct TableSpec {
    /// Table name used in generated SQL
    pub table_name: String,
    /// Persisted attribute names, in column order
    pub attr_names: Vec<String>,
    /// Transient attribute names (never persisted)
    pub extra_attr_names: Vec<String>,
    /// Primary-key attribute names (zero, one, or many)
    pub pk_attr_names: Vec<String>,
    /// Key shape used by `retrieve`
    pub retrieval_attr_names: Vec<String>,
    /// Table to target for DML when it differs from `table_name`
    pub update_table_name: Option<String>,
    /// Package prefix for stored-procedure names
    pub update_package_name: Option<String>,
    /// Stored procedure replacing generated INSERTs
    pub insert_procedure_name: Option<String>,
    /// Stored procedure replacing generated UPDATEs
    pub update_procedure_name: Option<String>,
    /// Stored procedure replacing generated DELETEs
    pub delete_procedure_name: Option<String>,
    /// Sequence that supplies generated primary keys
    pub pk_sequence_name: Option<String>,
    /// Whether the driver generates the primary key on insert
    pub pk_is_generated: bool,
    /// Attributes bound with the dialect's CLOB type token
    pub clob_attr_names: Vec<String>,
    /// Attributes bound with the dialect's BLOB type token
    pub blob_attr_names: Vec<String>,
    // Attribute name -> position in attr_names, built once per spec
    attr_index: HashMap<String, usize>,
}

impl TableSpec {
    /// Create a spec with the given table name and persisted attributes.
    #[must_use]
    pub fn new(table_name: &str, attr_names: &[&str]) -> Self {
        let attr_names: Vec<String> = attr_names.iter().map(|s| (*s).to_string()).collect();
        let attr_index = attr_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        TableSpec {
            table_name: table_name.to_string(),
            attr_names,
            attr_index,
            ..TableSpec::default()
        }
    }

    /// Rebuild the attribute index after the attribute list changed.
    ///
    /// Needed when a spec is assembled field-by-field (e.g., from config)
    /// instead of through [`TableSpec::new`].
    pub fn reindex(&mut self) {
        self.attr_index = self
            .attr_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
    }

    #[must_use]
    pub fn with_pk(mut self, pk_attr_names: &[&str]) -> Self {
        self.pk_attr_names = pk_attr_names.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_retrieval(mut self, retrieval_attr_names: &[&str]) -> Self {
        self.retrieval_attr_names = retrieval_attr_names
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        self
    }

    #[must_use]
    pub fn with_extras(mut self, extra_attr_names: &[&str]) -> Self {
        self.extra_attr_names = extra_attr_names.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_pk_sequence(mut self, sequence_name: &str) -> Self {
        self.pk_sequence_name = Some(sequence_name.to_string());
        self
    }

    #[must_use]
    pub fn with_generated_pk(mut self) -> Self {
        self.pk_is_generated = true;
        self
    }

    #[must_use]
    pub fn with_clobs(mut self, clob_attr_names: &[&str]) -> Self {
        self.clob_attr_names = clob_attr_names.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_blobs(mut self, blob_attr_names: &[&str]) -> Self {
        self.blob_attr_names = blob_attr_names.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_update_table(mut self, update_table_name: &str) -> Self {
        self.update_table_name = Some(update_table_name.to_string());
        self
    }

    /// Get the position of a persisted attribute.
    #[must_use]
    pub fn attr_position(&self, attr_name: &str) -> Option<usize> {
        if let Some(&idx) = self.attr_index.get(attr_name) {
            return Some(idx);
        }
        // Fall back to linear search
        self.attr_names.iter().position(|a| a == attr_name)
    }

    /// The table DML statements should target.
    #[must_use]
    pub fn dml_table_name(&self) -> &str {
        self.update_table_name.as_deref().unwrap_or(&self.table_name)
    }

    /// A stored-procedure name qualified with `update_package_name`.
    #[must_use]
    pub fn qualified_procedure(&self, procedure: &str) -> String {
        match &self.update_package_name {
            Some(package) => format!("{package}.{procedure}"),
            None => procedure.to_string(),
        }
    }
}

/// One row image over a shared [`TableSpec`].
///
/// Records are value-like: cloning one yields an independent image, which is
/// what change tracking relies on for pre-image capture.
#[derive(Debug, Clone)]
pub struct Record {
    spec: Arc<TableSpec>,
    values: Vec<SqlValue>,
    extras: HashMap<String, SqlValue>,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.spec, &other.spec)
            && self.values == other.values
            && self.extras == other.extras
    }
}

impl Record {
    /// A defaulted record with every persisted attribute set to NULL.
    #[must_use]
    pub fn empty(spec: Arc<TableSpec>) -> Self {
        let values = vec![SqlValue::Null; spec.attr_names.len()];
        Record {
            spec,
            values,
            extras: HashMap::new(),
        }
    }

    /// The positional constructor: one value per persisted attribute.
    ///
    /// # Errors
    /// Returns `DataAccessError::Other` if the value count does not match
    /// `attr_names`.
    pub fn from_values(spec: Arc<TableSpec>, values: Vec<SqlValue>) -> Result<Self> {
        if values.len() != spec.attr_names.len() {
            return Err(DataAccessError::Other(format!(
                "{}: expected {} values, got {}",
                spec.table_name,
                spec.attr_names.len(),
                values.len()
            )));
        }
        Ok(Record {
            spec,
            values,
            extras: HashMap::new(),
        })
    }

    #[must_use]
    pub fn spec(&self) -> &Arc<TableSpec> {
        &self.spec
    }

    /// Get an attribute by name, persisted or transient.
    #[must_use]
    pub fn get(&self, attr_name: &str) -> Option<&SqlValue> {
        if let Some(idx) = self.spec.attr_position(attr_name) {
            return self.values.get(idx);
        }
        self.extras.get(attr_name)
    }

    /// Get a persisted attribute by position.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Set an attribute by name.
    ///
    /// Persisted attributes land in the positional image; names listed in
    /// `extra_attr_names` land in the transient map.
    ///
    /// # Errors
    /// Returns `DataAccessError::Other` for names the spec does not declare.
    pub fn set(&mut self, attr_name: &str, value: SqlValue) -> Result<()> {
        if let Some(idx) = self.spec.attr_position(attr_name) {
            self.values[idx] = value;
            return Ok(());
        }
        if self.spec.extra_attr_names.iter().any(|a| a == attr_name) {
            self.extras.insert(attr_name.to_string(), value);
            return Ok(());
        }
        Err(DataAccessError::Other(format!(
            "{}: unknown attribute {attr_name}",
            self.spec.table_name
        )))
    }

    /// The persisted values in `attr_names` order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Pairs of `(attr_name, value)` for every persisted attribute.
    #[must_use]
    pub fn persisted_pairs(&self) -> Vec<(String, SqlValue)> {
        self.spec
            .attr_names
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    /// Pairs of `(pk_attr_name, value)` for the primary key.
    #[must_use]
    pub fn pk_pairs(&self) -> Vec<(String, SqlValue)> {
        self.spec
            .pk_attr_names
            .iter()
            .filter_map(|name| self.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }
}
