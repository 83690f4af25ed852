//! Declarative table and cache definitions.
//!
//! Definitions load from JSON. Every list-valued field also accepts a
//! whitespace-delimited string (`"id name salary"` and
//! `["id","name","salary"]` are interchangeable); loaded configs convert
//! into the runtime [`TableSpec`]/[`PathSpec`] descriptors.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::cache::{PathKind, PathSpec, SubCache};
use crate::dialect::Dialect;
use crate::error::{DataAccessError, Result};
use crate::records::{TableSpec, split_names};

fn name_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Text(String),
        List(Vec<String>),
    }
    match Repr::deserialize(deserializer)? {
        Repr::Text(text) => Ok(split_names(&text)),
        Repr::List(names) => Ok(names),
    }
}

/// One data-set / cache-row definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TableConfig {
    pub table_name: String,
    #[serde(deserialize_with = "name_list")]
    pub attr_names: Vec<String>,
    #[serde(deserialize_with = "name_list")]
    pub extra_attr_names: Vec<String>,
    #[serde(deserialize_with = "name_list")]
    pub pk_attr_names: Vec<String>,
    #[serde(deserialize_with = "name_list")]
    pub retrieval_attr_names: Vec<String>,
    pub update_table_name: Option<String>,
    pub update_package_name: Option<String>,
    pub insert_procedure_name: Option<String>,
    pub update_procedure_name: Option<String>,
    pub delete_procedure_name: Option<String>,
    pub pk_sequence_name: Option<String>,
    pub pk_is_generated: bool,
    #[serde(deserialize_with = "name_list")]
    pub clob_attr_names: Vec<String>,
    #[serde(deserialize_with = "name_list")]
    pub blob_attr_names: Vec<String>,
}

impl TableConfig {
    /// Parse one definition from JSON.
    ///
    /// # Errors
    /// `ConfigError` on malformed JSON or a missing `table_name`.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TableConfig = serde_json::from_str(json)
            .map_err(|err| DataAccessError::ConfigError(err.to_string()))?;
        if config.table_name.is_empty() {
            return Err(DataAccessError::ConfigError(
                "table_name is required".to_string(),
            ));
        }
        Ok(config)
    }

    /// Convert into the runtime descriptor.
    #[must_use]
    pub fn into_spec(self) -> Arc<TableSpec> {
        let mut spec = TableSpec::new(&self.table_name, &[]);
        spec.attr_names = self.attr_names;
        spec.extra_attr_names = self.extra_attr_names;
        spec.pk_attr_names = self.pk_attr_names;
        spec.retrieval_attr_names = self.retrieval_attr_names;
        spec.update_table_name = self.update_table_name;
        spec.update_package_name = self.update_package_name;
        spec.insert_procedure_name = self.insert_procedure_name;
        spec.update_procedure_name = self.update_procedure_name;
        spec.delete_procedure_name = self.delete_procedure_name;
        spec.pk_sequence_name = self.pk_sequence_name;
        spec.pk_is_generated = self.pk_is_generated;
        spec.clob_attr_names = self.clob_attr_names;
        spec.blob_attr_names = self.blob_attr_names;
        spec.reindex();
        Arc::new(spec)
    }
}

/// One path definition within a sub-cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PathConfig {
    pub name: String,
    pub single_row: bool,
    #[serde(deserialize_with = "name_list")]
    pub retrieval_attr_names: Vec<String>,
    #[serde(deserialize_with = "name_list")]
    pub string_retrieval_attr_names: Vec<String>,
    pub load_via_path_name: Option<String>,
    pub ignore_row_not_cached: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        PathConfig {
            name: String::new(),
            single_row: true,
            retrieval_attr_names: Vec::new(),
            string_retrieval_attr_names: Vec::new(),
            load_via_path_name: None,
            ignore_row_not_cached: false,
        }
    }
}

impl PathConfig {
    /// Convert into the runtime descriptor. Key normalizers are code, not
    /// config; attach them afterwards with
    /// [`PathSpec::with_normalizers`].
    #[must_use]
    pub fn into_spec(self) -> PathSpec {
        PathSpec {
            name: self.name,
            kind: if self.single_row {
                PathKind::SingleRow
            } else {
                PathKind::MultipleRows
            },
            retrieval_attr_names: self.retrieval_attr_names,
            normalizers: Vec::new(),
            string_retrieval_attr_names: self.string_retrieval_attr_names,
            load_via_path_name: self.load_via_path_name,
            ignore_row_not_cached: self.ignore_row_not_cached,
        }
    }
}

/// One sub-cache definition: a table plus its paths.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct SubCacheConfig {
    #[serde(flatten)]
    pub table: TableConfig,
    pub paths: Vec<PathConfig>,
    pub load_all_rows_on_first_load: bool,
}

impl SubCacheConfig {
    /// Parse one definition from JSON.
    ///
    /// # Errors
    /// `ConfigError` on malformed JSON or a missing `table_name`.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SubCacheConfig = serde_json::from_str(json)
            .map_err(|err| DataAccessError::ConfigError(err.to_string()))?;
        if config.table.table_name.is_empty() {
            return Err(DataAccessError::ConfigError(
                "table_name is required".to_string(),
            ));
        }
        Ok(config)
    }

    /// Build the sub-cache this definition describes.
    #[must_use]
    pub fn into_sub_cache(self, dialect: Arc<dyn Dialect>) -> SubCache {
        let spec = self.table.into_spec();
        let mut sub_cache = SubCache::new(spec, dialect);
        if self.load_all_rows_on_first_load {
            sub_cache = sub_cache.load_all_rows_on_first_load();
        }
        for path in self.paths {
            sub_cache = sub_cache.with_path(path.into_spec());
        }
        sub_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_string_and_list_are_interchangeable() {
        let from_string =
            TableConfig::from_json(r#"{"table_name":"Employee","attr_names":"id name salary"}"#)
                .unwrap();
        let from_list = TableConfig::from_json(
            r#"{"table_name":"Employee","attr_names":["id","name","salary"]}"#,
        )
        .unwrap();
        assert_eq!(from_string.attr_names, from_list.attr_names);
        assert_eq!(from_string.attr_names, vec!["id", "name", "salary"]);
    }

    #[test]
    fn missing_table_name_is_rejected() {
        let err = TableConfig::from_json(r#"{"attr_names":"id"}"#).unwrap_err();
        assert!(err.to_string().contains("table_name"));
    }

    #[test]
    fn sub_cache_config_carries_paths() {
        let config = SubCacheConfig::from_json(
            r#"{
                "table_name": "User",
                "attr_names": "id name email",
                "pk_attr_names": "id",
                "load_all_rows_on_first_load": true,
                "paths": [
                    {"name": "by_id", "retrieval_attr_names": "id"},
                    {"name": "by_name", "single_row": false,
                     "retrieval_attr_names": "name",
                     "string_retrieval_attr_names": "name"}
                ]
            }"#,
        )
        .unwrap();
        assert!(config.load_all_rows_on_first_load);
        assert_eq!(config.paths.len(), 2);
        assert!(!config.paths[1].single_row);
        let spec = config.paths[1].clone().into_spec();
        assert_eq!(spec.string_retrieval_attr_names, vec!["name"]);
    }
}
