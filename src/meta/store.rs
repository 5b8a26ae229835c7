//! Persistence of index configuration in the metadata shadow table.

use crate::error::{DiskVecError, Result};
use crate::host::{StorageEngine, TableRef};
use crate::metric::MetricKind;

use super::columns::ColumnDef;
use super::IndexOptions;

const KEY_DIMENSION: &str = "dimension";
const KEY_METRIC: &str = "metric";
const KEY_MAX_DEGREE: &str = "max_degree";
const KEY_BUILD_SEARCH_LIST: &str = "build_search_list";
const KEY_SEARCH_LIST: &str = "search_list";
const KEY_PRUNE_ALPHA: &str = "prune_alpha";
const KEY_BLOCK_SIZE: &str = "block_size";
const KEY_ENTRY_SEED: &str = "entry_seed";
const KEY_COLUMNS: &str = "columns";

/// Writes the full configuration into the metadata table.
///
/// # Errors
///
/// Propagates host failures.
pub fn save_metadata<E: StorageEngine>(
    engine: &mut E,
    meta_table: &TableRef,
    options: &IndexOptions,
    columns: &[ColumnDef],
) -> Result<()> {
    engine.put_kv(meta_table, KEY_DIMENSION, &options.dimension.to_string())?;
    engine.put_kv(meta_table, KEY_METRIC, options.metric.as_str())?;
    engine.put_kv(meta_table, KEY_MAX_DEGREE, &options.max_degree.to_string())?;
    engine.put_kv(
        meta_table,
        KEY_BUILD_SEARCH_LIST,
        &options.build_search_list.to_string(),
    )?;
    engine.put_kv(
        meta_table,
        KEY_SEARCH_LIST,
        &options.search_list.to_string(),
    )?;
    engine.put_kv(
        meta_table,
        KEY_PRUNE_ALPHA,
        &format!("{}", options.prune_alpha),
    )?;
    engine.put_kv(meta_table, KEY_BLOCK_SIZE, &options.block_size.to_string())?;
    engine.put_kv(meta_table, KEY_ENTRY_SEED, &options.entry_seed.to_string())?;
    let catalog = serde_json::to_string(columns)
        .map_err(|e| DiskVecError::Corrupt(format!("column catalog: {e}")))?;
    engine.put_kv(meta_table, KEY_COLUMNS, &catalog)?;
    Ok(())
}

fn require<E: StorageEngine>(engine: &E, table: &TableRef, key: &str) -> Result<String> {
    engine
        .get_kv(table, key)?
        .ok_or_else(|| DiskVecError::Corrupt(format!("metadata key {key} missing")))
}

fn parse_key<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| DiskVecError::Corrupt(format!("metadata key {key} has bad value {raw:?}")))
}

/// Loads and sanity-checks the configuration from the metadata table.
///
/// Out-of-range or unparsable values fail the open with
/// [`DiskVecError::Corrupt`]; range validation itself reuses
/// [`IndexOptions::layout`].
///
/// # Errors
///
/// `Corrupt` for missing/stale metadata, host errors otherwise.
pub fn load_metadata<E: StorageEngine>(
    engine: &E,
    meta_table: &TableRef,
) -> Result<(IndexOptions, Vec<ColumnDef>)> {
    let metric_name = require(engine, meta_table, KEY_METRIC)?;
    let metric = MetricKind::parse(&metric_name).ok_or_else(|| {
        DiskVecError::Corrupt(format!("metadata metric {metric_name:?} is unknown"))
    })?;

    let options = IndexOptions {
        dimension: parse_key(KEY_DIMENSION, &require(engine, meta_table, KEY_DIMENSION)?)?,
        metric,
        max_degree: parse_key(KEY_MAX_DEGREE, &require(engine, meta_table, KEY_MAX_DEGREE)?)?,
        build_search_list: parse_key(
            KEY_BUILD_SEARCH_LIST,
            &require(engine, meta_table, KEY_BUILD_SEARCH_LIST)?,
        )?,
        search_list: parse_key(
            KEY_SEARCH_LIST,
            &require(engine, meta_table, KEY_SEARCH_LIST)?,
        )?,
        prune_alpha: parse_key(
            KEY_PRUNE_ALPHA,
            &require(engine, meta_table, KEY_PRUNE_ALPHA)?,
        )?,
        block_size: parse_key(KEY_BLOCK_SIZE, &require(engine, meta_table, KEY_BLOCK_SIZE)?)?,
        entry_seed: parse_key(KEY_ENTRY_SEED, &require(engine, meta_table, KEY_ENTRY_SEED)?)?,
    };

    options
        .layout()
        .map_err(|e| DiskVecError::Corrupt(format!("metadata out of range: {e}")))?;

    let catalog = require(engine, meta_table, KEY_COLUMNS)?;
    let columns: Vec<ColumnDef> = serde_json::from_str(&catalog)
        .map_err(|e| DiskVecError::Corrupt(format!("column catalog: {e}")))?;

    Ok((options, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mem::MemEngine;
    use crate::meta::columns::ColumnType;

    fn meta_table(engine: &mut MemEngine) -> TableRef {
        engine
            .execute_ddl("CREATE TABLE \"main\".\"t_meta\" (\"k\" TEXT PRIMARY KEY, \"v\" TEXT)")
            .unwrap();
        TableRef::new("main", "t_meta")
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut engine = MemEngine::new();
        let table = meta_table(&mut engine);
        let mut options = IndexOptions::new(24);
        options.metric = MetricKind::Cosine;
        options.prune_alpha = 1.25;
        let columns = vec![ColumnDef {
            name: "label".into(),
            column_type: ColumnType::Text,
        }];

        save_metadata(&mut engine, &table, &options, &columns).unwrap();
        let (loaded, loaded_cols) = load_metadata(&engine, &table).unwrap();
        assert_eq!(loaded, options);
        assert_eq!(loaded_cols, columns);
    }

    #[test]
    fn test_missing_key_is_corrupt() {
        let mut engine = MemEngine::new();
        let table = meta_table(&mut engine);
        let err = load_metadata(&engine, &table).unwrap_err();
        assert!(matches!(err, DiskVecError::Corrupt(_)));
    }

    #[test]
    fn test_unknown_metric_is_corrupt() {
        let mut engine = MemEngine::new();
        let table = meta_table(&mut engine);
        save_metadata(&mut engine, &table, &IndexOptions::new(4), &[]).unwrap();
        engine.put_kv(&table, "metric", "chebyshev").unwrap();
        let err = load_metadata(&engine, &table).unwrap_err();
        assert!(matches!(err, DiskVecError::Corrupt(_)));
    }

    #[test]
    fn test_out_of_range_dimension_is_corrupt() {
        let mut engine = MemEngine::new();
        let table = meta_table(&mut engine);
        save_metadata(&mut engine, &table, &IndexOptions::new(4), &[]).unwrap();
        engine.put_kv(&table, "dimension", "20000").unwrap();
        let err = load_metadata(&engine, &table).unwrap_err();
        assert!(matches!(err, DiskVecError::Corrupt(_)));
    }

    #[test]
    fn test_garbage_value_is_corrupt() {
        let mut engine = MemEngine::new();
        let table = meta_table(&mut engine);
        save_metadata(&mut engine, &table, &IndexOptions::new(4), &[]).unwrap();
        engine.put_kv(&table, "max_degree", "not-a-number").unwrap();
        let err = load_metadata(&engine, &table).unwrap_err();
        assert!(matches!(err, DiskVecError::Corrupt(_)));
    }
}
