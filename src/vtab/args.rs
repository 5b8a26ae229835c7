// Allow missing docs for the generated pest Rule enum
#![allow(missing_docs)]

//! Module-argument parser for the virtual-table bridge.
//!
//! `CREATE VIRTUAL TABLE t USING diskvec(dimension=768, metric=cosine,
//! label TEXT)` hands the bridge one string per comma-separated argument.
//! Each is either a `key=value` parameter or a `name TYPE` scalar-column
//! declaration; the grammar lives in `args.pest`.

use pest::Parser;
use pest_derive::Parser;

use crate::error::{DiskVecError, Result};
use crate::meta::{validate_columns, ColumnDef, ColumnType, IndexOptions};
use crate::metric::MetricKind;

/// The pest parser generated from `args.pest`.
#[derive(Parser)]
#[grammar = "vtab/args.pest"]
struct ArgParser;

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        DiskVecError::Invalid(format!("parameter {key} has invalid value {raw:?}"))
    })
}

/// Parses the full module-argument list into index options plus the
/// declared scalar columns.
///
/// # Errors
///
/// `Invalid` for syntax errors, unknown parameters or types, missing
/// `dimension`, reserved or duplicate column names.
pub fn parse_module_args(args: &[&str]) -> Result<(IndexOptions, Vec<ColumnDef>)> {
    let mut dimension: Option<usize> = None;
    let mut options = IndexOptions::new(0);
    let mut columns: Vec<ColumnDef> = Vec::new();

    for raw in args {
        let mut pairs = ArgParser::parse(Rule::arg, raw)
            .map_err(|e| DiskVecError::Invalid(format!("bad module argument {raw:?}: {e}")))?;
        let arg = pairs.next().expect("grammar yields exactly one arg");
        let item = arg
            .into_inner()
            .find(|p| matches!(p.as_rule(), Rule::param | Rule::column))
            .expect("arg wraps a param or column");

        match item.as_rule() {
            Rule::param => {
                let mut inner = item.into_inner();
                let key = inner.next().expect("param key").as_str().to_owned();
                let value = inner.next().expect("param value").as_str().trim();
                match key.as_str() {
                    "dimension" => dimension = Some(parse_num(&key, value)?),
                    "metric" => {
                        options.metric = MetricKind::parse(value).ok_or_else(|| {
                            DiskVecError::Invalid(format!("unknown metric {value:?}"))
                        })?;
                    }
                    "max_degree" => options.max_degree = parse_num(&key, value)?,
                    "build_search_list" => options.build_search_list = parse_num(&key, value)?,
                    "search_list" => options.search_list = parse_num(&key, value)?,
                    "prune_alpha" => options.prune_alpha = parse_num(&key, value)?,
                    "block_size" => options.block_size = parse_num(&key, value)?,
                    "entry_seed" => options.entry_seed = parse_num(&key, value)?,
                    _ => {
                        return Err(DiskVecError::Invalid(format!("unknown parameter {key:?}")));
                    }
                }
            }
            Rule::column => {
                let mut inner = item.into_inner();
                let name = inner.next().expect("column name").as_str().to_owned();
                let type_name = inner.next().expect("column type").as_str();
                let column_type = ColumnType::parse(type_name).ok_or_else(|| {
                    DiskVecError::Invalid(format!(
                        "unknown column type {type_name:?} for column {name:?}"
                    ))
                })?;
                columns.push(ColumnDef { name, column_type });
            }
            _ => unreachable!("grammar admits only params and columns"),
        }
    }

    let Some(dimension) = dimension else {
        return Err(DiskVecError::Invalid(
            "missing required parameter: dimension".into(),
        ));
    };
    options.dimension = dimension;
    validate_columns(&columns)?;
    options.layout()?;
    Ok((options, columns))
}
