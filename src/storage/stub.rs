//! Stub storage for builds without the embedded engine.
//!
//! Compiled when the `duckdb` feature is off. The public interface is
//! preserved; every operation reports that the analytical engine is not
//! part of this build.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use super::{QueryResult, Storage, TableSchema};
use crate::error::DataqlError;

pub struct DuckDbStorage;

fn unavailable() -> anyhow::Error {
    DataqlError::Internal("analytical engine not available in this build".to_string()).into()
}

impl DuckDbStorage {
    pub fn open(_store_path: Option<&Path>) -> Result<Self> {
        Ok(Self)
    }
}

impl Storage for DuckDbStorage {
    fn create_table(&self, _table: &str, _columns: &[String]) -> Result<()> {
        Err(unavailable())
    }

    fn insert_row(&self, _table: &str, _columns: &[String], _values: &[Value]) -> Result<()> {
        Err(unavailable())
    }

    fn query(&self, _sql: &str) -> Result<QueryResult> {
        Err(unavailable())
    }

    fn tables(&self) -> Result<Vec<TableSchema>> {
        Err(unavailable())
    }

    fn close(&self) -> Result<()> {
        Err(unavailable())
    }
}
