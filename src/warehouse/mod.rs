//! Table operations behind the staged delete-then-insert merge.

pub mod bigquery;
pub mod memory;
pub mod sql;

use async_trait::async_trait;
use polars::prelude::DataFrame;

use crate::error::PipelineResult;
use crate::models::TableRef;
use crate::processor::ColumnSpec;

pub use bigquery::BigQueryGateway;
pub use memory::InMemoryWarehouse;

#[async_trait]
pub trait WarehouseGateway: Send + Sync {
    /// Creates `table` with `columns` unless it already exists.
    async fn ensure_table(&self, table: &TableRef, columns: &[ColumnSpec]) -> PipelineResult<()>;

    /// Creates `temp` with the schema of `raw`, expiring after seven days.
    async fn create_temp_table(&self, raw: &TableRef, temp: &TableRef) -> PipelineResult<()>;

    /// Appends `frame` to `table`, returning once the load has finished.
    async fn load(&self, table: &TableRef, frame: DataFrame) -> PipelineResult<usize>;

    /// Deletes rows of `raw` whose every key column value occurs in the same column of `temp`.
    async fn delete_matching(
        &self,
        raw: &TableRef,
        temp: &TableRef,
        key_columns: &[String],
    ) -> PipelineResult<()>;

    /// Column names of `table` in position order.
    async fn get_columns(&self, table: &TableRef) -> PipelineResult<Vec<String>>;

    async fn insert_select(
        &self,
        temp: &TableRef,
        raw: &TableRef,
        columns: &[String],
    ) -> PipelineResult<()>;

    /// Drops `table` if it exists.
    async fn drop_table(&self, table: &TableRef) -> PipelineResult<()>;
}
