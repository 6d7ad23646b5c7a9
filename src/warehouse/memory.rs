use async_trait::async_trait;
use polars::prelude::*;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

use super::WarehouseGateway;
use crate::error::{PipelineError, PipelineResult};
use crate::models::TableRef;
use crate::processor::frame::empty_frame;
use crate::processor::ColumnSpec;

/// Warehouse kept in process memory as one frame per table.
#[derive(Default)]
pub struct InMemoryWarehouse {
    tables: Mutex<HashMap<TableRef, DataFrame>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> PipelineResult<MutexGuard<'_, HashMap<TableRef, DataFrame>>> {
        self.tables
            .lock()
            .map_err(|_| PipelineError::Warehouse("warehouse lock poisoned".to_string()))
    }

    /// Snapshot of a table's contents.
    pub fn table(&self, table: &TableRef) -> Option<DataFrame> {
        self.tables.lock().ok()?.get(table).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .lock()
            .map(|tables| tables.keys().map(|t| t.to_string()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn missing(table: &TableRef) -> PipelineError {
    PipelineError::Warehouse(format!("table {} not found", table))
}

/// Non-null distinct values of a column, kept as typed values.
fn distinct_values(column: &Column) -> PipelineResult<Vec<AnyValue<'_>>> {
    let mut values: Vec<AnyValue<'_>> = Vec::new();
    for i in 0..column.len() {
        let value = column.get(i)?;
        if !value.is_null() && !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(values)
}

#[async_trait]
impl WarehouseGateway for InMemoryWarehouse {
    async fn ensure_table(&self, table: &TableRef, columns: &[ColumnSpec]) -> PipelineResult<()> {
        let mut tables = self.tables()?;
        if !tables.contains_key(table) {
            tables.insert(table.clone(), empty_frame(columns)?);
        }
        Ok(())
    }

    async fn create_temp_table(&self, raw: &TableRef, temp: &TableRef) -> PipelineResult<()> {
        let mut tables = self.tables()?;
        let schema_only = tables.get(raw).ok_or_else(|| missing(raw))?.clear();
        if tables.contains_key(temp) {
            return Err(PipelineError::Warehouse(format!("table {} already exists", temp)));
        }
        tables.insert(temp.clone(), schema_only);
        Ok(())
    }

    async fn load(&self, table: &TableRef, frame: DataFrame) -> PipelineResult<usize> {
        let mut tables = self.tables()?;
        let existing = tables.get_mut(table).ok_or_else(|| missing(table))?;
        let rows = frame.height();
        let frame = frame.select(existing.get_column_names_owned())?;
        existing.vstack_mut(&frame)?;
        info!("Loaded {} rows into {}", rows, table);
        Ok(rows)
    }

    async fn delete_matching(
        &self,
        raw: &TableRef,
        temp: &TableRef,
        key_columns: &[String],
    ) -> PipelineResult<()> {
        if key_columns.is_empty() {
            return Err(PipelineError::Config(format!(
                "refusing to delete from {} without key columns",
                raw
            )));
        }
        let mut tables = self.tables()?;
        let staged = tables.get(temp).ok_or_else(|| missing(temp))?;
        let current = tables.get(raw).ok_or_else(|| missing(raw))?;
        let keys = key_columns
            .iter()
            .map(|key| current.column(key))
            .collect::<PolarsResult<Vec<_>>>()?;
        // Staged keys are cast to the raw column's dtype so values compare by type.
        let staged_keys = key_columns
            .iter()
            .zip(&keys)
            .map(|(key, column)| staged.column(key)?.cast(column.dtype()))
            .collect::<PolarsResult<Vec<_>>>()?;
        let wanted = staged_keys
            .iter()
            .map(distinct_values)
            .collect::<PipelineResult<Vec<_>>>()?;

        let mut keep = Vec::with_capacity(current.height());
        for row in 0..current.height() {
            let mut matches = true;
            for (column, values) in keys.iter().zip(&wanted) {
                let value = column.get(row)?;
                if value.is_null() || !values.contains(&value) {
                    matches = false;
                    break;
                }
            }
            keep.push(!matches);
        }

        let removed = keep.iter().filter(|k| !**k).count();
        let mask = BooleanChunked::from_slice("keep".into(), &keep);
        let filtered = current.filter(&mask)?;
        tables.insert(raw.clone(), filtered);
        info!("Deleted {} rows from {} matching {}", removed, raw, temp);
        Ok(())
    }

    async fn get_columns(&self, table: &TableRef) -> PipelineResult<Vec<String>> {
        let tables = self.tables()?;
        let frame = tables.get(table).ok_or_else(|| missing(table))?;
        Ok(frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect())
    }

    async fn insert_select(
        &self,
        temp: &TableRef,
        raw: &TableRef,
        columns: &[String],
    ) -> PipelineResult<()> {
        let mut tables = self.tables()?;
        let staged = tables
            .get(temp)
            .ok_or_else(|| missing(temp))?
            .select(columns.iter().cloned())?;
        let target = tables.get_mut(raw).ok_or_else(|| missing(raw))?;
        let reordered = staged.select(target.get_column_names_owned())?;
        target.vstack_mut(&reordered)?;
        info!("Inserted {} rows from {} into {}", staged.height(), temp, raw);
        Ok(())
    }

    async fn drop_table(&self, table: &TableRef) -> PipelineResult<()> {
        self.tables()?.remove(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ColumnKind;

    const COLUMNS: &[ColumnSpec] = &[
        ColumnSpec { name: "station_code", kind: ColumnKind::String },
        ColumnSpec { name: "day", kind: ColumnKind::String },
        ColumnSpec { name: "audience", kind: ColumnKind::Int },
    ];

    fn frame(stations: &[&str], days: &[&str], audience: &[i64]) -> DataFrame {
        DataFrame::new(vec![
            Column::new("station_code".into(), stations),
            Column::new("day".into(), days),
            Column::new("audience".into(), audience),
        ])
        .unwrap()
    }

    fn raw() -> TableRef {
        TableRef::new("p", "d", "raw")
    }

    fn temp() -> TableRef {
        TableRef::new("p", "d", "tmp")
    }

    async fn seeded() -> InMemoryWarehouse {
        let warehouse = InMemoryWarehouse::new();
        warehouse.ensure_table(&raw(), COLUMNS).await.unwrap();
        warehouse
            .load(&raw(), frame(&["1", "1", "2"], &["a", "b", "a"], &[10, 20, 30]))
            .await
            .unwrap();
        warehouse
    }

    #[tokio::test]
    async fn test_delete_requires_all_key_columns() {
        let warehouse = seeded().await;
        warehouse.create_temp_table(&raw(), &temp()).await.unwrap();
        warehouse.load(&temp(), frame(&["1"], &["a"], &[99])).await.unwrap();

        let keys = vec!["station_code".to_string(), "day".to_string()];
        warehouse.delete_matching(&raw(), &temp(), &keys).await.unwrap();

        let remaining = warehouse.table(&raw()).unwrap();
        assert_eq!(remaining.height(), 2);
    }

    #[tokio::test]
    async fn test_delete_then_insert_replaces_rows() {
        let warehouse = seeded().await;
        warehouse.create_temp_table(&raw(), &temp()).await.unwrap();
        warehouse.load(&temp(), frame(&["2"], &["a"], &[31])).await.unwrap();

        let keys = vec!["station_code".to_string(), "day".to_string()];
        warehouse.delete_matching(&raw(), &temp(), &keys).await.unwrap();
        let columns = warehouse.get_columns(&temp()).await.unwrap();
        assert_eq!(columns, vec!["station_code", "day", "audience"]);
        warehouse.insert_select(&temp(), &raw(), &columns).await.unwrap();
        warehouse.drop_table(&temp()).await.unwrap();

        let table = warehouse.table(&raw()).unwrap();
        assert_eq!(table.height(), 3);
        let audience: Vec<Option<i64>> = table.column("audience").unwrap().i64().unwrap().into_iter().collect();
        assert!(audience.contains(&Some(31)));
        assert!(!audience.contains(&Some(30)));
        assert_eq!(warehouse.table_names(), vec!["p.d.raw"]);
    }

    #[tokio::test]
    async fn test_delete_compares_keys_by_value_not_text() {
        let warehouse = InMemoryWarehouse::new();
        let current = DataFrame::new(vec![
            Column::new("spot".into(), &[1.0f64, 2.0]),
            Column::new("audience".into(), &[10i64, 20]),
        ])
        .unwrap();
        let staged = DataFrame::new(vec![
            Column::new("spot".into(), &[1i64]),
            Column::new("audience".into(), &[11i64]),
        ])
        .unwrap();
        {
            let mut tables = warehouse.tables.lock().unwrap();
            tables.insert(raw(), current);
            tables.insert(temp(), staged);
        }

        warehouse
            .delete_matching(&raw(), &temp(), &["spot".to_string()])
            .await
            .unwrap();

        let remaining = warehouse.table(&raw()).unwrap();
        let spots: Vec<Option<f64>> = remaining.column("spot").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(spots, vec![Some(2.0)]);
    }

    #[tokio::test]
    async fn test_null_keys_never_match() {
        let warehouse = InMemoryWarehouse::new();
        let current = DataFrame::new(vec![
            Column::new("station_code".into(), &[None, Some("1")]),
        ])
        .unwrap();
        let staged = DataFrame::new(vec![
            Column::new("station_code".into(), &[None::<&str>]),
        ])
        .unwrap();
        {
            let mut tables = warehouse.tables.lock().unwrap();
            tables.insert(raw(), current);
            tables.insert(temp(), staged);
        }

        warehouse
            .delete_matching(&raw(), &temp(), &["station_code".to_string()])
            .await
            .unwrap();
        assert_eq!(warehouse.table(&raw()).unwrap().height(), 2);
    }

    #[tokio::test]
    async fn test_temp_table_needs_raw() {
        let warehouse = InMemoryWarehouse::new();
        let err = warehouse.create_temp_table(&raw(), &temp()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Warehouse(_)));
    }

    #[tokio::test]
    async fn test_ensure_table_keeps_existing_rows() {
        let warehouse = seeded().await;
        warehouse.ensure_table(&raw(), COLUMNS).await.unwrap();
        assert_eq!(warehouse.table(&raw()).unwrap().height(), 3);
    }
}
