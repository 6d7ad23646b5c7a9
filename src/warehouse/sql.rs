//! Statement builders for the warehouse stages.

use crate::models::TableRef;
use crate::processor::ColumnSpec;

pub const TEMP_TABLE_EXPIRY_DAYS: u32 = 7;

fn quoted(table: &TableRef) -> String {
    format!("`{}`", table)
}

pub fn create_table_if_missing(table: &TableRef, columns: &[ColumnSpec]) -> String {
    let definitions = columns
        .iter()
        .map(|c| format!("  {} {}", c.name, c.kind.warehouse_type()))
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quoted(table),
        definitions
    )
}

pub fn create_temp_table(raw: &TableRef, temp: &TableRef) -> String {
    format!(
        "CREATE TABLE {}\nLIKE {}\nOPTIONS(\n  expiration_timestamp = TIMESTAMP_ADD(current_timestamp(), INTERVAL {} DAY)\n);",
        quoted(temp),
        quoted(raw),
        TEMP_TABLE_EXPIRY_DAYS
    )
}

/// Rows of `raw` whose value in every key column appears somewhere in that column of `temp`.
pub fn delete_matching(raw: &TableRef, temp: &TableRef, key_columns: &[String]) -> String {
    let conditions = key_columns
        .iter()
        .map(|c| format!("{c} IN (SELECT DISTINCT {c} FROM {})", quoted(temp)))
        .collect::<Vec<_>>()
        .join("\n  AND ");
    format!("DELETE FROM {}\nWHERE {};", quoted(raw), conditions)
}

pub fn get_columns(table: &TableRef) -> String {
    format!(
        "SELECT COLUMN_NAME\nFROM `{}`.{}.INFORMATION_SCHEMA.COLUMNS\nWHERE table_name = '{}'\nORDER BY ORDINAL_POSITION;",
        table.project, table.dataset, table.table
    )
}

pub fn insert_select(temp: &TableRef, raw: &TableRef, columns: &[String]) -> String {
    let list = columns.join(", ");
    format!(
        "INSERT {} ({})\nSELECT {}\nFROM {};",
        quoted(raw),
        list,
        list,
        quoted(temp)
    )
}

pub fn drop_table(table: &TableRef) -> String {
    format!("DROP TABLE IF EXISTS {};", quoted(table))
}
