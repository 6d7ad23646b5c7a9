use chrono::NaiveDate;
use polars::prelude::*;

use super::coercion::Cell;
use super::schema::{ColumnKind, ColumnSpec};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Builds one typed column from coerced cells. Cells of another kind read as the kind's default.
pub fn build_column<'a>(
    spec: &ColumnSpec,
    cells: impl Iterator<Item = &'a Cell>,
) -> PolarsResult<Column> {
    let name: PlSmallStr = spec.name.into();
    let series = match spec.kind {
        ColumnKind::String => {
            let values: Vec<Option<String>> = cells
                .map(|cell| match cell {
                    Cell::Str(s) => s.clone(),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
        }
        ColumnKind::Int => {
            let values: Vec<i64> = cells
                .map(|cell| match cell {
                    Cell::Int(i) => *i,
                    _ => 0,
                })
                .collect();
            Series::new(name, values)
        }
        ColumnKind::Bool => {
            let values: Vec<bool> = cells.map(|cell| matches!(cell, Cell::Bool(true))).collect();
            Series::new(name, values)
        }
        ColumnKind::Timestamp => {
            let values: Vec<Option<i64>> = cells
                .map(|cell| match cell {
                    Cell::Timestamp(ts) => ts.map(|ts| ts.and_utc().timestamp_millis()),
                    _ => None,
                })
                .collect();
            Series::new(name, values)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
        }
        ColumnKind::Date => {
            let epoch = epoch();
            let values: Vec<Option<i32>> = cells
                .map(|cell| match cell {
                    Cell::Date(date) => date.map(|d| (d - epoch).num_days() as i32),
                    _ => None,
                })
                .collect();
            Series::new(name, values).cast(&DataType::Date)?
        }
        ColumnKind::Opaque => {
            let values: Vec<String> = cells
                .map(|cell| match cell {
                    Cell::Opaque(s) => s.clone(),
                    _ => "[]".to_string(),
                })
                .collect();
            Series::new(name, values)
        }
    };
    Ok(series.into())
}

/// Zero-row frame carrying the dtypes of `columns`.
pub fn empty_frame(columns: &[ColumnSpec]) -> PolarsResult<DataFrame> {
    let built = columns
        .iter()
        .map(|spec| build_column(spec, std::iter::empty()))
        .collect::<PolarsResult<Vec<_>>>()?;
    DataFrame::new(built)
}

/// Newline-delimited JSON rendering of a frame, the warehouse load format.
pub fn to_ndjson(frame: &mut DataFrame) -> PolarsResult<Vec<u8>> {
    let mut buffer = Vec::new();
    JsonWriter::new(&mut buffer)
        .with_json_format(JsonFormat::JsonLines)
        .finish(frame)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_dtypes() {
        let columns = [
            ColumnSpec { name: "a", kind: ColumnKind::String },
            ColumnSpec { name: "b", kind: ColumnKind::Int },
            ColumnSpec { name: "c", kind: ColumnKind::Timestamp },
            ColumnSpec { name: "d", kind: ColumnKind::Date },
        ];
        let df = empty_frame(&columns).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 4);
        assert_eq!(df.column("b").unwrap().dtype(), &DataType::Int64);
        assert_eq!(
            df.column("c").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, None)
        );
        assert_eq!(df.column("d").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn test_ndjson_one_line_per_row() {
        let spec = ColumnSpec { name: "station_code", kind: ColumnKind::String };
        let cells = vec![Cell::Str(Some("101".into())), Cell::Str(None)];
        let column = build_column(&spec, cells.iter()).unwrap();
        let mut df = DataFrame::new(vec![column]).unwrap();
        let text = String::from_utf8(to_ndjson(&mut df).unwrap()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"101\""));
    }
}
