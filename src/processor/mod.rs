pub mod coercion;
pub mod frame;
pub mod normalizer;
pub mod schema;

pub use coercion::Cell;
pub use normalizer::{normalize, NormalizedTable};
pub use schema::{columns_for, ColumnKind, ColumnSpec};
