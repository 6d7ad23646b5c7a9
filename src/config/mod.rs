pub mod pipeline_config;
pub mod storage_config;

pub use pipeline_config::*;
pub use storage_config::*;
