pub mod barb_client;
pub mod http;
pub mod lookups;
pub mod reports;

pub use barb_client::{BarbClient, Credentials, Params};
pub use lookups::{filter_by_name, find_unique};
pub use reports::report_params;
