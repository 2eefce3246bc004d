pub mod data_set;
pub mod error;
pub mod month_summary;
pub mod value;
