pub mod parser;
pub mod result_map;
