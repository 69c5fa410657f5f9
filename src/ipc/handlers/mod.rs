pub mod core;
pub mod import;
pub mod migrate;
pub mod records;
