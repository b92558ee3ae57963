pub mod offline;
pub mod service;
pub mod simulate;
