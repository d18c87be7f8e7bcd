//! Storage implementations for stepwise.

pub mod local;
pub mod table;

pub use local::LocalStorage;
pub use table::{Record, Table};
