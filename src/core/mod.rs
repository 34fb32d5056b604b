pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod store;
pub mod terminal;
