//! Bundled [`Parser`](crate::core::Parser) implementations.

pub mod import_scanner;

pub use import_scanner::ImportScanner;
