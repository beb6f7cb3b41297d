//! Builders for assembling configurations in tests and local tooling.

pub mod config;

pub use config::ConfigBuilder;
