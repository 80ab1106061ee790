// src/config/mod.rs

//! Configuration loading and validation for dagbatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like DAG correctness (`validate.rs`).
//! - Build a runnable DAG of command tasks (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{ConfigFile, ConfigSection, RawConfigFile, TaskConfig};
pub use validate::{parse_duration, validate_config};
