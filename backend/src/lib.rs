//! Freakflix backend library
//!
//! Catalogs video files found in users' cloud drive folders and serves the
//! catalog over a small REST API. The binary in `main.rs` wires these modules
//! together; integration tests build the same router directly.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod services;

pub use app::{AppState, build_app};
