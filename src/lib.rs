//! Library crate for crystal-owl, exposing modules for the binary and tests.

pub mod audio;
pub mod config;
pub mod context;
pub mod error;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
