//! Library exports for authsync, shared between the binary and tests.

pub mod backend;
pub mod config;
pub mod flows;
pub mod models;
pub mod session;
pub mod startup;
pub mod state;
pub mod storage;
pub mod utils;
