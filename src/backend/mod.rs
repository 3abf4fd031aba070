pub mod base;
pub mod client;

pub use base::{BackendError, ProfileFetcher};
pub use client::{BackendClient, LoginRequest, RegisterRequest};
