//! Shared wire types for the storefront services
//!
//! - [`response`] - The `{ success, data?, message? }` envelope every endpoint returns
//! - [`identity`] - The caller identity resolved by the upstream session layer

pub mod identity;
pub mod response;

pub use identity::Identity;
pub use response::ApiResponse;
