// PawCare client - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod navigation;
pub mod notify;
pub mod request;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{ClientError, FailureKind};
pub use http_client::{ApiClient, ClientSettings};
pub use request::{ApiRequest, ApiResponse, MultipartPart, RequestBody};
