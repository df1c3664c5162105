//! Gateway Types
//!
//! Data structures for credentials, requests, records and configuration.

mod config;
mod credential;
mod device;
mod envelope;
mod params;
mod records;
mod request;

pub use config::*;
pub use credential::*;
pub use device::*;
pub use envelope::*;
pub use params::*;
pub use records::*;
pub use request::*;

#[cfg(test)]
pub(crate) use credential::test_tokens;
