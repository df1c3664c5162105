//! Token Management
//!
//! Credential lifecycle, acceptance probe and diagnostics store.

mod manager;
mod probe;
mod store;

pub use manager::{
    MockTokenProvider, TokenLifecycleManager, TokenManagerConfig, TokenProvider, TokenState,
    TokenStatus,
};
pub use probe::{CredentialProbe, HttpCredentialProbe, MockCredentialProbe};
pub use store::{
    CredentialSummary, FileSnapshotWriter, MemorySnapshotWriter, NoopSnapshotWriter,
    SnapshotWriter, TokenSnapshot, TokenStore,
};
