//! Core Infrastructure
//!
//! HTTP transport and time source shared by the token manager, validator and gateway.

pub mod clock;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, MockHttpTransport,
    ReqwestHttpTransport, DEFAULT_MAX_RESPONSE_SIZE,
};
