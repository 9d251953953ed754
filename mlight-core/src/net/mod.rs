//! Networking: transport sessions and service discovery.

pub mod discovery;
pub mod session;

pub use discovery::{Advertiser, Beacon, DISCOVERY_PORT, SERVICE_INSTRUCTION, SERVICE_RESULT};
pub use session::{ConnectionInfo, Expectation, Session};
