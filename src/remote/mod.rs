//! Talking to controllers over the network
//!
//! Discovery finds them via mDNS. Sessions carry authenticated HTTP
//! requests to one of them.

pub mod discovery;
pub mod session;

pub use discovery::Browser;
pub use session::{AuthenticatedClient, Credentials};
