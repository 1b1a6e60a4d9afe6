//! Shared types for the linnet chat client: wire frames, the RPC response
//! envelope, REST data models and error types.

pub mod envelope;
pub mod error;
pub mod models;
pub mod protocol;

pub use envelope::*;
pub use error::*;
pub use models::*;
pub use protocol::*;
