//! Client core for the linnet chat application.
//!
//! Two cooperating pieces: a [`SessionStore`] holding the authenticated
//! identity and mirroring it to durable storage, and a [`RealtimeClient`]
//! owning the persistent WebSocket with fixed-delay, capped-attempt
//! reconnection. The REST surface lives in [`api::ApiClient`] and route
//! access decisions in [`routes`]. Browser/OS primitives sit behind the
//! [`storage::KeyValueStore`] and [`ws::Transport`] capability traits so the
//! core runs against in-memory fakes in tests.

pub mod api;
pub mod routes;
pub mod session;
pub mod storage;
pub mod ws;

pub use api::ApiClient;
pub use routes::{resolve_navigation, NavDecision, RouteSpec};
pub use session::{Identity, ProfileUpdate, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use ws::{AuthScheme, ConnectionState, ListenerId, RealtimeClient, ReconnectPolicy};
