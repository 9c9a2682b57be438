//! Execution bridge between external callers and a single-threaded host.
//!
//! The host application only allows state changes from its own execution thread. Callers on
//! other threads (or, through the HTTP front, other processes) [`ExecutionBridge::submit`] named
//! operations; the host thread drains the queue with [`ExecutionBridge::drain_and_execute`]
//! whenever it is signaled, and callers poll [`ExecutionBridge::status`] for the outcome.
//!
//! - [`registry`]: name to implementation mapping for host-side operations
//! - [`bridge`]: the queue and result store guarded by one mutex
//! - [`host`]: host wake-up signal and the dedicated host thread
//! - [`http`]: axum front exposing `/events/trigger` and `/events/status/{event_id}`
//! - [`diagnostics`]: built-in operations for smoke tests

pub mod bridge;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod http;
pub mod registry;

pub use bridge::{DEFAULT_RETENTION, ExecutionBridge};
pub use diagnostics::register_diagnostics;
pub use error::BridgeError;
pub use host::{ChannelSignal, HostChannel, HostSignal, HostThread, NoopSignal};
pub use http::{BridgeHttpServer, RunningBridgeHttpServer, bridge_router, resolve_bind_address};
pub use registry::{HostOperation, OperationRegistry};
