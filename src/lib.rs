//! Probescript – interpreter and dispatch core for scripted instrument control
//!
//! This crate automates sequences of instrument-control actions by
//! interpreting a small line-oriented script language:
//! - Flat command lines plus nested `loop N ... end` blocks, structured and
//!   fully validated before any side effect occurs
//! - A registry mapping command names to callables, with ordered/typed
//!   argument binding, default filling, and receiver-instance injection
//! - A line-oriented TCP protocol client for heterogeneous remote endpoints,
//!   mixing fire-and-forget sends with blocking structured queries
//! - A single-threaded executor with sequential loop repetition, blocking
//!   waits, and cooperative cancellation polled at node boundaries
//!
//! The graphical editor, script persistence, and the concrete instrument
//! driver functions live outside this crate; drivers plug in through the
//! uniform callable contract of the registry.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Error types and result aliases.
pub mod error;
/// Script execution state machine.
pub mod exec;
/// Command registry, argument binding, and receiver instances.
pub mod registry;
/// TCP protocol client for remote endpoints.
pub mod remote;
/// Script parsing and block structuring.
pub mod script;

// Re-export key types for convenience
pub use error::{Error, ExecError, ParseError, Result};
pub use exec::{CancelToken, Executor, RunReport, RunState};
pub use registry::{ArgSpec, InstanceMap, Registry, RegistryBuilder, Reply, Value, ValueKind};
pub use remote::{Endpoint, EndpointTable, RemoteClient};
pub use script::{Script, ScriptNode, parse, parse_validated};

/// Current version of the probescript core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
