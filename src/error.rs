//! Error types for the probescript core.
//!
//! Errors are split into two tiers. Validation-time errors ([`ParseError`])
//! are raised before any command executes and reject the whole script
//! atomically. Run-time errors ([`ExecError`] and its sources) abort the
//! remainder of a run at the failing node; commands already executed are not
//! rolled back. Configuration errors ([`ConfigError`]) are fatal at registry
//! build time and never deferred to script execution.

use std::fmt;
use std::io;
use thiserror::Error;

use crate::registry::value::ValueKind;

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Script structure or reference validation failed.
    #[error("script error: {0}")]
    Parse(#[from] ParseError),

    /// Registry or endpoint configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A run aborted at a failing node.
    #[error("execution error: {0}")]
    Exec(#[from] ExecError),

    /// A remote operation failed outside of a run context.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Result type using the top-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Validation-time errors detected before any command executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A `loop` block was never closed by a matching `end`.
    #[error("line {line}: 'loop' is never closed by a matching 'end'")]
    UnbalancedBlock {
        /// Line of the unclosed `loop` statement.
        line: usize,
    },

    /// An `end` appeared with no open block.
    #[error("line {line}: 'end' without a matching 'loop'")]
    DanglingEnd {
        /// Line of the stray `end`.
        line: usize,
    },

    /// A `loop` count did not parse as a positive integer.
    #[error("line {line}: invalid loop count '{token}'")]
    InvalidLoopCount {
        /// Line of the `loop` statement.
        line: usize,
        /// Text that failed to parse as a positive integer.
        token: String,
    },

    /// A command name is absent from the registry.
    #[error("line {line}: unknown command '{name}'")]
    UnknownCommand {
        /// Line of the offending command call.
        line: usize,
        /// Command name as written in the script.
        name: String,
    },

    /// Fewer argument tokens were supplied than the command requires.
    #[error("line {line}: '{name}' requires {required} arguments, {supplied} supplied")]
    ArgumentCount {
        /// Line of the offending command call.
        line: usize,
        /// Command name as written in the script.
        name: String,
        /// Number of user-required argument specs.
        required: usize,
        /// Number of literal tokens on the line.
        supplied: usize,
    },
}

/// Convenience result alias for parse operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Argument binding errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    /// A literal token could not be converted to the declared value kind.
    #[error("argument '{label}' expects {kind}, got '{token}'")]
    TypeCast {
        /// Display label of the argument spec.
        label: String,
        /// Declared value kind.
        kind: ValueKind,
        /// Offending literal token.
        token: String,
    },

    /// Too few tokens for the command's user-required argument specs.
    #[error("'{name}' requires {required} arguments, {supplied} supplied")]
    ArgumentCount {
        /// Command name.
        name: String,
        /// Number of user-required argument specs.
        required: usize,
        /// Number of literal tokens supplied.
        supplied: usize,
    },
}

/// Registry and endpoint configuration errors, fatal at build time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A bound command's receiver type has no entry in the instance map.
    #[error("no instance registered for receiver type '{type_name}'")]
    MissingInstance {
        /// Fully qualified receiver type name.
        type_name: &'static str,
    },

    /// A remote command referenced an endpoint name absent from the table.
    #[error("unknown remote endpoint '{0}'")]
    UnknownEndpoint(String),

    /// Two commands were registered under the same name.
    #[error("duplicate command name '{0}'")]
    DuplicateCommand(String),

    /// IO error while loading an endpoint configuration file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error while parsing an endpoint configuration file.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Remote protocol errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The TCP connection to the endpoint could not be established.
    #[error("failed to connect to endpoint '{endpoint}': {source}")]
    Connection {
        /// Endpoint name.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// IO failure while writing the request or reading the reply.
    #[error("IO error talking to endpoint '{endpoint}': {source}")]
    Io {
        /// Endpoint name.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The reply did not carry exactly three `|`-separated fields.
    #[error("malformed reply from endpoint '{endpoint}': expected 3 fields, got {fields} in '{raw}'")]
    MalformedReply {
        /// Endpoint name.
        endpoint: String,
        /// Number of fields actually present.
        fields: usize,
        /// Raw reply text.
        raw: String,
    },
}

/// Convenience result alias for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Error surfaced by a command callable.
///
/// Callables report failures through `Result`; the executor catches these and
/// wraps them with the command name, line number and loop path. They are never
/// propagated raw.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The callable itself reported a failure.
    #[error("{0}")]
    Command(String),

    /// A remote-backed callable failed at the protocol level.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl InvokeError {
    /// Build a command failure from any displayable message.
    pub fn command(message: impl Into<String>) -> Self {
        InvokeError::Command(message.into())
    }
}

/// Sequence of enclosing loop iteration indices, outermost first.
///
/// Attached to run-time errors so the operator can locate a failure that
/// occurred inside nested loops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopPath(Vec<usize>);

impl LoopPath {
    /// Empty path (failure at the script root).
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the failure occurred outside any loop.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iteration indices, outermost first.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub(crate) fn enter(&mut self, iteration: usize) {
        self.0.push(iteration);
    }

    pub(crate) fn exit(&mut self) {
        self.0.pop();
    }
}

impl From<Vec<usize>> for LoopPath {
    fn from(indices: Vec<usize>) -> Self {
        LoopPath(indices)
    }
}

/// Run-time error carrying the failing command's script location.
#[derive(Debug)]
pub struct ExecError {
    /// Command name as written in the script.
    pub command: String,
    /// 1-based line number in the original script text.
    pub line: usize,
    /// Enclosing loop iteration indices at the time of failure.
    pub loop_path: LoopPath,
    /// Underlying failure.
    pub kind: ExecErrorKind,
}

impl ExecError {
    pub(crate) fn new(
        command: impl Into<String>,
        line: usize,
        loop_path: LoopPath,
        kind: ExecErrorKind,
    ) -> Self {
        Self {
            command: command.into(),
            line,
            loop_path,
            kind,
        }
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command '{}' failed at line {}", self.command, self.line)?;
        if !self.loop_path.is_empty() {
            write!(f, " (loop path {:?})", self.loop_path.indices())?;
        }
        write!(f, ": {}", self.kind)
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Failure categories surfaced during a run.
#[derive(Debug, Error)]
pub enum ExecErrorKind {
    /// The command name resolved to nothing; only reachable when an
    /// unvalidated script is executed.
    #[error("unknown command")]
    UnknownCommand,

    /// Argument binding or type casting failed.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// The callable, or its remote transport, failed.
    #[error(transparent)]
    Invoke(#[from] InvokeError),
}
