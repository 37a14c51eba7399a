//! Command registry and dispatch.
//!
//! The registry is an immutable table mapping command names to dispatch
//! descriptors: a callable, an ordered list of argument specs, and whether
//! the callable is a free function or a method bound to a shared receiver
//! instance. It is built once via [`RegistryBuilder`] and read-only for the
//! lifetime of the process; receiver instances and remote endpoints are
//! resolved during the build, so every configuration mistake surfaces there
//! rather than mid-script.

/// Shared receiver instances for bound commands.
pub mod instance;
/// Typed scalar values and the closed set of value kinds.
pub mod value;

pub use instance::InstanceMap;
pub use value::{Value, ValueKind};

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BindError, ConfigError, InvokeError};
use crate::remote::EndpointTable;

/// Uniform result of one command invocation.
///
/// Mirrors the remote reply triple; local commands that produce nothing
/// return [`Reply::empty`]. A populated `error` field is a device-reported
/// condition and is logged, not a run-stopping failure — callables signal
/// those through `Err`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Device-reported error message, if any.
    pub error: Option<String>,
    /// Raw response payload, if any.
    pub response: Option<String>,
    /// Returned variables; `None` elements are explicit absences.
    pub variables: Vec<Option<Value>>,
}

impl Reply {
    /// Reply with no error, response, or variables.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Reply carrying only variables.
    pub fn with_variables(variables: Vec<Option<Value>>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }
}

/// One argument slot of a command, in declaration order.
///
/// Order is semantically significant: user-supplied tokens bind to the
/// user-required specs in declaration order, while optional specs take their
/// defaults without consuming a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    /// Display label, used in cast error messages.
    pub label: String,
    /// Declared value kind.
    pub kind: ValueKind,
    /// Value used when the spec is not user-required.
    pub default: Value,
    /// Whether the script author must supply this argument.
    pub user_required: bool,
}

impl ArgSpec {
    /// Spec the script author must supply.
    pub fn required(label: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            label: label.into(),
            kind,
            default: kind.zero(),
            user_required: true,
        }
    }

    /// Spec filled from its default; the kind is taken from that default.
    pub fn optional(label: impl Into<String>, default: Value) -> Self {
        Self {
            label: label.into(),
            kind: default.kind(),
            default,
            user_required: false,
        }
    }
}

/// Callable signature shared by every command.
pub type CommandFn = Arc<dyn Fn(&[Value]) -> Result<Reply, InvokeError> + Send + Sync>;

/// Dispatch target of a command: a free function, or a method whose receiver
/// was resolved once from the [`InstanceMap`] at build time. Receiver
/// injection is invisible to the script author.
#[derive(Clone)]
pub enum CommandTarget {
    /// Free function or closure.
    Free(CommandFn),
    /// Method closed over its shared receiver instance.
    Bound {
        /// Receiver type name, kept for diagnostics.
        receiver: &'static str,
        /// Callable with the receiver already attached.
        call: CommandFn,
    },
}

impl fmt::Debug for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::Free(_) => f.write_str("free"),
            CommandTarget::Bound { receiver, .. } => write!(f, "bound({receiver})"),
        }
    }
}

/// Dispatch descriptor for one command name.
pub struct CommandEntry {
    name: String,
    specs: Vec<ArgSpec>,
    target: CommandTarget,
}

impl CommandEntry {
    /// Command name, the registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered argument specs.
    pub fn specs(&self) -> &[ArgSpec] {
        &self.specs
    }

    /// Number of user-required argument specs.
    pub fn required_count(&self) -> usize {
        self.specs.iter().filter(|spec| spec.user_required).count()
    }

    /// Bind literal tokens to this command's argument specs, in declaration
    /// order.
    ///
    /// Required specs consume and cast the next token; optional specs take
    /// their default and consume nothing, so defaults always fill the same
    /// positions. Surplus tokens beyond the required count are ignored.
    pub fn bind_arguments(&self, tokens: &[&str]) -> Result<Vec<Value>, BindError> {
        let required = self.required_count();
        if tokens.len() < required {
            return Err(BindError::ArgumentCount {
                name: self.name.clone(),
                required,
                supplied: tokens.len(),
            });
        }

        let mut next = 0;
        let mut values = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            if spec.user_required {
                let token = tokens[next];
                next += 1;
                values.push(spec.kind.cast(&spec.label, token)?);
            } else {
                values.push(spec.default.clone());
            }
        }
        Ok(values)
    }

    /// Invoke the target callable with bound, typed, ordered arguments.
    pub fn invoke(&self, values: &[Value]) -> Result<Reply, InvokeError> {
        match &self.target {
            CommandTarget::Free(call) => call(values),
            CommandTarget::Bound { call, .. } => call(values),
        }
    }
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("specs", &self.specs)
            .field("target", &self.target)
            .finish()
    }
}

/// Immutable command table, read-only once built.
#[derive(Debug, Default)]
pub struct Registry {
    commands: HashMap<String, CommandEntry>,
}

impl Registry {
    /// Start building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look a command name up.
    pub fn resolve(&self, name: &str) -> Option<&CommandEntry> {
        self.commands.get(name)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when no command is registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

struct Pending {
    name: String,
    specs: Vec<ArgSpec>,
    resolve: Box<dyn FnOnce(&BuildContext<'_>) -> Result<CommandTarget, ConfigError> + Send>,
}

struct BuildContext<'a> {
    instances: &'a InstanceMap,
    endpoints: &'a EndpointTable,
}

/// Builder collecting command registrations, receiver instances, and the
/// endpoint table, then resolving everything in one [`build`](Self::build)
/// pass.
#[derive(Default)]
pub struct RegistryBuilder {
    instances: InstanceMap,
    endpoints: EndpointTable,
    pending: Vec<Pending>,
}

impl RegistryBuilder {
    /// Register the shared receiver instance for type `T`.
    pub fn instance<T: Any + Send + Sync>(mut self, instance: Arc<T>) -> Self {
        self.instances.insert(instance);
        self
    }

    /// Supply the named remote endpoint table.
    pub fn endpoints(mut self, endpoints: EndpointTable) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Register a free-function command.
    pub fn free<F>(mut self, name: impl Into<String>, specs: Vec<ArgSpec>, call: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Reply, InvokeError> + Send + Sync + 'static,
    {
        let target: CommandFn = Arc::new(call);
        self.pending.push(Pending {
            name: name.into(),
            specs,
            resolve: Box::new(move |_| Ok(CommandTarget::Free(target))),
        });
        self
    }

    /// Register a command backed by a method on receiver type `T`.
    ///
    /// The receiver is looked up in the instance map when the registry is
    /// built; a missing instance fails the build.
    pub fn bound<T, F>(mut self, name: impl Into<String>, specs: Vec<ArgSpec>, call: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &[Value]) -> Result<Reply, InvokeError> + Send + Sync + 'static,
    {
        self.pending.push(Pending {
            name: name.into(),
            specs,
            resolve: Box::new(move |ctx| {
                let receiver = ctx.instances.resolve::<T>()?;
                let target: CommandFn = Arc::new(move |values: &[Value]| call(&receiver, values));
                Ok(CommandTarget::Bound {
                    receiver: type_name::<T>(),
                    call: target,
                })
            }),
        });
        self
    }

    /// Register a fire-and-forget command forwarded to a named remote
    /// endpoint. The endpoint name is resolved at build time.
    pub fn remote_send(
        self,
        name: impl Into<String>,
        specs: Vec<ArgSpec>,
        endpoint: impl Into<String>,
        remote_command: impl Into<String>,
    ) -> Self {
        self.remote(name, specs, endpoint, remote_command, RemoteMode::Send)
    }

    /// Register a blocking query command forwarded to a named remote
    /// endpoint; the parsed reply becomes the command's [`Reply`].
    pub fn remote_query(
        self,
        name: impl Into<String>,
        specs: Vec<ArgSpec>,
        endpoint: impl Into<String>,
        remote_command: impl Into<String>,
    ) -> Self {
        self.remote(name, specs, endpoint, remote_command, RemoteMode::Query)
    }

    fn remote(
        mut self,
        name: impl Into<String>,
        specs: Vec<ArgSpec>,
        endpoint: impl Into<String>,
        remote_command: impl Into<String>,
        mode: RemoteMode,
    ) -> Self {
        let endpoint = endpoint.into();
        let remote_command = remote_command.into();
        self.pending.push(Pending {
            name: name.into(),
            specs,
            resolve: Box::new(move |ctx| {
                let client = ctx.endpoints.client(&endpoint)?;
                let target: CommandFn = Arc::new(move |values: &[Value]| match mode {
                    RemoteMode::Send => {
                        client.send(&remote_command, values)?;
                        Ok(Reply::empty())
                    }
                    RemoteMode::Query => Ok(client.query(&remote_command, values)?),
                });
                Ok(CommandTarget::Free(target))
            }),
        });
        self
    }

    /// Register the built-in `wait` command.
    ///
    /// `wait <seconds>` blocks the executing thread for the given duration.
    /// The sleep is a plain blocking call, so a cancellation requested during
    /// it takes effect only at the next node boundary.
    pub fn wait_command(self) -> Self {
        self.free(
            "wait",
            vec![ArgSpec::required("Time (s)", ValueKind::F64)],
            |values| {
                if let Some(secs) = values.first().and_then(Value::as_f64) {
                    if secs > 0.0 {
                        thread::sleep(Duration::from_secs_f64(secs));
                    }
                }
                Ok(Reply::empty())
            },
        )
    }

    /// Resolve receivers and endpoints and freeze the registry.
    pub fn build(self) -> Result<Registry, ConfigError> {
        let ctx = BuildContext {
            instances: &self.instances,
            endpoints: &self.endpoints,
        };

        let mut commands = HashMap::with_capacity(self.pending.len());
        for pending in self.pending {
            let target = (pending.resolve)(&ctx)?;
            let entry = CommandEntry {
                name: pending.name.clone(),
                specs: pending.specs,
                target,
            };
            if commands.insert(pending.name.clone(), entry).is_some() {
                return Err(ConfigError::DuplicateCommand(pending.name));
            }
        }

        tracing::debug!(commands = commands.len(), "registry built");
        Ok(Registry { commands })
    }
}

#[derive(Clone, Copy)]
enum RemoteMode {
    Send,
    Query,
}
