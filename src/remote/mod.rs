//! Line-oriented TCP protocol client for remote instrument endpoints.
//!
//! Each named endpoint gets its own [`RemoteClient`]. Requests are a single
//! UTF-8 line, `<command> <arg1> <arg2> ...\n`. A fire-and-forget
//! [`send`](RemoteClient::send) writes the frame and returns; a
//! [`query`](RemoteClient::query) blocks until the endpoint closes the
//! connection, then parses the reply `error|response|var1,var2,...`, where
//! the literal token `None` marks an absent field or variable.
//!
//! Connections are scoped to one operation and released on every exit path,
//! so long scripts never accumulate sockets. There is no query timeout and
//! no send retry: a hung endpoint hangs script execution at that node.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult, RemoteError, RemoteResult};
use crate::registry::{Reply, Value};

/// One remote TCP target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port the device listens on.
    pub port: u16,
}

/// Named table of remote endpoints, loaded once as static configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointTable {
    #[serde(flatten)]
    endpoints: HashMap<String, Endpoint>,
}

impl EndpointTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named endpoint.
    pub fn insert(&mut self, name: impl Into<String>, endpoint: Endpoint) {
        self.endpoints.insert(name.into(), endpoint);
    }

    /// Look an endpoint up by name.
    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    /// Load a table from a JSON file of the form
    /// `{"QuPe": {"host": "192.168.1.10", "port": 1337}}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Build the client for a named endpoint; unknown names are a
    /// configuration error.
    pub fn client(&self, name: &str) -> ConfigResult<RemoteClient> {
        let endpoint = self
            .get(name)
            .ok_or_else(|| ConfigError::UnknownEndpoint(name.to_string()))?;
        Ok(RemoteClient {
            name: name.to_string(),
            endpoint: endpoint.clone(),
        })
    }
}

/// Per-endpoint protocol client.
///
/// Calls on one client must be serialized; concurrent use of the same
/// endpoint is not supported.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    name: String,
    endpoint: Endpoint,
}

impl RemoteClient {
    /// Endpoint name this client talks to.
    pub fn endpoint_name(&self) -> &str {
        &self.name
    }

    /// Write one request frame and return without reading a reply.
    ///
    /// Fails with a connection error when the endpoint is unreachable; there
    /// is no automatic retry.
    pub fn send(&self, command: &str, values: &[Value]) -> RemoteResult<()> {
        let frame = request_frame(command, values);
        tracing::debug!(endpoint = %self.name, frame = frame.trim_end(), "send");

        let mut stream = self.connect()?;
        stream.write_all(frame.as_bytes()).map_err(|source| {
            RemoteError::Io {
                endpoint: self.name.clone(),
                source,
            }
        })?;
        Ok(())
    }

    /// Write one request frame and block until the full reply has been read,
    /// then parse it.
    ///
    /// Blocks the calling thread for the whole round trip with no timeout.
    pub fn query(&self, command: &str, values: &[Value]) -> RemoteResult<Reply> {
        let frame = request_frame(command, values);
        tracing::debug!(endpoint = %self.name, frame = frame.trim_end(), "query");

        let mut stream = self.connect()?;
        let io_err = |source| RemoteError::Io {
            endpoint: self.name.clone(),
            source,
        };
        stream.write_all(frame.as_bytes()).map_err(io_err)?;

        let mut raw = String::new();
        stream.read_to_string(&mut raw).map_err(io_err)?;
        let reply = parse_reply(&self.name, &raw)?;
        tracing::debug!(endpoint = %self.name, ?reply, "reply");
        Ok(reply)
    }

    fn connect(&self) -> RemoteResult<TcpStream> {
        TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port)).map_err(|source| {
            RemoteError::Connection {
                endpoint: self.name.clone(),
                source,
            }
        })
    }
}

fn request_frame(command: &str, values: &[Value]) -> String {
    let mut frame = command.to_string();
    for value in values {
        frame.push(' ');
        frame.push_str(&value.to_string());
    }
    frame.push('\n');
    frame
}

/// Parse a `error|response|var1,var2,...` reply. The token `None` marks an
/// absent error/response field, an empty variable list, or an absent
/// individual variable.
fn parse_reply(endpoint: &str, raw: &str) -> RemoteResult<Reply> {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    let fields: Vec<&str> = trimmed.split('|').collect();
    if fields.len() != 3 {
        return Err(RemoteError::MalformedReply {
            endpoint: endpoint.to_string(),
            fields: fields.len(),
            raw: trimmed.to_string(),
        });
    }

    let absent_or = |field: &str| {
        if field == "None" {
            None
        } else {
            Some(field.to_string())
        }
    };

    let variables = if fields[2] == "None" {
        Vec::new()
    } else {
        fields[2]
            .split(',')
            .map(|token| {
                if token == "None" {
                    None
                } else {
                    Some(Value::parse_lenient(token))
                }
            })
            .collect()
    };

    Ok(Reply {
        error: absent_or(fields[0]),
        response: absent_or(fields[1]),
        variables,
    })
}
