use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};

use probescript::error::{InvokeError, RemoteError};
use probescript::registry::{ArgSpec, Registry, Reply, Value, ValueKind};
use probescript::remote::{Endpoint, EndpointTable};
use probescript::script::parse_validated;
use probescript::{Executor, RunState};

/// One-shot endpoint stub: accepts a single connection, reads the request
/// line, optionally writes a reply, then closes. Returns the request frame.
fn spawn_endpoint(reply: Option<&'static str>) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut line = String::new();
        reader.read_line(&mut line).expect("read request");
        if let Some(reply) = reply {
            stream.write_all(reply.as_bytes()).expect("write reply");
        }
        line
    });
    (addr, handle)
}

fn table_for(addr: SocketAddr) -> EndpointTable {
    let mut table = EndpointTable::new();
    table.insert(
        "rig",
        Endpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        },
    );
    table
}

#[test]
fn send_is_fire_and_forget() {
    let (addr, handle) = spawn_endpoint(None);
    let client = table_for(addr).client("rig").expect("client");

    client
        .send("setFrequency", &[Value::F32(250.0)])
        .expect("send");

    let frame = handle.join().expect("endpoint thread");
    assert_eq!(frame, "setFrequency 250\n");
}

#[test]
fn query_round_trips_and_maps_the_none_sentinel() {
    let (addr, handle) = spawn_endpoint(Some("None|None|12,None,3.5\n"));
    let client = table_for(addr).client("rig").expect("client");

    let reply = client
        .query("getSpectrum", &[Value::U32(2)])
        .expect("query");

    assert_eq!(handle.join().expect("endpoint thread"), "getSpectrum 2\n");
    assert_eq!(reply.error, None);
    assert_eq!(reply.response, None);
    assert_eq!(
        reply.variables,
        vec![Some(Value::I64(12)), None, Some(Value::F64(3.5))]
    );
}

#[test]
fn malformed_reply_is_a_protocol_error() {
    let (addr, _handle) = spawn_endpoint(Some("error only\n"));
    let client = table_for(addr).client("rig").expect("client");

    let err = client.query("status", &[]).unwrap_err();
    assert!(matches!(err, RemoteError::MalformedReply { fields: 1, .. }));
}

#[test]
fn unreachable_endpoint_is_a_connection_error() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("local addr")
    };
    let client = table_for(addr).client("rig").expect("client");

    let err = client.send("setFrequency", &[Value::F32(1.0)]).unwrap_err();
    assert!(matches!(err, RemoteError::Connection { endpoint, .. } if endpoint == "rig"));
}

#[test]
fn remote_backed_commands_dispatch_through_the_registry() {
    let (addr, handle) = spawn_endpoint(None);

    let registry = Registry::builder()
        .endpoints(table_for(addr))
        .remote_send(
            "rig.FreqSet",
            vec![ArgSpec::required("Frequency (Hz)", ValueKind::F32)],
            "rig",
            "setFrequency",
        )
        .build()
        .expect("registry build");

    let script = parse_validated("rig.FreqSet 1e3\n", &registry).expect("parse");
    let report = Executor::new(&registry).run(&script);

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(handle.join().expect("endpoint thread"), "setFrequency 1000\n");
}

#[test]
fn remote_failure_fails_the_run_at_the_offending_node() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("local addr")
    };

    let registry = Registry::builder()
        .endpoints(table_for(addr))
        .remote_query("rig.Status", Vec::new(), "rig", "status")
        .free("noop", Vec::new(), |_| Ok(Reply::empty()))
        .build()
        .expect("registry build");

    let script = parse_validated("noop\nrig.Status\nnoop\n", &registry).expect("parse");
    let report = Executor::new(&registry).run(&script);

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.executed, 1);
    let err = report.error.expect("exec error");
    assert_eq!(err.line, 2);
    assert!(matches!(
        err.kind,
        probescript::error::ExecErrorKind::Invoke(InvokeError::Remote(
            RemoteError::Connection { .. }
        ))
    ));
}
