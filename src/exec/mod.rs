//! Script execution.
//!
//! The executor walks a validated block tree depth-first on a single thread.
//! Each command node resolves through the registry, binds and casts its
//! arguments, and invokes the target callable; loop nodes repeat their body
//! sequentially. Waits and remote queries block that same thread, so a
//! cancellation request — a flag polled only at node boundaries — takes
//! effect once the current node finishes. Nothing is rolled back on
//! cancellation or failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::error::{ExecError, ExecErrorKind, LoopPath};
use crate::registry::Registry;
use crate::script::{Script, ScriptNode};

/// Executor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// No run has started yet.
    Idle,
    /// A run is in progress.
    Running,
    /// The last run was cancelled between nodes.
    Cancelled,
    /// The last run executed every node.
    Completed,
    /// The last run aborted at a failing node.
    Failed,
}

/// Cloneable cancellation handle shared between the executor and its host.
///
/// Setting the flag stops the run at the next node boundary; the node
/// currently executing always finishes first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the associated run.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Ephemeral per-run state: run identity, the cancellation flag, and the
/// current loop-index path.
#[derive(Debug)]
pub struct ExecutionContext {
    run_id: Uuid,
    cancel: CancelToken,
    loop_path: LoopPath,
}

impl ExecutionContext {
    fn new(cancel: CancelToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            cancel,
            loop_path: LoopPath::new(),
        }
    }

    /// Unique identifier of this run.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Whether cancellation of this run has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Enclosing loop iteration indices, outermost first.
    pub fn loop_path(&self) -> &LoopPath {
        &self.loop_path
    }
}

/// Outcome of one run.
#[derive(Debug)]
pub struct RunReport {
    /// Final executor state for the run.
    pub state: RunState,
    /// Commands actually invoked before completion, cancellation or failure.
    pub executed: usize,
    /// Commands the script would invoke in full, loops multiplied out.
    pub planned: usize,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// The aborting error, for failed runs.
    pub error: Option<ExecError>,
}

impl RunReport {
    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

enum Stop {
    Cancelled,
    Failed(ExecError),
}

/// Single-threaded interpreter over a validated block tree.
///
/// The registry is shared immutable configuration; the executor only borrows
/// it. At most one run is active per executor at a time.
pub struct Executor<'r> {
    registry: &'r Registry,
    cancel: CancelToken,
    state: RunState,
}

impl<'r> Executor<'r> {
    /// Executor with a private cancellation token.
    pub fn new(registry: &'r Registry) -> Self {
        Self::with_cancel_token(registry, CancelToken::new())
    }

    /// Executor wired to an externally held cancellation token, e.g. a UI
    /// stop button created before the registry.
    pub fn with_cancel_token(registry: &'r Registry, cancel: CancelToken) -> Self {
        Self {
            registry,
            cancel,
            state: RunState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Handle for cancelling the current (or next) run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Execute a validated script to completion, cancellation, or first
    /// failure.
    ///
    /// A cancellation requested before the run starts is discarded; the flag
    /// is polled from the first node boundary onwards. Execute unvalidated
    /// scripts at your own risk: an unresolved command name then fails the
    /// run instead of rejecting it up front.
    pub fn run(&mut self, script: &Script) -> RunReport {
        self.cancel.clear();
        self.state = RunState::Running;

        let ctx = &mut ExecutionContext::new(self.cancel.clone());
        let span = tracing::info_span!("script_run", run_id = %ctx.run_id());
        let _guard = span.enter();

        let started_at = Utc::now();
        let mut executed = 0usize;
        let outcome = self.run_nodes(script.nodes(), ctx, &mut executed);

        let (state, error) = match outcome {
            Ok(()) => (RunState::Completed, None),
            Err(Stop::Cancelled) => (RunState::Cancelled, None),
            Err(Stop::Failed(err)) => {
                tracing::error!(error = %err, "run failed");
                (RunState::Failed, Some(err))
            }
        };
        self.state = state;
        tracing::info!(?state, executed, "run finished");

        RunReport {
            state,
            executed,
            planned: script.total_invocations(),
            started_at,
            finished_at: Utc::now(),
            error,
        }
    }

    fn run_nodes(
        &self,
        nodes: &[ScriptNode],
        ctx: &mut ExecutionContext,
        executed: &mut usize,
    ) -> Result<(), Stop> {
        for node in nodes {
            if ctx.is_cancelled() {
                tracing::info!(line = node.line(), "cancellation requested");
                return Err(Stop::Cancelled);
            }

            match node {
                ScriptNode::Command { name, args, line } => {
                    self.run_command(name, args, *line, ctx)?;
                    *executed += 1;
                }
                ScriptNode::Loop { count, body, .. } => {
                    for iteration in 0..*count {
                        ctx.loop_path.enter(iteration);
                        let result = self.run_nodes(body, ctx, executed);
                        ctx.loop_path.exit();
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn run_command(
        &self,
        name: &str,
        args: &[String],
        line: usize,
        ctx: &ExecutionContext,
    ) -> Result<(), Stop> {
        let fail = |kind: ExecErrorKind| {
            Stop::Failed(ExecError::new(name, line, ctx.loop_path.clone(), kind))
        };

        let entry = self
            .registry
            .resolve(name)
            .ok_or_else(|| fail(ExecErrorKind::UnknownCommand))?;

        let tokens: Vec<&str> = args.iter().map(String::as_str).collect();
        let values = entry
            .bind_arguments(&tokens)
            .map_err(|err| fail(err.into()))?;

        tracing::debug!(command = %name, line, args = ?values, "invoking");
        let reply = entry.invoke(&values).map_err(|err| fail(err.into()))?;

        if let Some(device_error) = &reply.error {
            // Device-reported condition, logged like the request itself.
            tracing::warn!(command = %name, line, error = %device_error, "command reported error");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ArgSpec, Registry, Reply, Value, ValueKind};
    use crate::script::parse_validated;
    use std::sync::Mutex;

    fn recording_registry(log: Arc<Mutex<Vec<i64>>>) -> Registry {
        Registry::builder()
            .free(
                "mark",
                vec![ArgSpec::required("id", ValueKind::I64)],
                move |values| {
                    let id = values[0].as_i64().unwrap_or(-1);
                    log.lock().unwrap().push(id);
                    Ok(Reply::empty())
                },
            )
            .build()
            .expect("build")
    }

    #[test]
    fn completed_run_executes_every_node_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(Arc::clone(&log));
        let script = parse_validated("mark 1\nmark 2\nmark 3\n", &registry).expect("parse");

        let mut executor = Executor::new(&registry);
        assert_eq!(executor.state(), RunState::Idle);

        let report = executor.run(&script);
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(executor.state(), RunState::Completed);
        assert_eq!(report.executed, 3);
        assert_eq!(report.planned, 3);
        assert!(report.error.is_none());
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn nested_loops_multiply_in_outer_major_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(Arc::clone(&log));
        let source = "loop 2\nmark 0\nloop 3\nmark 1\nend\nend\n";
        let script = parse_validated(source, &registry).expect("parse");

        let report = Executor::new(&registry).run(&script);
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.executed, 2 * (1 + 3));
        assert_eq!(
            *log.lock().unwrap(),
            vec![0, 1, 1, 1, 0, 1, 1, 1],
        );
    }

    #[test]
    fn cast_failure_reports_line_and_loop_path() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = recording_registry(Arc::clone(&log));
        // Inner loop's second iteration never happens: the bad token fails
        // binding on iteration [0, 0] of the enclosing loops.
        let source = "loop 2\nloop 2\nmark oops\nend\nend\n";
        let script = crate::script::parse(source).expect("parse");

        let report = Executor::new(&registry).run(&script);
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.executed, 0);

        let err = report.error.expect("error");
        assert_eq!(err.command, "mark");
        assert_eq!(err.line, 3);
        assert_eq!(err.loop_path.indices(), &[0, 0]);
        assert!(matches!(err.kind, ExecErrorKind::Bind(_)));
    }

    #[test]
    fn callable_failure_stops_the_run() {
        let registry = Registry::builder()
            .free("ok", Vec::new(), |_| Ok(Reply::empty()))
            .free("boom", Vec::new(), |_| {
                Err(crate::error::InvokeError::command("driver unavailable"))
            })
            .build()
            .expect("build");
        let script = parse_validated("ok\nboom\nok\n", &registry).expect("parse");

        let report = Executor::new(&registry).run(&script);
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.executed, 1);
        let err = report.error.expect("error");
        assert_eq!(err.line, 2);
        assert!(err.to_string().contains("driver unavailable"));
    }

    #[test]
    fn device_reported_error_does_not_stop_the_run() {
        let registry = Registry::builder()
            .free("warns", Vec::new(), |_| {
                Ok(Reply {
                    error: Some("saturation".to_string()),
                    ..Reply::empty()
                })
            })
            .build()
            .expect("build");
        let script = parse_validated("warns\nwarns\n", &registry).expect("parse");

        let report = Executor::new(&registry).run(&script);
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.executed, 2);
    }

    #[test]
    fn cancellation_stops_at_the_next_node_boundary() {
        let token = CancelToken::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let trip = token.clone();
        let log_in_cmd = Arc::clone(&log);
        let registry = Registry::builder()
            .free(
                "mark",
                vec![ArgSpec::required("id", ValueKind::I64)],
                move |values| {
                    let id = values[0].as_i64().unwrap_or(-1);
                    log_in_cmd.lock().unwrap().push(id);
                    if id == 3 {
                        trip.cancel();
                    }
                    Ok(Reply::empty())
                },
            )
            .build()
            .expect("build");

        let source = (1..=10)
            .map(|i| format!("mark {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let script = parse_validated(&source, &registry).expect("parse");

        let mut executor = Executor::with_cancel_token(&registry, token);
        let report = executor.run(&script);

        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(executor.state(), RunState::Cancelled);
        assert_eq!(report.executed, 3);
        assert!(report.error.is_none());
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unresolved_command_fails_an_unvalidated_run() {
        let registry = Registry::builder().build().expect("build");
        let script = crate::script::parse("ghost\n").expect("parse");

        let report = Executor::new(&registry).run(&script);
        assert_eq!(report.state, RunState::Failed);
        let err = report.error.expect("error");
        assert!(matches!(err.kind, ExecErrorKind::UnknownCommand));
    }
}
