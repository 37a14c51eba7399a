use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};
use crate::registry::Registry;

/// One node of a structured script: a command call or a loop block.
///
/// Every node remembers the 1-based line it came from in the original script
/// text, so errors can point the operator back at their editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptNode {
    /// A single command call.
    Command {
        /// Command name, the first token of the line.
        name: String,
        /// Ordered literal argument tokens.
        args: Vec<String>,
        /// Source line number.
        line: usize,
    },
    /// A `loop N ... end` block.
    Loop {
        /// Number of sequential repetitions.
        count: usize,
        /// Child nodes, in script order.
        body: Vec<ScriptNode>,
        /// Source line of the `loop` statement.
        line: usize,
    },
}

impl ScriptNode {
    /// Source line the node originated from.
    pub fn line(&self) -> usize {
        match self {
            ScriptNode::Command { line, .. } | ScriptNode::Loop { line, .. } => *line,
        }
    }
}

/// A structurally valid script: the ordered root sequence of nodes.
///
/// Built once by [`parse`](crate::script::parse), then either validated and
/// handed to the executor for one run, or retained for syntax-check-only use.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Script {
    nodes: Vec<ScriptNode>,
}

impl Script {
    pub(crate) fn new(nodes: Vec<ScriptNode>) -> Self {
        Self { nodes }
    }

    /// Root node sequence.
    pub fn nodes(&self) -> &[ScriptNode] {
        &self.nodes
    }

    /// True when the script holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total command invocations a run will perform, with loop bodies
    /// multiplied out. Saturates on absurd loop counts.
    pub fn total_invocations(&self) -> usize {
        fn count(nodes: &[ScriptNode]) -> usize {
            nodes.iter().fold(0usize, |acc, node| {
                let n = match node {
                    ScriptNode::Command { .. } => 1,
                    ScriptNode::Loop { count: reps, body, .. } => {
                        reps.saturating_mul(count(body))
                    }
                };
                acc.saturating_add(n)
            })
        }
        count(&self.nodes)
    }

    /// Referential validation against the registry: every command name must
    /// resolve, and each call must supply at least as many tokens as the
    /// command's user-required specs. Fails on the first offence.
    pub fn validate(&self, registry: &Registry) -> ParseResult<()> {
        match self.first_reference_error(&self.nodes, registry) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Collect every referential error in the script, for editor-style
    /// diagnostics. Empty means the script is ready to run.
    pub fn check(&self, registry: &Registry) -> Vec<ParseError> {
        let mut errors = Vec::new();
        self.collect_reference_errors(&self.nodes, registry, &mut errors);
        errors
    }

    fn first_reference_error(
        &self,
        nodes: &[ScriptNode],
        registry: &Registry,
    ) -> Option<ParseError> {
        for node in nodes {
            match node {
                ScriptNode::Command { name, args, line } => {
                    if let Some(err) = reference_error(registry, name, args, *line) {
                        return Some(err);
                    }
                }
                ScriptNode::Loop { body, .. } => {
                    if let Some(err) = self.first_reference_error(body, registry) {
                        return Some(err);
                    }
                }
            }
        }
        None
    }

    fn collect_reference_errors(
        &self,
        nodes: &[ScriptNode],
        registry: &Registry,
        errors: &mut Vec<ParseError>,
    ) {
        for node in nodes {
            match node {
                ScriptNode::Command { name, args, line } => {
                    if let Some(err) = reference_error(registry, name, args, *line) {
                        errors.push(err);
                    }
                }
                ScriptNode::Loop { body, .. } => {
                    self.collect_reference_errors(body, registry, errors);
                }
            }
        }
    }
}

fn reference_error(
    registry: &Registry,
    name: &str,
    args: &[String],
    line: usize,
) -> Option<ParseError> {
    let Some(entry) = registry.resolve(name) else {
        return Some(ParseError::UnknownCommand {
            line,
            name: name.to_string(),
        });
    };

    let required = entry.required_count();
    if required > args.len() {
        return Some(ParseError::ArgumentCount {
            line,
            name: name.to_string(),
            required,
            supplied: args.len(),
        });
    }
    None
}
