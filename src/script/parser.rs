use super::ast::{Script, ScriptNode};
use crate::error::{ParseError, ParseResult};
use crate::registry::Registry;

/// Prefix marking a comment line.
pub const COMMENT_PREFIX: char = '#';

/// Parse script text into a structured [`Script`], without consulting any
/// registry.
///
/// The input is processed line by line; blank lines and lines starting with
/// [`COMMENT_PREFIX`] are skipped, but still counted, so reported line
/// numbers match the original text. `loop <positive integer>` opens a block,
/// a line equal to `end` closes the innermost open block, and every other
/// non-empty line is a command call whose first token is the command name.
///
/// Tokens are split on ASCII whitespace with no quoting or escaping, so an
/// argument value containing whitespace is not representable.
pub fn parse(source: &str) -> ParseResult<Script> {
    let mut root: Vec<ScriptNode> = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();

    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw.trim();
        if text.is_empty() || text.starts_with(COMMENT_PREFIX) {
            continue;
        }

        let mut tokens = text.split_ascii_whitespace();
        let head = tokens.next().expect("non-empty line has a first token");

        if head == "loop" {
            let remainder = tokens.collect::<Vec<_>>().join(" ");
            let count = parse_loop_count(&remainder).ok_or_else(|| {
                ParseError::InvalidLoopCount {
                    line,
                    token: remainder.clone(),
                }
            })?;
            stack.push(OpenBlock {
                line,
                count,
                nodes: Vec::new(),
            });
        } else if text == "end" {
            let block = stack.pop().ok_or(ParseError::DanglingEnd { line })?;
            let node = ScriptNode::Loop {
                count: block.count,
                body: block.nodes,
                line: block.line,
            };
            push_node(&mut root, &mut stack, node);
        } else {
            let node = ScriptNode::Command {
                name: head.to_string(),
                args: tokens.map(str::to_string).collect(),
                line,
            };
            push_node(&mut root, &mut stack, node);
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::UnbalancedBlock { line: open.line });
    }

    let script = Script::new(root);
    tracing::debug!(
        nodes = script.nodes().len(),
        invocations = script.total_invocations(),
        "parsed script"
    );
    Ok(script)
}

/// Parse and referentially validate in one step: the returned script is
/// ready to execute against `registry`.
pub fn parse_validated(source: &str, registry: &Registry) -> ParseResult<Script> {
    let script = parse(source)?;
    script.validate(registry)?;
    Ok(script)
}

struct OpenBlock {
    line: usize,
    count: usize,
    nodes: Vec<ScriptNode>,
}

fn push_node(root: &mut Vec<ScriptNode>, stack: &mut [OpenBlock], node: ScriptNode) {
    match stack.last_mut() {
        Some(open) => open.nodes.push(node),
        None => root.push(node),
    }
}

fn parse_loop_count(token: &str) -> Option<usize> {
    match token.parse::<usize>() {
        Ok(count) if count > 0 => Some(count),
        _ => None,
    }
}
