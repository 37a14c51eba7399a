use proptest::prelude::*;

use probescript::ParseError;
use probescript::script::parse;

#[derive(Debug, Clone)]
enum Line {
    Loop(u8),
    End,
    Command,
}

impl Line {
    fn render(&self) -> String {
        match self {
            Line::Loop(n) => format!("loop {n}"),
            Line::End => "end".to_string(),
            Line::Command => "cmd 1".to_string(),
        }
    }
}

fn line_strategy() -> impl Strategy<Value = Line> {
    prop_oneof![
        (1u8..9).prop_map(Line::Loop),
        Just(Line::End),
        Just(Line::Command),
    ]
}

/// `loop`/`end` balance computed independently of the parser: depth never
/// dips below zero and ends at zero.
fn is_balanced(lines: &[Line]) -> bool {
    let mut depth: i64 = 0;
    for line in lines {
        match line {
            Line::Loop(_) => depth += 1,
            Line::End => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Line::Command => {}
        }
    }
    depth == 0
}

proptest! {
    #[test]
    fn parse_succeeds_iff_nesting_balances(lines in prop::collection::vec(line_strategy(), 0..48)) {
        let source = lines
            .iter()
            .map(Line::render)
            .collect::<Vec<_>>()
            .join("\n");

        let result = parse(&source);
        prop_assert_eq!(result.is_ok(), is_balanced(&lines));

        if let Err(err) = parse(&source) {
            // Imbalance yields exactly the matching structural error.
            let is_structural = matches!(
                err,
                ParseError::UnbalancedBlock { .. } | ParseError::DanglingEnd { .. }
            );
            prop_assert!(is_structural, "unexpected error variant: {:?}", err);
        }
    }

    #[test]
    fn loop_counts_multiply_total_invocations(outer in 1usize..20, inner in 1usize..20) {
        let source = format!("loop {outer}\nloop {inner}\ncmd 1\nend\nend\n");
        let script = parse(&source).expect("balanced script parses");
        prop_assert_eq!(script.total_invocations(), outer * inner);
    }
}
