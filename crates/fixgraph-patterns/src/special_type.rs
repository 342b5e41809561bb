/*! Recognition of checks against special values.
 *
 * Guards like `if (err)`, `if (x == null)` or `if (typeof x == 'undefined')`
 * all establish something about a name on one branch. Patterns use these
 * helpers to decide whether an edge condition checks a particular variable.
 */

use fixgraph_core::ast::{BinaryOp, LiteralValue, NodeId, NodeKind, SyntaxTree};

/// The falsy or sentinel values repairs commonly introduce checks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialType {
    Undefined,
    Null,
    NaN,
    Blank,
    Zero,
}

/// The special value a literal denotes, if any.
pub fn literal_special_type(value: &LiteralValue) -> Option<SpecialType> {
    match value {
        LiteralValue::Undefined => Some(SpecialType::Undefined),
        LiteralValue::Null => Some(SpecialType::Null),
        LiteralValue::Number(n) if n == "0" => Some(SpecialType::Zero),
        LiteralValue::Number(n) if n.eq_ignore_ascii_case("nan") => Some(SpecialType::NaN),
        LiteralValue::String(s) if s.is_empty() => Some(SpecialType::Blank),
        _ => None,
    }
}

/// True when `condition` checks the variable `name`: a truthiness test, a
/// negation, a `typeof` probe, or an (in)equality comparison against a
/// special value. Short-circuit operands are searched on both sides.
pub fn condition_checks(tree: &SyntaxTree, condition: NodeId, name: &str) -> bool {
    match tree.kind(condition) {
        NodeKind::Name { text } => text == name,
        NodeKind::Not { operand } | NodeKind::TypeOf { operand } => {
            condition_checks(tree, *operand, name)
        }
        NodeKind::And { left, right } | NodeKind::Or { left, right } => {
            condition_checks(tree, *left, name) || condition_checks(tree, *right, name)
        }
        NodeKind::Binary { op, left, right } => {
            let comparison = matches!(
                op,
                BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq
            );
            if !comparison {
                return false;
            }
            let compares_special = |id: NodeId| match tree.kind(id) {
                NodeKind::Literal { value } => literal_special_type(value).is_some(),
                NodeKind::Name { text } => text == "undefined" || text == "NaN",
                NodeKind::TypeOf { .. } => true,
                _ => false,
            };
            (condition_checks(tree, *left, name) && compares_special(*right))
                || (condition_checks(tree, *right, name) && compares_special(*left))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgraph_core::ast::ChangeTag;

    fn name(tree: &mut SyntaxTree, text: &str) -> NodeId {
        tree.add(
            NodeKind::Name {
                text: text.to_string(),
            },
            ChangeTag::Unchanged,
        )
    }

    #[test]
    fn test_truthiness_guard() {
        let mut tree = SyntaxTree::new();
        let err = name(&mut tree, "err");
        assert!(condition_checks(&tree, err, "err"));
        assert!(!condition_checks(&tree, err, "data"));
    }

    #[test]
    fn test_negated_guard() {
        let mut tree = SyntaxTree::new();
        let err = name(&mut tree, "err");
        let not = tree.add(NodeKind::Not { operand: err }, ChangeTag::Unchanged);
        assert!(condition_checks(&tree, not, "err"));
    }

    #[test]
    fn test_comparison_against_null() {
        let mut tree = SyntaxTree::new();
        let x = name(&mut tree, "x");
        let null = tree.add(
            NodeKind::Literal {
                value: LiteralValue::Null,
            },
            ChangeTag::Unchanged,
        );
        let cmp = tree.add(
            NodeKind::Binary {
                op: BinaryOp::NotEq,
                left: x,
                right: null,
            },
            ChangeTag::Unchanged,
        );
        assert!(condition_checks(&tree, cmp, "x"));
    }

    #[test]
    fn test_comparison_against_ordinary_value_is_not_a_check() {
        let mut tree = SyntaxTree::new();
        let x = name(&mut tree, "x");
        let five = tree.add(
            NodeKind::Literal {
                value: LiteralValue::Number("5".to_string()),
            },
            ChangeTag::Unchanged,
        );
        let cmp = tree.add(
            NodeKind::Binary {
                op: BinaryOp::Eq,
                left: x,
                right: five,
            },
            ChangeTag::Unchanged,
        );
        assert!(!condition_checks(&tree, cmp, "x"));
    }

    #[test]
    fn test_short_circuit_operands_are_searched() {
        let mut tree = SyntaxTree::new();
        let a = name(&mut tree, "a");
        let err = name(&mut tree, "err");
        let and = tree.add(
            NodeKind::And {
                left: a,
                right: err,
            },
            ChangeTag::Unchanged,
        );
        assert!(condition_checks(&tree, and, "err"));
        assert!(condition_checks(&tree, and, "a"));
        assert!(!condition_checks(&tree, and, "b"));
    }
}
