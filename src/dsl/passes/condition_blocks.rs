//! Flattens `if ... then ... end` blocks: each nested assignment gets
//! `outer and (inner and own)` as its condition.

use std::rc::Rc;

use super::{with_parts, Context};
use crate::dsl::ast::{Expr, Expression, Operator, Statement, Stmt};
use crate::dsl::error::CompileError;

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    let mut blocks: Vec<Expr> = Vec::new();
    let mut out = Vec::with_capacity(stmts.len());

    for stmt in stmts {
        match &*stmt {
            Statement::ConditionPush { condition } => blocks.push(Rc::clone(condition)),
            Statement::ConditionPop => {
                if blocks.pop().is_none() {
                    unreachable!("unbalanced condition block");
                }
            }
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            } => {
                if blocks.is_empty() {
                    out.push(Rc::clone(&stmt));
                    continue;
                }
                let mut combined = condition.clone();
                for block in blocks.iter().rev() {
                    combined = Some(match combined {
                        None => Rc::clone(block),
                        Some(inner) => conjoin(block, inner, ctx),
                    });
                }
                out.push(with_parts(
                    ctx,
                    &stmt,
                    Rc::clone(setting),
                    Rc::clone(value),
                    combined,
                ));
            }
            Statement::Trigger { .. } => {
                if !blocks.is_empty() {
                    return Err(ctx.error(&stmt, "Triggers are not allowed inside condition blocks"));
                }
                out.push(stmt);
            }
            Statement::MacroDefinition { .. } | Statement::MacroUse { .. } => {
                unreachable!("macros are expanded before condition blocks")
            }
        }
    }

    debug_assert!(blocks.is_empty(), "unclosed condition block reached lowering");
    Ok(out)
}

/// `outer and inner`, located over both operands.
fn conjoin(outer: &Expr, inner: Expr, ctx: &mut Context<'_>) -> Expr {
    let locations = [
        ctx.source_map.location_of(outer),
        ctx.source_map.location_of(&inner),
    ];
    let node = Rc::new(Expression::Compound {
        operator: Operator::And,
        args: vec![Rc::clone(outer), inner],
    });
    ctx.source_map.derive_merged(&node, &locations);
    node
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{condition_of, lower};
    use super::*;
    use crate::dsl::registry::Registry;
    use crate::dsl::source_map::SourceMap;

    fn run_blocks(source: &str) -> Result<Vec<Stmt>, CompileError> {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        lower(source, &[run], &registry, &mut map)
    }

    fn operands(expr: &Expression) -> (&Expr, &Expr) {
        let Expression::Compound { operator: Operator::And, args } = expr else {
            panic!("expected and, got {expr:?}");
        };
        (&args[0], &args[1])
    }

    #[test]
    fn block_condition_is_attached() {
        let stmts = run_blocks("if A then\n  x = 1\nend\ny = 2").unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(condition_of(&stmts[0]).as_identifier(), Some("A"));
        let Statement::SettingAssignment { condition, .. } = &*stmts[1] else { panic!() };
        assert!(condition.is_none());
    }

    #[test]
    fn nested_blocks_compose_outermost_first() {
        let stmts = run_blocks("if A then\n  if B then\n    x = 1 if C\n  end\nend").unwrap();
        let (outer, rest) = operands(condition_of(&stmts[0]));
        assert_eq!(outer.as_identifier(), Some("A"));
        let (inner, own) = operands(rest);
        assert_eq!(inner.as_identifier(), Some("B"));
        assert_eq!(own.as_identifier(), Some("C"));
    }

    #[test]
    fn else_branch_gets_negated_condition() {
        let stmts = run_blocks("if A then\n  x = 1\nelse\n  x = 2\nend").unwrap();
        assert!(matches!(
            &**condition_of(&stmts[1]),
            Expression::Compound { operator: Operator::Not, .. }
        ));
    }

    #[test]
    fn trigger_in_block_is_rejected() {
        let err = run_blocks("if A then\n  Research tech-club when Built city-windmill\nend").unwrap_err();
        assert_eq!(err.message, "Triggers are not allowed inside condition blocks");
        assert_eq!(err.location.unwrap().start.line, 2);
    }

    #[test]
    fn conjunction_spans_both_conditions() {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        let stmts = lower("if A then x = 1 if B end", &[run], &registry, &mut map).unwrap();
        let loc = map.location_of(condition_of(&stmts[0])).unwrap();
        assert_eq!((loc.start.column, loc.stop.column), (4, 21));
    }
}
