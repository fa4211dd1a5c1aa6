//! `...` in a value or condition stands for the key of the statement's own
//! setting target: `Sell[Coal, Iron] = ON if ResourceDemanded[...]`.

use std::rc::Rc;

use super::{map_children, with_parts, Context};
use crate::dsl::ast::{Expr, Expression, Ident, Statement, Stmt};
use crate::dsl::error::CompileError;

const NO_CONTEXT: &str = "Placeholder used without the context to resolve it";

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        let lowered = match &*stmt {
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            } => {
                reject(setting, ctx)?;
                let key = target_key(setting);
                let value = substitute(value, key.as_ref(), ctx)?;
                let condition = match condition {
                    Some(c) => Some(substitute(c, key.as_ref(), ctx)?),
                    None => None,
                };
                with_parts(ctx, &stmt, Rc::clone(setting), value, condition)
            }
            Statement::ConditionPush { condition } => {
                reject(condition, ctx)?;
                Rc::clone(&stmt)
            }
            _ => Rc::clone(&stmt),
        };
        out.push(lowered);
    }
    Ok(out)
}

/// The identifier a placeholder stands for, if the target has one.
fn target_key(setting: &Expr) -> Option<Ident> {
    match &**setting {
        Expression::Subscript { key, .. } => match &**key {
            Expression::Identifier(ident) => Some(Rc::clone(ident)),
            _ => None,
        },
        _ => None,
    }
}

fn substitute(
    expr: &Expr,
    key: Option<&Ident>,
    ctx: &mut Context<'_>,
) -> Result<Expr, CompileError> {
    match &**expr {
        Expression::Placeholder => match key {
            Some(ident) => Ok(ctx.derive(Expression::Identifier(Rc::clone(ident)), expr)),
            None => Err(ctx.error(expr, NO_CONTEXT)),
        },
        _ => map_children(expr, ctx, &mut |e: &Expr, ctx: &mut Context<'_>| {
            substitute(e, key, ctx)
        }),
    }
}

/// Block conditions and targets have nothing to resolve against.
fn reject(expr: &Expr, ctx: &mut Context<'_>) -> Result<(), CompileError> {
    substitute(expr, None, ctx).map(|_| ())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{condition_of, lower};
    use super::super::{folds, wildcards};
    use super::*;
    use crate::dsl::registry::Registry;
    use crate::dsl::source_map::SourceMap;

    fn run_placeholders(source: &str) -> Result<Vec<Stmt>, CompileError> {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        lower(source, &[wildcards::run, folds::run, run], &registry, &mut map)
    }

    fn condition_key(stmt: &Statement) -> String {
        let Expression::Subscript { key, .. } = &**condition_of(stmt) else {
            panic!("expected subscript condition");
        };
        key.as_identifier().unwrap().to_string()
    }

    #[test]
    fn placeholder_takes_each_unrolled_key() {
        let stmts = run_placeholders("Sell[Coal, Iron] = ON if ResourceDemanded[...]").unwrap();
        assert_eq!(condition_key(&stmts[0]), "Coal");
        assert_eq!(condition_key(&stmts[1]), "Iron");
    }

    #[test]
    fn placeholder_in_value() {
        let stmts = run_placeholders("BuyRatio.Coal = ResourceRatio[...] * 2").unwrap();
        let Statement::SettingAssignment { value, .. } = &*stmts[0] else { panic!() };
        let Expression::Compound { args, .. } = &**value else { panic!() };
        let Expression::Subscript { key, .. } = &*args[0] else { panic!() };
        assert_eq!(key.as_identifier(), Some("Coal"));
    }

    #[test]
    fn placeholder_without_subscript_target() {
        let err = run_placeholders("autoBuild = ON if ResourceDemanded[...]").unwrap_err();
        assert_eq!(err.message, NO_CONTEXT);
    }

    #[test]
    fn placeholder_in_block_condition() {
        let err = run_placeholders("if ResourceDemanded[...] then\n  Sell.Coal = ON\nend").unwrap_err();
        assert_eq!(err.message, NO_CONTEXT);
        let loc = err.location.unwrap();
        assert_eq!((loc.start.line, loc.start.column), (1, 21));
    }
}
