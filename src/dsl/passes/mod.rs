//! AST → AST lowering passes.
//!
//! Every pass takes the statement list by value and returns the lowered
//! list. Unchanged nodes are handed back as the identical `Rc`; new nodes
//! record their provenance in the source map through [`Context::derive`].
//! The first semantic error aborts the pass.

pub mod aliases;
pub mod condition_blocks;
pub mod conditions;
pub mod folds;
pub mod macros;
pub mod placeholders;
pub mod prefixes;
pub mod triggers;
pub mod wildcards;

use std::any::Any;
use std::rc::Rc;

use super::ast::{Expr, Expression, Statement, Stmt};
use super::error::CompileError;
use super::registry::Registry;
use super::source_map::SourceMap;

/// Signature shared by every lowering pass.
pub type Pass = fn(Vec<Stmt>, &mut Context<'_>) -> Result<Vec<Stmt>, CompileError>;

/// Per-compilation state threaded through the passes.
pub struct Context<'a> {
    pub registry: &'a Registry,
    pub source_map: &'a mut SourceMap,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a Registry, source_map: &'a mut SourceMap) -> Self {
        Self {
            registry,
            source_map,
        }
    }

    /// Semantic error pinned to `node`.
    pub fn error<T: Any>(&self, node: &Rc<T>, message: impl Into<String>) -> CompileError {
        CompileError::semantic(message, self.source_map.location_of(node))
    }

    /// Allocate a node synthesized from `origin`.
    pub fn derive<T: Any, U: Any>(&mut self, value: T, origin: &Rc<U>) -> Rc<T> {
        let node = Rc::new(value);
        self.source_map.derive(&node, origin);
        node
    }
}

fn same_option(a: Option<&Expr>, b: Option<&Expr>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

/// Apply `f` to every element; `None` when every result is the input node.
pub fn map_all<'a, F>(
    exprs: &[Expr],
    ctx: &mut Context<'a>,
    f: &mut F,
) -> Result<Option<Vec<Expr>>, CompileError>
where
    F: FnMut(&Expr, &mut Context<'a>) -> Result<Expr, CompileError>,
{
    let mut changed = false;
    let mut out = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let new = f(expr, ctx)?;
        changed |= !Rc::ptr_eq(&new, expr);
        out.push(new);
    }
    Ok(changed.then_some(out))
}

/// Rebuild `expr` with `f` applied to its direct children. Returns `expr`
/// itself when no child changed.
pub fn map_children<'a, F>(
    expr: &Expr,
    ctx: &mut Context<'a>,
    f: &mut F,
) -> Result<Expr, CompileError>
where
    F: FnMut(&Expr, &mut Context<'a>) -> Result<Expr, CompileError>,
{
    match &**expr {
        Expression::Subscript { base, key } => {
            let new_key = f(key, ctx)?;
            if Rc::ptr_eq(&new_key, key) {
                return Ok(Rc::clone(expr));
            }
            Ok(ctx.derive(
                Expression::Subscript {
                    base: Rc::clone(base),
                    key: new_key,
                },
                expr,
            ))
        }
        Expression::List { values, fold } => match map_all(values, ctx, f)? {
            None => Ok(Rc::clone(expr)),
            Some(values) => Ok(ctx.derive(Expression::List { values, fold: *fold }, expr)),
        },
        Expression::Compound { operator, args } => match map_all(args, ctx, f)? {
            None => Ok(Rc::clone(expr)),
            Some(args) => Ok(ctx.derive(
                Expression::Compound {
                    operator: *operator,
                    args,
                },
                expr,
            )),
        },
        _ => Ok(Rc::clone(expr)),
    }
}

/// Assignment with the given parts; `stmt` itself when nothing changed.
pub fn with_parts(
    ctx: &mut Context<'_>,
    stmt: &Stmt,
    setting: Expr,
    value: Expr,
    condition: Option<Expr>,
) -> Stmt {
    if let Statement::SettingAssignment {
        setting: old_setting,
        value: old_value,
        condition: old_condition,
    } = &**stmt
    {
        if Rc::ptr_eq(old_setting, &setting)
            && Rc::ptr_eq(old_value, &value)
            && same_option(old_condition.as_ref(), condition.as_ref())
        {
            return Rc::clone(stmt);
        }
    }
    ctx.derive(
        Statement::SettingAssignment {
            setting,
            value,
            condition,
        },
        stmt,
    )
}

/// Apply `target` to assignment targets and `expr` to every value and
/// condition, block conditions included. Other statements pass through.
pub fn map_statements<'a, T, E>(
    stmts: Vec<Stmt>,
    ctx: &mut Context<'a>,
    target: &mut T,
    expr: &mut E,
) -> Result<Vec<Stmt>, CompileError>
where
    T: FnMut(&Expr, &mut Context<'a>) -> Result<Expr, CompileError>,
    E: FnMut(&Expr, &mut Context<'a>) -> Result<Expr, CompileError>,
{
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in &stmts {
        let lowered = match &**stmt {
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            } => {
                let setting = target(setting, ctx)?;
                let value = expr(value, ctx)?;
                let condition = match condition {
                    Some(c) => Some(expr(c, ctx)?),
                    None => None,
                };
                with_parts(ctx, stmt, setting, value, condition)
            }
            Statement::ConditionPush { condition } => {
                let new = expr(condition, ctx)?;
                if Rc::ptr_eq(&new, condition) {
                    Rc::clone(stmt)
                } else {
                    ctx.derive(Statement::ConditionPush { condition: new }, stmt)
                }
            }
            _ => Rc::clone(stmt),
        };
        out.push(lowered);
    }
    Ok(out)
}

/// Leaves targets alone.
pub fn unchanged(expr: &Expr, _ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    Ok(Rc::clone(expr))
}

// ── Stage invariants ──────────────────────────────────────────────

/// Whether `pred` holds anywhere in `expr`. Subscript keys are only visited
/// when `keys` is set.
fn any_node(expr: &Expression, keys: bool, pred: &dyn Fn(&Expression) -> bool) -> bool {
    if pred(expr) {
        return true;
    }
    match expr {
        Expression::Subscript { key, .. } => keys && any_node(key, keys, pred),
        Expression::List { values, .. } => values.iter().any(|v| any_node(v, keys, pred)),
        Expression::Compound { args, .. } => args.iter().any(|a| any_node(a, keys, pred)),
        _ => false,
    }
}

/// Whether `pred` holds in any value or condition (and optionally target).
fn any_expression(
    stmts: &[Stmt],
    targets: bool,
    keys: bool,
    pred: &dyn Fn(&Expression) -> bool,
) -> bool {
    stmts.iter().any(|stmt| match &**stmt {
        Statement::SettingAssignment {
            setting,
            value,
            condition,
        } => {
            (targets && any_node(setting, true, pred))
                || any_node(value, keys, pred)
                || condition.as_ref().is_some_and(|c| any_node(c, keys, pred))
        }
        Statement::ConditionPush { condition } => any_node(condition, keys, pred),
        _ => false,
    })
}

/// Panic when a construct that `pass` eliminates is still present.
pub fn assert_stage(pass: &str, stmts: &[Stmt]) {
    let violation = match pass {
        "macros" => stmts
            .iter()
            .any(|s| matches!(**s, Statement::MacroDefinition { .. } | Statement::MacroUse { .. }))
            .then_some("macro statement"),
        "wildcards" => any_expression(stmts, true, true, &|e| matches!(e, Expression::Wildcard))
            .then_some("wildcard"),
        "folds" => any_expression(stmts, true, true, &|e| matches!(e, Expression::List { .. }))
            .then_some("list"),
        "placeholders" => {
            any_expression(stmts, true, true, &|e| matches!(e, Expression::Placeholder))
                .then_some("placeholder")
        }
        "aliases" => any_expression(stmts, false, false, &|e| {
            matches!(e, Expression::Identifier(_))
        })
        .then_some("bare identifier"),
        "condition_blocks" => stmts
            .iter()
            .any(|s| matches!(**s, Statement::ConditionPush { .. } | Statement::ConditionPop))
            .then_some("condition block marker"),
        "triggers" => stmts
            .iter()
            .any(|s| matches!(&**s, Statement::Trigger { actions, .. } if actions.len() != 1))
            .then_some("multi-action trigger"),
        _ => None,
    };
    if let Some(what) = violation {
        panic!("{what} survived the {pass} pass");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::dsl::parser::parse;

    /// Parse `source` and run `passes` in order over it.
    pub fn lower(
        source: &str,
        passes: &[Pass],
        registry: &Registry,
        map: &mut SourceMap,
    ) -> Result<Vec<Stmt>, CompileError> {
        let (mut stmts, errors) = parse(source, map);
        assert!(errors.is_empty(), "syntax errors: {errors:?}");
        let mut ctx = Context::new(registry, map);
        for pass in passes {
            stmts = pass(stmts, &mut ctx)?;
        }
        Ok(stmts)
    }

    pub fn value_of(stmt: &Statement) -> &Expr {
        match stmt {
            Statement::SettingAssignment { value, .. } => value,
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    pub fn condition_of(stmt: &Statement) -> &Expr {
        match stmt {
            Statement::SettingAssignment {
                condition: Some(condition),
                ..
            } => condition,
            Statement::ConditionPush { condition } => condition,
            other => panic!("expected a condition, got {other:?}"),
        }
    }

    pub fn target_of(stmt: &Statement) -> &Expr {
        match stmt {
            Statement::SettingAssignment { setting, .. } => setting,
            other => panic!("expected assignment, got {other:?}"),
        }
    }
}
