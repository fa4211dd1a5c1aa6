//! List resolution.
//!
//! A list key under a boolean-typed base folds into a left-associative
//! `and`/`or` chain. Under any other base it becomes a list of per-element
//! subscripts, which an enclosing operator distributes over (and folds if
//! the operator yields a boolean). Setting targets with a list key unroll
//! into one assignment per element.

use std::rc::Rc;

use super::{map_all, with_parts, Context};
use crate::dsl::ast::{Expr, Expression, FoldOp, Ident, Operator, Statement, Stmt};
use crate::dsl::error::CompileError;
use crate::dsl::registry::{is_setting_base, ValueType, OTHER};

const ONE_FOLD: &str = "Only one fold subexpression is allowed";

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match &*stmt {
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            } => {
                let value = resolve_root(value, ctx)?;
                let condition = match condition {
                    Some(c) => Some(resolve_root(c, ctx)?),
                    None => None,
                };
                for target in unroll_target(setting, ctx)? {
                    out.push(with_parts(
                        ctx,
                        &stmt,
                        target,
                        Rc::clone(&value),
                        condition.clone(),
                    ));
                }
            }
            Statement::ConditionPush { condition } => {
                let new = resolve_root(condition, ctx)?;
                if Rc::ptr_eq(&new, condition) {
                    out.push(Rc::clone(&stmt));
                } else {
                    out.push(ctx.derive(Statement::ConditionPush { condition: new }, &stmt));
                }
            }
            _ => out.push(stmt),
        }
    }
    Ok(out)
}

/// `Prefix[A, B] = v` → one target per element. Targets never fold.
fn unroll_target(setting: &Expr, ctx: &mut Context<'_>) -> Result<Vec<Expr>, CompileError> {
    let Expression::Subscript { base, key } = &**setting else {
        return Ok(vec![Rc::clone(setting)]);
    };
    let Expression::List { values, .. } = &**key else {
        return Ok(vec![Rc::clone(setting)]);
    };
    let mut targets = Vec::with_capacity(values.len());
    for value in values {
        if matches!(**value, Expression::List { .. }) {
            return Err(ctx.error(value, ONE_FOLD));
        }
        targets.push(ctx.derive(
            Expression::Subscript {
                base: Rc::clone(base),
                key: Rc::clone(value),
            },
            value,
        ));
    }
    Ok(targets)
}

/// A value or condition; no list may be left at the root.
fn resolve_root(expr: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    let resolved = resolve(expr, ctx)?;
    if matches!(*resolved, Expression::List { .. }) {
        return Err(ctx.error(&resolved, "Lists are only allowed as subscript keys"));
    }
    Ok(resolved)
}

fn resolve(expr: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    match &**expr {
        Expression::Subscript { base, key } => {
            let new_key = resolve(key, ctx)?;
            if let Expression::List { values, fold } = &*new_key {
                return expand_subscript(expr, base, &new_key, values, *fold, ctx);
            }
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
        Expression::List { values, fold } => {
            let resolved = map_all(values, ctx, &mut resolve)?;
            let elements = resolved.as_deref().unwrap_or(values);
            if let Some(nested) = elements
                .iter()
                .find(|e| matches!(***e, Expression::List { .. }))
            {
                return Err(ctx.error(nested, ONE_FOLD));
            }
            match resolved {
                None => Ok(Rc::clone(expr)),
                Some(values) => Ok(ctx.derive(Expression::List { values, fold: *fold }, expr)),
            }
        }
        Expression::Compound { operator, args } => {
            let resolved = map_all(args, ctx, &mut resolve)?;
            let args_now = resolved.clone().unwrap_or_else(|| args.clone());
            let mut lists = args_now
                .iter()
                .enumerate()
                .filter(|(_, a)| matches!(***a, Expression::List { .. }));
            let Some((index, list)) = lists.next() else {
                return Ok(match resolved {
                    None => Rc::clone(expr),
                    Some(args) => ctx.derive(
                        Expression::Compound {
                            operator: *operator,
                            args,
                        },
                        expr,
                    ),
                });
            };
            if let Some((_, second)) = lists.next() {
                return Err(ctx.error(second, ONE_FOLD));
            }
            let list = Rc::clone(list);
            distribute(expr, *operator, &args_now, index, &list, ctx)
        }
        _ => Ok(Rc::clone(expr)),
    }
}

/// `base[list]` with already-resolved list elements.
fn expand_subscript(
    subscript: &Expr,
    base: &Ident,
    list: &Expr,
    values: &[Expr],
    fold: Option<FoldOp>,
    ctx: &mut Context<'_>,
) -> Result<Expr, CompileError> {
    let ty = base_type(base, values, ctx)?;
    let subscripts: Vec<Expr> = values
        .iter()
        .map(|value| {
            ctx.derive(
                Expression::Subscript {
                    base: Rc::clone(base),
                    key: Rc::clone(value),
                },
                value,
            )
        })
        .collect();

    if ty == Some(ValueType::Boolean) {
        fold_list(subscripts, fold, list, ctx)
    } else {
        Ok(ctx.derive(
            Expression::List {
                values: subscripts,
                fold,
            },
            subscript,
        ))
    }
}

/// `op(a, [x, y])` → `[op(a, x), op(a, y)]`, folded when `op` is boolean.
fn distribute(
    expr: &Expr,
    operator: Operator,
    args: &[Expr],
    index: usize,
    list: &Expr,
    ctx: &mut Context<'_>,
) -> Result<Expr, CompileError> {
    let Expression::List { values, fold } = &**list else {
        unreachable!("distribute called without a list operand");
    };
    let results: Vec<Expr> = values
        .iter()
        .map(|element| {
            let mut new_args = args.to_vec();
            new_args[index] = Rc::clone(element);
            ctx.derive(
                Expression::Compound {
                    operator,
                    args: new_args,
                },
                element,
            )
        })
        .collect();

    if operator.produces_boolean() {
        fold_list(results, *fold, list, ctx)
    } else {
        Ok(ctx.derive(
            Expression::List {
                values: results,
                fold: *fold,
            },
            expr,
        ))
    }
}

/// Left-associative `and`/`or` chain: `[a, b, c]` → `(a op b) op c`.
fn fold_list(
    values: Vec<Expr>,
    fold: Option<FoldOp>,
    list: &Expr,
    ctx: &mut Context<'_>,
) -> Result<Expr, CompileError> {
    let Some(fold) = fold else {
        return Err(ctx.error(
            list,
            "Ambiguous fold expression: use 'and' or 'or' instead of the last comma",
        ));
    };
    let mut values = values.into_iter();
    let Some(mut acc) = values.next() else {
        return Err(ctx.error(list, "Empty list"));
    };
    for value in values {
        acc = ctx.derive(
            Expression::Compound {
                operator: fold.operator(),
                args: vec![acc, value],
            },
            list,
        );
    }
    Ok(acc)
}

/// Type of `base[...]` for folding purposes. `None` when the base does not
/// determine one (never folds).
fn base_type(
    base: &Ident,
    values: &[Expr],
    ctx: &Context<'_>,
) -> Result<Option<ValueType>, CompileError> {
    let registry = ctx.registry;
    if let Some(ty) = registry.expression(&base.value).and_then(|e| e.ty) {
        return Ok(Some(ty));
    }
    if let Some(prefix) = registry.prefix(&base.value) {
        return Ok(Some(prefix.ty));
    }

    let setting_base = is_setting_base(&base.value);
    if !setting_base && base.value != OTHER {
        return Ok(None);
    }
    let element_type = |e: &Expression| -> Option<ValueType> {
        if setting_base {
            match e {
                Expression::Identifier(name) => registry.setting_type(&name.value),
                Expression::Subscript { base, .. } => registry.prefix(&base.value).map(|p| p.ty),
                _ => None,
            }
        } else {
            let name = e.as_identifier()?;
            registry
                .other_expression(name)
                .or_else(|| registry.other_alias_target(name))
                .map(|o| o.ty)
        }
    };

    let mut shared: Option<ValueType> = None;
    for value in values {
        let Some(ty) = element_type(value) else {
            if setting_base {
                return Err(ctx.error(value, "Invalid setting"));
            }
            // Unknown "Other" keys are reported by alias resolution.
            continue;
        };
        match shared {
            Some(existing) if existing != ty => {
                return Err(ctx.error(
                    value,
                    "Only settings of the same type are allowed to be in the same list",
                ));
            }
            _ => shared = Some(ty),
        }
    }
    Ok(shared)
}
