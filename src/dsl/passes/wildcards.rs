//! `Prefix[*]` → `Prefix[A, B, ...]` over the prefix's allowed suffixes.

use std::rc::Rc;

use super::{map_children, map_statements, Context};
use crate::dsl::ast::{Expr, Expression, Ident, Identifier, Stmt};
use crate::dsl::error::CompileError;

const NOT_A_PREFIX: &str = "Wildcards are only supported for setting prefixes";

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    map_statements(stmts, ctx, &mut expand, &mut expand)
}

fn expand(expr: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    match &**expr {
        Expression::Subscript { base, key } => {
            let new_key = expand_key(base, key, ctx)?;
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
        Expression::Wildcard => Err(ctx.error(expr, NOT_A_PREFIX)),
        _ => map_children(expr, ctx, &mut expand),
    }
}

fn expand_key(base: &Ident, key: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    match &**key {
        Expression::Wildcard => {
            let values = suffixes(base, key, ctx)?;
            Ok(ctx.derive(Expression::List { values, fold: None }, key))
        }
        Expression::List { values, fold } => {
            let mut changed = false;
            let mut out = Vec::with_capacity(values.len());
            for value in values {
                if matches!(**value, Expression::Wildcard) {
                    out.extend(suffixes(base, value, ctx)?);
                    changed = true;
                } else {
                    let new = expand(value, ctx)?;
                    changed |= !Rc::ptr_eq(&new, value);
                    out.push(new);
                }
            }
            if !changed {
                return Ok(Rc::clone(key));
            }
            Ok(ctx.derive(
                Expression::List {
                    values: out,
                    fold: *fold,
                },
                key,
            ))
        }
        _ => expand(key, ctx),
    }
}

/// One identifier per allowed suffix, each derived from the wildcard.
fn suffixes(base: &Ident, wildcard: &Expr, ctx: &mut Context<'_>) -> Result<Vec<Expr>, CompileError> {
    let Some(prefix) = ctx.registry.prefix(&base.value) else {
        return Err(ctx.error(wildcard, NOT_A_PREFIX));
    };
    let names = prefix.allowed_suffixes.clone();
    Ok(names
        .into_iter()
        .map(|name| {
            let ident = ctx.derive(Identifier::new(name), wildcard);
            ctx.derive(Expression::Identifier(ident), wildcard)
        })
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{condition_of, lower, target_of};
    use super::*;
    use crate::dsl::ast::FoldOp;
    use crate::dsl::registry::Registry;
    use crate::dsl::source_map::SourceMap;

    fn run_wildcards(source: &str) -> Result<Vec<Stmt>, CompileError> {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        lower(source, &[run], &registry, &mut map)
    }

    fn key_names(expr: &Expression) -> (Vec<String>, Option<FoldOp>) {
        let Expression::Subscript { key, .. } = expr else { panic!("expected subscript") };
        let Expression::List { values, fold } = &**key else { panic!("expected list") };
        let names = values
            .iter()
            .map(|v| v.as_identifier().unwrap().to_string())
            .collect();
        (names, *fold)
    }

    #[test]
    fn wildcard_target_expands_to_all_suffixes() {
        let stmts = run_wildcards("SmelterFuelPriority[*] = 1").unwrap();
        let (names, fold) = key_names(target_of(&stmts[0]));
        assert_eq!(names, vec!["Wood", "Coal", "Oil", "Inferno"]);
        assert_eq!(fold, None);
    }

    #[test]
    fn wildcard_inside_tagged_list_keeps_the_tag() {
        let stmts = run_wildcards("autoBuild = ON if SmelterFuelPriority[* and] > 1").unwrap();
        let Expression::Compound { args, .. } = &**condition_of(&stmts[0]) else { panic!() };
        let (names, fold) = key_names(&args[0]);
        assert_eq!(names.len(), 4);
        assert_eq!(fold, Some(FoldOp::And));
    }

    #[test]
    fn wildcard_on_non_prefix_is_rejected() {
        let err = run_wildcards("autoBuild = ON if ResourceDemanded.*").unwrap_err();
        assert_eq!(err.message, NOT_A_PREFIX);
        let loc = err.location.unwrap();
        assert_eq!((loc.start.column, loc.stop.column), (36, 37));
    }

    #[test]
    fn no_wildcard_is_identity() {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        let (stmts, _) = crate::dsl::parser::parse("Sell[Coal, Iron] = ON", &mut map);
        let mut ctx = Context::new(&registry, &mut map);
        let out = run(stmts.clone(), &mut ctx).unwrap();
        assert!(Rc::ptr_eq(&stmts[0], &out[0]));
    }
}
