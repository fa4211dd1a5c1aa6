//! Alias resolution.
//!
//! Bare identifiers become `Other[<alias target>]` through the "other
//! expressions" table. Subscript keys of expression categories are
//! canonicalized with the category's key alias and checked against its
//! allowed values.

use std::rc::Rc;

use super::{map_children, map_statements, unchanged, Context};
use crate::dsl::ast::{Expr, Expression, Ident, Identifier, Stmt};
use crate::dsl::error::CompileError;
use crate::dsl::registry::{is_setting_base, EVAL, OTHER};

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    map_statements(stmts, ctx, &mut unchanged, &mut resolve)
}

fn resolve(expr: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    match &**expr {
        Expression::Identifier(name) => {
            let Some(other) = ctx.registry.other_expression(&name.value) else {
                return Err(ctx.error(expr, format!("Unexpected identifier '{}'", name.value)));
            };
            let alias_for = other.alias_for.clone();
            let base = ctx.derive(Identifier::new(OTHER), name);
            let key_ident = ctx.derive(Identifier::new(alias_for), name);
            let key = ctx.derive(Expression::Identifier(key_ident), expr);
            Ok(ctx.derive(Expression::Subscript { base, key }, expr))
        }
        Expression::Subscript { base, key } => resolve_subscript(expr, base, key, ctx),
        _ => map_children(expr, ctx, &mut resolve),
    }
}

fn resolve_subscript(
    expr: &Expr,
    base: &Ident,
    key: &Expr,
    ctx: &mut Context<'_>,
) -> Result<Expr, CompileError> {
    let registry = ctx.registry;
    // Setting keys are resolved with the prefixes.
    if base.value == EVAL || is_setting_base(&base.value) || registry.prefix(&base.value).is_some() {
        return Ok(Rc::clone(expr));
    }
    let Some(def) = registry.expression(&base.value) else {
        return Err(ctx.error(base, "Unknown identifier"));
    };
    let Some(name) = key.as_identifier() else {
        return Err(ctx.error(key, "Identifier expected"));
    };

    let canonical = if base.value == OTHER {
        match registry.other_expression(name) {
            Some(other) => other.alias_for.clone(),
            None if registry.other_alias_target(name).is_some() => name.to_string(),
            None => {
                return Err(ctx.error(
                    key,
                    format!("'{name}' is not a valid {}", def.value_description),
                ))
            }
        }
    } else {
        let canonical = match &def.alias {
            Some(alias) => alias.apply(name),
            None => name.to_string(),
        };
        if let Some(allowed) = &def.allowed_values {
            if !allowed.contains(&canonical) {
                return Err(ctx.error(
                    key,
                    format!("'{name}' is not a valid {}", def.value_description),
                ));
            }
        }
        canonical
    };

    if canonical == name {
        return Ok(Rc::clone(expr));
    }
    let Expression::Identifier(old) = &**key else {
        unreachable!("key checked to be an identifier");
    };
    let ident = ctx.derive(Identifier::new(canonical), old);
    let new_key = ctx.derive(Expression::Identifier(ident), key);
    Ok(ctx.derive(
        Expression::Subscript {
            base: Rc::clone(base),
            key: new_key,
        },
        expr,
    ))
}
