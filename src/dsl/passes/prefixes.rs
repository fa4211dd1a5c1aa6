//! Setting prefix resolution: `Sell[Coal]` → `sellCoal`.
//!
//! Targets become bare setting ids. In values and conditions a prefix
//! subscript reads the setting's current value, so it becomes
//! `SettingCurrent[sellCoal]`.

use std::rc::Rc;

use super::{map_children, map_statements, Context};
use crate::dsl::ast::{Expr, Expression, Ident, Identifier, Stmt};
use crate::dsl::error::CompileError;
use crate::dsl::registry::{is_setting_base, SETTING_CURRENT};

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    map_statements(stmts, ctx, &mut resolve_target, &mut resolve)
}

fn not_a_setting(name: &str) -> String {
    format!("'{name}' is not a valid setting")
}

fn resolve_target(setting: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    match &**setting {
        Expression::Identifier(name) => {
            if ctx.registry.setting_type(&name.value).is_none() {
                return Err(ctx.error(setting, not_a_setting(&name.value)));
            }
            Ok(Rc::clone(setting))
        }
        Expression::Subscript { base, key } => {
            let id = setting_id(base, key, ctx)?;
            Ok(ctx.derive(Expression::Identifier(id), setting))
        }
        _ => Err(ctx.error(setting, "Identifier expected")),
    }
}

/// `prefix + suffix`, validating both halves.
fn setting_id(base: &Ident, key: &Expr, ctx: &mut Context<'_>) -> Result<Ident, CompileError> {
    let registry = ctx.registry;
    let Some(prefix) = registry.prefix(&base.value) else {
        return Err(ctx.error(base, format!("'{}' is not a valid setting prefix", base.value)));
    };
    let Some(suffix) = key.as_identifier() else {
        return Err(ctx.error(key, "Identifier expected"));
    };
    if !prefix.allowed_suffixes.iter().any(|s| s == suffix) {
        return Err(ctx.error(
            key,
            format!(
                "'{suffix}' is not a valid {} for {}",
                prefix.value_description, base.value
            ),
        ));
    }
    Ok(ctx.derive(Identifier::new(format!("{}{suffix}", prefix.prefix)), key))
}

fn resolve(expr: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
    let Expression::Subscript { base, key } = &**expr else {
        return map_children(expr, ctx, &mut resolve);
    };

    if ctx.registry.prefix(&base.value).is_some() {
        let id = setting_id(base, key, ctx)?;
        let base = ctx.derive(Identifier::new(SETTING_CURRENT), base);
        let key = ctx.derive(Expression::Identifier(id), key);
        return Ok(ctx.derive(Expression::Subscript { base, key }, expr));
    }

    if is_setting_base(&base.value) {
        return match &**key {
            Expression::Identifier(name) => {
                if ctx.registry.setting_type(&name.value).is_none() {
                    return Err(ctx.error(key, not_a_setting(&name.value)));
                }
                Ok(Rc::clone(expr))
            }
            Expression::Subscript {
                base: inner_base,
                key: inner_key,
            } => {
                let id = setting_id(inner_base, inner_key, ctx)?;
                let key = ctx.derive(Expression::Identifier(id), key);
                Ok(ctx.derive(
                    Expression::Subscript {
                        base: Rc::clone(base),
                        key,
                    },
                    expr,
                ))
            }
            _ => Err(ctx.error(key, "Identifier expected")),
        };
    }

    if key.as_identifier().is_none() {
        return Err(ctx.error(key, "Identifier expected"));
    }
    Ok(Rc::clone(expr))
}
