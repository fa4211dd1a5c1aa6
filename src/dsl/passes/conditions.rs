//! Lowers whatever the runtime has to evaluate into eval strings.
//!
//! Non-constant values become a single `Eval`. Conditions keep their root
//! operator so the generator can emit a structured override; compound
//! operands below the root are collapsed into `Eval`s.

use std::rc::Rc;

use super::{with_parts, Context};
use crate::dsl::ast::{format_number, Expr, Expression, Operator, Statement, Stmt};
use crate::dsl::error::CompileError;
use crate::dsl::registry::EVAL;

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match &*stmt {
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            } => {
                let value = lower_value(value, ctx);
                let condition = condition.as_ref().map(|c| lower_condition(c, ctx));
                out.push(with_parts(ctx, &stmt, Rc::clone(setting), value, condition));
            }
            _ => out.push(stmt),
        }
    }
    Ok(out)
}

fn inline_eval(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::Subscript { base, key } if base.value == EVAL => key.as_identifier(),
        _ => None,
    }
}

fn lower_value(value: &Expr, ctx: &mut Context<'_>) -> Expr {
    if value.is_constant() || matches!(**value, Expression::Eval(_)) {
        return Rc::clone(value);
    }
    let text = match inline_eval(value) {
        Some(raw) => raw.to_string(),
        None => to_eval_string(value, false),
    };
    ctx.derive(Expression::Eval(text), value)
}

fn lower_condition(condition: &Expr, ctx: &mut Context<'_>) -> Expr {
    if let Some(raw) = inline_eval(condition) {
        return ctx.derive(Expression::Eval(raw.to_string()), condition);
    }
    let Expression::Compound { operator, args } = &**condition else {
        return Rc::clone(condition);
    };

    let mut changed = false;
    let lowered: Vec<Expr> = args
        .iter()
        .map(|arg| {
            let text = match &**arg {
                Expression::Compound { .. } => to_eval_string(arg, false),
                other => match inline_eval(other) {
                    Some(raw) => raw.to_string(),
                    None => return Rc::clone(arg),
                },
            };
            changed = true;
            ctx.derive(Expression::Eval(text), arg)
        })
        .collect();

    if !changed {
        return Rc::clone(condition);
    }
    ctx.derive(
        Expression::Compound {
            operator: *operator,
            args: lowered,
        },
        condition,
    )
}

fn eval_operator(operator: Operator) -> &'static str {
    match operator {
        Operator::And => "&&",
        Operator::Or => "||",
        other => other.as_str(),
    }
}

/// Text form of `expr` for the runtime evaluator. `wrap` parenthesizes a
/// binary expression so it can sit inside another one.
pub fn to_eval_string(expr: &Expression, wrap: bool) -> String {
    match expr {
        Expression::Compound {
            operator: Operator::Not,
            args,
        } => match args.as_slice() {
            [operand] => format!("!{}", to_eval_string(operand, true)),
            _ => unreachable!("'not' takes one operand"),
        },
        Expression::Compound { operator, args } => match args.as_slice() {
            [left, right] => {
                let text = format!(
                    "{} {} {}",
                    to_eval_string(left, true),
                    eval_operator(*operator),
                    to_eval_string(right, true)
                );
                if wrap {
                    format!("({text})")
                } else {
                    text
                }
            }
            _ => unreachable!("'{operator}' takes two operands"),
        },
        Expression::Subscript { base, key } => {
            if let Some(raw) = inline_eval(expr) {
                return raw.to_string();
            }
            match key.as_identifier() {
                Some(key) => format!("_('{}', '{key}')", base.value),
                None => unreachable!("subscript key is not an identifier after prefix resolution"),
            }
        }
        Expression::String(value) => format!("'{value}'"),
        Expression::Number(value) => format_number(*value),
        Expression::Boolean(value) => value.to_string(),
        Expression::Eval(text) => text.clone(),
        other => unreachable!("{} in an eval expression after lowering", other.variant_name()),
    }
}
