//! Trigger-chain normalization.
//!
//! A trigger with several actions becomes one trigger per action. The first
//! keeps the real condition; each later action waits on the synthetic
//! `chain` condition, i.e. the completion of the action before it.

use std::rc::Rc;

use super::Context;
use crate::dsl::ast::{Expression, Identifier, Statement, Stmt, TriggerArg, TriggerArgument};
use crate::dsl::error::CompileError;
use crate::dsl::registry::{TriggerVocab, CHAIN};

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        let Statement::Trigger { condition, actions } = &*stmt else {
            out.push(stmt);
            continue;
        };

        let registry = ctx.registry;
        let normalized = if is_chain_condition(condition) {
            Rc::clone(condition)
        } else {
            let Some(vocab) = registry.trigger_condition(&condition.kind.value) else {
                return Err(ctx.error(
                    &condition.kind,
                    format!("Unknown trigger condition '{}'", condition.kind.value),
                ));
            };
            normalize(condition, vocab, ctx)?
        };

        for (index, action) in actions.iter().enumerate() {
            let Some(vocab) = registry.trigger_action(&action.kind.value) else {
                return Err(ctx.error(
                    &action.kind,
                    format!("Unknown trigger action '{}'", action.kind.value),
                ));
            };
            let action_normalized = normalize(action, vocab, ctx)?;
            let condition = if index == 0 {
                Rc::clone(&normalized)
            } else {
                chain_condition(action, ctx)
            };

            let same = actions.len() == 1
                && Rc::ptr_eq(&condition, &normalized)
                && Rc::ptr_eq(&normalized, condition_of(&stmt))
                && Rc::ptr_eq(&action_normalized, action);
            if same {
                out.push(Rc::clone(&stmt));
            } else {
                out.push(ctx.derive(
                    Statement::Trigger {
                        condition,
                        actions: vec![action_normalized],
                    },
                    &stmt,
                ));
            }
        }
    }
    Ok(out)
}

/// Only the synthetic chain argument is accepted as `chain`; anything else
/// spelled that way goes through the vocabulary and is rejected there.
fn is_chain_condition(arg: &TriggerArgument) -> bool {
    arg.kind.value == CHAIN
        && arg.id.value.is_empty()
        && matches!(arg.count.as_deref(), Some(Expression::Number(n)) if *n == 0.0)
}

fn condition_of(stmt: &Statement) -> &TriggerArg {
    match stmt {
        Statement::Trigger { condition, .. } => condition,
        _ => unreachable!("only called on triggers"),
    }
}

/// 2^63; counts are emitted as `i64`.
const COUNT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Canonical type, canonical id and a defaulted integral count.
fn normalize(
    arg: &TriggerArg,
    vocab: &TriggerVocab,
    ctx: &mut Context<'_>,
) -> Result<TriggerArg, CompileError> {
    let Some(id) = vocab.canonical_id(&arg.id.value) else {
        return Err(ctx.error(
            &arg.id,
            format!("Unknown {} '{}'", vocab.value_description, arg.id.value),
        ));
    };

    let count = match &arg.count {
        Some(count) => {
            let Expression::Number(value) = **count else {
                unreachable!("trigger counts are number literals");
            };
            if value.fract() != 0.0 {
                return Err(ctx.error(count, "Expected integer, got float"));
            }
            if value.abs() >= COUNT_LIMIT {
                return Err(ctx.error(count, "Count is out of range"));
            }
            Rc::clone(count)
        }
        None => ctx.derive(Expression::Number(1.0), arg),
    };

    let kind = (arg.kind.value != vocab.ty)
        .then(|| ctx.derive(Identifier::new(vocab.ty.clone()), &arg.kind));
    let id = (arg.id.value != id).then(|| ctx.derive(Identifier::new(id), &arg.id));

    if kind.is_none() && id.is_none() && arg.count.is_some() {
        return Ok(Rc::clone(arg));
    }
    Ok(ctx.derive(
        TriggerArgument {
            kind: kind.unwrap_or_else(|| Rc::clone(&arg.kind)),
            id: id.unwrap_or_else(|| Rc::clone(&arg.id)),
            count: Some(count),
        },
        arg,
    ))
}

/// `chain "" (0)`: fires once the previous action in the chain completes.
fn chain_condition(action: &TriggerArg, ctx: &mut Context<'_>) -> TriggerArg {
    let kind = ctx.derive(Identifier::new(CHAIN), &action.kind);
    let id = ctx.derive(Identifier::new(""), &action.id);
    let count = ctx.derive(Expression::Number(0.0), action);
    ctx.derive(
        TriggerArgument {
            kind,
            id,
            count: Some(count),
        },
        action,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::lower;
    use super::*;
    use crate::dsl::registry::Registry;
    use crate::dsl::source_map::SourceMap;

    fn run_triggers(source: &str) -> Result<Vec<Stmt>, CompileError> {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        lower(source, &[run], &registry, &mut map)
    }

    /// `(type, id, count)` of a trigger argument.
    fn parts(arg: &TriggerArgument) -> (String, String, f64) {
        let Some(Expression::Number(count)) = arg.count.as_deref() else {
            panic!("count not defaulted: {arg:?}");
        };
        (arg.kind.value.clone(), arg.id.value.clone(), *count)
    }

    fn trigger(stmt: &Statement) -> (&TriggerArg, &TriggerArg) {
        let Statement::Trigger { condition, actions } = stmt else { panic!("expected trigger") };
        assert_eq!(actions.len(), 1);
        (condition, &actions[0])
    }

    #[test]
    fn inline_trigger_is_normalized() {
        let stmts = run_triggers("Research tech-club when Built city-windmill").unwrap();
        assert_eq!(stmts.len(), 1);
        let (condition, action) = trigger(&stmts[0]);
        assert_eq!(parts(condition), ("built".into(), "city-windmill".into(), 1.0));
        assert_eq!(parts(action), ("research".into(), "tech-club".into(), 1.0));
    }

    #[test]
    fn block_actions_are_chained() {
        let stmts = run_triggers(
            "when Built city-windmill do\n  Research tech-club\n  Build city-bank (2)\nend",
        )
        .unwrap();
        assert_eq!(stmts.len(), 2);
        let (condition, action) = trigger(&stmts[1]);
        assert_eq!(parts(condition), ("chain".into(), String::new(), 0.0));
        assert_eq!(parts(action), ("build".into(), "city-bank".into(), 2.0));
    }

    #[test]
    fn arpa_ids_are_prefixed() {
        let stmts = run_triggers("Arpa lhc when Researched tech-club").unwrap();
        let (_, action) = trigger(&stmts[0]);
        assert_eq!(parts(action), ("arpa".into(), "arpalhc".into(), 1.0));
    }

    #[test]
    fn vocabulary_errors() {
        let cases = [
            ("Research tech-club when Sold city-windmill", "Unknown trigger condition 'Sold'"),
            ("Demolish city-bank when Built city-windmill", "Unknown trigger action 'Demolish'"),
            ("Research tech-club when Built city-nothing", "Unknown building 'city-nothing'"),
            ("Research tech-club (1.5) when Built city-windmill", "Expected integer, got float"),
            (
                "Research tech-club (99999999999999999999) when Built city-windmill",
                "Count is out of range",
            ),
        ];
        for (source, message) in cases {
            let err = run_triggers(source).unwrap_err();
            assert_eq!(err.message, message, "for {source:?}");
            assert!(err.location.is_some());
        }
    }

    #[test]
    fn written_chain_condition_is_rejected() {
        for source in [
            "Research tech-club when chain foo",
            "Research tech-club when chain foo (2.5)",
            "Research tech-club when chain city-windmill (0)",
        ] {
            let err = run_triggers(source).unwrap_err();
            assert_eq!(err.message, "Unknown trigger condition 'chain'", "for {source:?}");
            let loc = err.location.unwrap();
            assert_eq!((loc.start.column, loc.stop.column), (25, 30), "for {source:?}");
        }
    }

    #[test]
    fn normalization_is_idempotent() {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        let once = lower(
            "when Built city-windmill do Research tech-club; Arpa lhc end",
            &[run],
            &registry,
            &mut map,
        )
        .unwrap();
        let mut ctx = Context::new(&registry, &mut map);
        let twice = run(once.clone(), &mut ctx).unwrap();
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert!(Rc::ptr_eq(a, b));
        }
    }
}
