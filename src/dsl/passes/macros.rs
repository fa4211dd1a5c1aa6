//! Expression and statement macros.
//!
//! `def Name = expr` expands wherever `Name` appears as a bare identifier in
//! a value or condition; `def Name do ... end` is spliced in by `use Name`.
//! Definitions are collected up front, so a macro may be used before it is
//! defined.

use std::rc::Rc;

use indexmap::IndexMap;

use super::{map_children, map_statements, unchanged, Context};
use crate::dsl::ast::{Expr, Expression, Ident, MacroBody, Statement, Stmt};
use crate::dsl::error::CompileError;

struct Macros {
    definitions: IndexMap<String, MacroBody>,
    /// Names currently being expanded, innermost last.
    active: Vec<String>,
}

pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    let mut definitions = IndexMap::new();
    let mut body = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        match &*stmt {
            Statement::MacroDefinition { name, body: def } => {
                check_name(name, &definitions, ctx)?;
                definitions.insert(name.value.clone(), def.clone());
            }
            _ => body.push(stmt),
        }
    }

    let mut macros = Macros {
        definitions,
        active: Vec::new(),
    };
    macros.expand_statements(body, ctx)
}

fn check_name(
    name: &Ident,
    definitions: &IndexMap<String, MacroBody>,
    ctx: &Context<'_>,
) -> Result<(), CompileError> {
    if definitions.contains_key(&name.value) {
        return Err(ctx.error(name, format!("Macro '{}' is already defined", name.value)));
    }
    if ctx.registry.is_reserved_name(&name.value) {
        return Err(ctx.error(
            name,
            format!("Macro '{}' shadows a built-in identifier", name.value),
        ));
    }
    Ok(())
}

impl Macros {
    fn enter(&mut self, name: &Ident, ctx: &Context<'_>) -> Result<(), CompileError> {
        if self.active.contains(&name.value) {
            return Err(ctx.error(name, format!("Circular use of macro '{}'", name.value)));
        }
        self.active.push(name.value.clone());
        Ok(())
    }

    fn expand_statements(
        &mut self,
        stmts: Vec<Stmt>,
        ctx: &mut Context<'_>,
    ) -> Result<Vec<Stmt>, CompileError> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match &*stmt {
                Statement::MacroUse { name } => {
                    let body = match self.definitions.get(&name.value) {
                        None => {
                            return Err(
                                ctx.error(name, format!("Unknown macro '{}'", name.value))
                            )
                        }
                        Some(MacroBody::Expression(_)) => {
                            return Err(ctx.error(
                                name,
                                format!("'{}' is an expression macro", name.value),
                            ))
                        }
                        Some(MacroBody::Statements(body)) => body.clone(),
                    };
                    self.enter(name, ctx)?;
                    out.extend(self.expand_statements(body, ctx)?);
                    self.active.pop();
                }
                Statement::MacroDefinition { .. } => {
                    unreachable!("macro definitions are rejected outside the top level")
                }
                Statement::SettingAssignment { .. } | Statement::ConditionPush { .. } => {
                    out.extend(map_statements(
                        vec![stmt],
                        ctx,
                        &mut unchanged,
                        &mut |e: &Expr, ctx: &mut Context<'_>| self.expand_expr(e, ctx),
                    )?);
                }
                Statement::ConditionPop | Statement::Trigger { .. } => out.push(stmt),
            }
        }
        Ok(out)
    }

    fn expand_expr(&mut self, expr: &Expr, ctx: &mut Context<'_>) -> Result<Expr, CompileError> {
        match &**expr {
            Expression::Identifier(name) => match self.definitions.get(&name.value) {
                None => Ok(Rc::clone(expr)),
                Some(MacroBody::Statements(_)) => Err(ctx.error(
                    expr,
                    format!("'{}' is a statement macro", name.value),
                )),
                Some(MacroBody::Expression(body)) => {
                    let body = Rc::clone(body);
                    self.enter(name, ctx)?;
                    let expanded = self.expand_expr(&body, ctx)?;
                    self.active.pop();
                    Ok(expanded)
                }
            },
            // Keys name settings and registry entries, never macros.
            Expression::Subscript { .. } => Ok(Rc::clone(expr)),
            _ => map_children(expr, ctx, &mut |e: &Expr, ctx: &mut Context<'_>| {
                self.expand_expr(e, ctx)
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::super::test_support::{condition_of, lower, value_of};
    use super::*;
    use crate::dsl::registry::Registry;
    use crate::dsl::source_map::SourceMap;

    fn run_macros(source: &str) -> Result<Vec<Stmt>, CompileError> {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        lower(source, &[run], &registry, &mut map)
    }

    #[test]
    fn expression_macro_expands_in_conditions() {
        let stmts = run_macros("def Rich = ResourceQuantity.Money > 1000\nautoBuild = ON if Rich").unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&**condition_of(&stmts[0]), Expression::Compound { .. }));
    }

    #[test]
    fn macros_may_be_used_before_definition() {
        let stmts = run_macros("autoBuild = Flag\ndef Flag = ON").unwrap();
        assert_eq!(**value_of(&stmts[0]), Expression::Boolean(true));
    }

    #[test]
    fn statement_macro_is_spliced() {
        let stmts = run_macros(
            "def Setup do\n  autoBuild = ON\n  if Starving then autoJobs = OFF end\nend\nuse Setup\nautoCraft = ON",
        )
        .unwrap();
        assert_eq!(stmts.len(), 5);
        assert!(matches!(&*stmts[1], Statement::ConditionPush { .. }));
    }

    #[test]
    fn nested_macros_expand() {
        let stmts = run_macros("def A = B and ON\ndef B = OFF\nautoBuild = ON if A").unwrap();
        let Expression::Compound { args, .. } = &**condition_of(&stmts[0]) else { panic!() };
        assert_eq!(*args[0], Expression::Boolean(false));
    }

    #[test]
    fn macro_errors() {
        let cases = [
            ("def A = 1\ndef A = 2", "Macro 'A' is already defined"),
            ("def Sell = 1", "Macro 'Sell' shadows a built-in identifier"),
            ("def A = B\ndef B = A\nx = A", "Circular use of macro 'A'"),
            ("use Missing", "Unknown macro 'Missing'"),
            ("def A = 1\nuse A", "'A' is an expression macro"),
            ("def A do\n x = 1\nend\ny = A", "'A' is a statement macro"),
            ("def A do\n use A\nend\nuse A", "Circular use of macro 'A'"),
        ];
        for (source, message) in cases {
            let err = run_macros(source).unwrap_err();
            assert_eq!(err.message, message, "for {source:?}");
        }
    }

    #[test]
    fn errors_point_at_the_name() {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        let err = lower("x = 1\nuse Nope", &[run], &registry, &mut map).unwrap_err();
        let loc = err.location.unwrap();
        assert_eq!((loc.start.line, loc.start.column, loc.stop.column), (2, 5, 9));
    }

    #[test]
    fn without_macros_statements_are_identical() {
        let registry = Registry::builtin();
        let mut map = SourceMap::new();
        let first = lower("autoBuild = ON if Starving", &[run], &registry, &mut map).unwrap();
        let mut ctx = Context::new(&registry, &mut map);
        let second = run(first.clone(), &mut ctx).unwrap();
        assert!(Rc::ptr_eq(&first[0], &second[0]));
    }
}
