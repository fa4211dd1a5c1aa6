use std::fmt;

use super::ast::*;
use super::error::CompileError;
use super::passes::Context;
use super::registry::{is_setting_base, ValueType, EVAL, OTHER};

/// Static type of an expression. `Unknown` (eval text) is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    String,
    Number,
    Boolean,
    Unknown,
}

impl From<ValueType> for Ty {
    fn from(ty: ValueType) -> Self {
        match ty {
            ValueType::String => Ty::String,
            ValueType::Number => Ty::Number,
            ValueType::Boolean => Ty::Boolean,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Ty::String => "string",
            Ty::Number => "number",
            Ty::Boolean => "boolean",
            Ty::Unknown => "unknown",
        })
    }
}

/// Validation pass: checks every value against its setting's type and every
/// condition against `boolean`. Statements come back untouched.
pub fn run(stmts: Vec<Stmt>, ctx: &mut Context<'_>) -> Result<Vec<Stmt>, CompileError> {
    let checker = TypeChecker { ctx };
    for stmt in &stmts {
        checker.check_stmt(stmt)?;
    }
    Ok(stmts)
}

struct TypeChecker<'c, 'a> {
    ctx: &'c Context<'a>,
}

impl TypeChecker<'_, '_> {
    fn check_stmt(&self, stmt: &Stmt) -> Result<(), CompileError> {
        match &**stmt {
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            } => {
                let Some(name) = setting.as_identifier() else {
                    unreachable!("setting targets are bare ids after prefix resolution");
                };
                let Some(declared) = self.ctx.registry.setting_type(name) else {
                    return Err(self.ctx.error(setting, format!("'{name}' is not a valid setting")));
                };
                let actual = self.check_expr(value)?;
                self.expect(value, actual, declared.into())?;
                if let Some(condition) = condition {
                    let actual = self.check_expr(condition)?;
                    self.expect(condition, actual, Ty::Boolean)?;
                }
                Ok(())
            }
            Statement::ConditionPush { condition } => {
                let actual = self.check_expr(condition)?;
                self.expect(condition, actual, Ty::Boolean)
            }
            Statement::ConditionPop | Statement::Trigger { .. } => Ok(()),
            Statement::MacroDefinition { .. } | Statement::MacroUse { .. } => {
                unreachable!("macros are expanded before validation")
            }
        }
    }

    /// Error pinned to `expr` unless the types agree or either is unknown.
    fn expect(&self, expr: &Expr, actual: Ty, expected: Ty) -> Result<(), CompileError> {
        if actual == Ty::Unknown || expected == Ty::Unknown || actual == expected {
            Ok(())
        } else {
            Err(self.ctx.error(expr, format!("Expected {expected}, got {actual}")))
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<Ty, CompileError> {
        match &**expr {
            Expression::String(_) => Ok(Ty::String),
            Expression::Number(_) => Ok(Ty::Number),
            Expression::Boolean(_) => Ok(Ty::Boolean),
            Expression::Eval(_) => Ok(Ty::Unknown),
            Expression::Subscript { base, key } => self.check_subscript(base, key),
            Expression::Compound { operator, args } => self.check_compound(*operator, args),
            other => unreachable!("{} reached validation", other.variant_name()),
        }
    }

    fn check_subscript(&self, base: &Ident, key: &Expr) -> Result<Ty, CompileError> {
        let registry = self.ctx.registry;
        if base.value == EVAL {
            return Ok(Ty::Unknown);
        }
        let Some(name) = key.as_identifier() else {
            return Err(self.ctx.error(key, "Identifier expected"));
        };

        if is_setting_base(&base.value) {
            return registry
                .setting_type(name)
                .map(Ty::from)
                .ok_or_else(|| self.ctx.error(key, format!("'{name}' is not a valid setting")));
        }

        let Some(def) = registry.expression(&base.value) else {
            return Err(self.ctx.error(base, "Unknown identifier"));
        };
        if base.value == OTHER {
            return registry
                .other_alias_target(name)
                .or_else(|| registry.other_expression(name))
                .map(|o| o.ty.into())
                .ok_or_else(|| {
                    self.ctx.error(key, format!("'{name}' is not a valid {}", def.value_description))
                });
        }
        if let Some(allowed) = &def.allowed_values {
            if !allowed.iter().any(|v| v == name) {
                return Err(self.ctx.error(
                    key,
                    format!("'{name}' is not a valid {}", def.value_description),
                ));
            }
        }
        Ok(def.ty.map_or(Ty::Unknown, Ty::from))
    }

    fn check_compound(&self, operator: Operator, args: &[Expr]) -> Result<Ty, CompileError> {
        let types = args
            .iter()
            .map(|arg| self.check_expr(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let operands = |expected: Ty| -> Result<(), CompileError> {
            for (arg, ty) in args.iter().zip(&types) {
                self.expect(arg, *ty, expected)?;
            }
            Ok(())
        };

        match operator {
            Operator::Not | Operator::And | Operator::Or => {
                operands(Ty::Boolean)?;
                Ok(Ty::Boolean)
            }
            Operator::Eq | Operator::Ne => {
                if let ([_, right], [left_ty, right_ty]) = (args, types.as_slice()) {
                    if *left_ty != Ty::Unknown {
                        self.expect(right, *right_ty, *left_ty)?;
                    }
                }
                Ok(Ty::Boolean)
            }
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
                operands(Ty::Number)?;
                Ok(Ty::Boolean)
            }
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div => {
                operands(Ty::Number)?;
                Ok(Ty::Number)
            }
        }
    }
}
