use serde_json::Value;

use super::ast::{Expr, Expression, Operator, Statement, Stmt, TriggerArgument};
use super::passes::conditions::to_eval_string;
use crate::model::{Document, Override, Trigger};

/// `cmp` of an override whose `arg2` is evaluated for the setting's value.
const EVAL_RETURN: &str = "A?B";

/// Type tag the runtime uses for eval strings.
const EVAL_TYPE: &str = "Eval";

/// Fill a [`Document`] from a fully lowered statement list.
///
/// Every statement must be a single-action trigger or an assignment to a
/// bare setting id whose value is a constant or an eval string.
pub fn compile(stmts: &[Stmt]) -> Document {
    let mut compiler = Compiler::default();
    for stmt in stmts {
        compiler.compile_stmt(stmt);
    }
    compiler.document
}

#[derive(Default)]
struct Compiler {
    document: Document,
}

impl Compiler {
    fn compile_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::SettingAssignment {
                setting,
                value,
                condition,
            } => {
                let Some(name) = setting.as_identifier() else {
                    unreachable!("setting target is not a resolved id");
                };
                self.compile_assignment(name, value, condition.as_ref());
            }
            Statement::Trigger { condition, actions } => {
                let [action] = actions.as_slice() else {
                    unreachable!("trigger chains are split before code generation");
                };
                self.compile_trigger(condition, action);
            }
            other => unreachable!("{other:?} reached code generation"),
        }
    }

    fn compile_assignment(&mut self, name: &str, value: &Expr, condition: Option<&Expr>) {
        let rule = match (condition, &**value) {
            (None, Expression::Eval(text)) => Override {
                type1: "Boolean".into(),
                arg1: Value::Bool(true),
                cmp: EVAL_RETURN.into(),
                type2: EVAL_TYPE.into(),
                arg2: Value::String(text.clone()),
                ret: Value::Null,
            },
            (None, _) => {
                self.document
                    .settings
                    .insert(name.to_string(), constant(value));
                return;
            }
            (Some(condition), Expression::Eval(text)) => Override {
                type1: EVAL_TYPE.into(),
                arg1: Value::String(to_eval_string(condition, false)),
                cmp: EVAL_RETURN.into(),
                type2: EVAL_TYPE.into(),
                arg2: Value::String(text.clone()),
                ret: Value::Null,
            },
            (Some(condition), _) => {
                let ((type1, arg1), cmp, (type2, arg2)) = shape(condition);
                Override {
                    type1,
                    arg1,
                    cmp,
                    type2,
                    arg2,
                    ret: constant(value),
                }
            }
        };
        self.document
            .overrides
            .entry(name.to_string())
            .or_default()
            .push(rule);
    }

    fn compile_trigger(&mut self, condition: &TriggerArgument, action: &TriggerArgument) {
        let seq = self.document.triggers.len();
        self.document.triggers.push(Trigger {
            seq,
            priority: seq,
            requirement_type: condition.kind.value.clone(),
            requirement_id: condition.id.value.clone(),
            requirement_count: count(condition),
            action_type: action.kind.value.clone(),
            action_id: action.id.value.clone(),
            action_count: count(action),
            complete: false,
        });
    }
}

type Operand = (String, Value);

/// Split a condition into `arg1 <cmp> arg2`.
fn shape(condition: &Expr) -> (Operand, String, Operand) {
    match &**condition {
        Expression::Compound {
            operator: Operator::Not,
            args,
        } => match args.as_slice() {
            [inner] => (
                operand(inner),
                Operator::Eq.as_str().into(),
                ("Boolean".into(), Value::Bool(false)),
            ),
            _ => unreachable!("'not' takes one operand"),
        },
        Expression::Compound { operator, args } => {
            let cmp = match operator {
                Operator::And => "AND",
                Operator::Or => "OR",
                op if op.is_comparison() => op.as_str(),
                op => unreachable!("'{op}' condition passed validation"),
            };
            match args.as_slice() {
                [left, right] => (operand(left), cmp.into(), operand(right)),
                _ => unreachable!("'{operator}' takes two operands"),
            }
        }
        _ => (
            operand(condition),
            Operator::Eq.as_str().into(),
            ("Boolean".into(), Value::Bool(true)),
        ),
    }
}

fn operand(expr: &Expr) -> Operand {
    match &**expr {
        Expression::Subscript { base, key } => match key.as_identifier() {
            Some(key) => (base.value.clone(), Value::String(key.to_string())),
            None => unreachable!("subscript key is not an identifier"),
        },
        Expression::Number(_) => ("Number".into(), constant(expr)),
        Expression::Boolean(value) => ("Boolean".into(), Value::Bool(*value)),
        Expression::String(value) => ("String".into(), Value::String(value.clone())),
        Expression::Eval(text) => (EVAL_TYPE.into(), Value::String(text.clone())),
        other => unreachable!("{} operand reached code generation", other.variant_name()),
    }
}

/// JSON form of a constant. Integral numbers are emitted as integers.
fn constant(expr: &Expression) -> Value {
    match expr {
        Expression::String(value) => Value::String(value.clone()),
        Expression::Boolean(value) => Value::Bool(*value),
        Expression::Number(value) => {
            if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
                Value::from(*value as i64)
            } else {
                serde_json::Number::from_f64(*value).map_or(Value::Null, Value::Number)
            }
        }
        other => unreachable!("{} is not a constant", other.variant_name()),
    }
}

fn count(arg: &TriggerArgument) -> i64 {
    match arg.count.as_deref() {
        Some(Expression::Number(value)) => *value as i64,
        _ => unreachable!("trigger counts are defaulted before code generation"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use crate::dsl::compile_source;
    use crate::dsl::registry::Registry;
    use crate::model::Document;

    fn compile_src(src: &str) -> Document {
        compile_source(src, &Registry::builtin()).unwrap()
    }

    fn overrides(doc: &Document, name: &str) -> serde_json::Value {
        serde_json::to_value(&doc.overrides[name]).unwrap()
    }

    #[test]
    fn constant_assignment_is_a_setting() {
        let doc = compile_src("autoBuild = ON\nminimumMoney = 2.5\nprestigeType = \"mad\"");
        assert_eq!(doc.settings["autoBuild"], json!(true));
        assert_eq!(doc.settings["minimumMoney"], json!(2.5));
        assert_eq!(doc.settings["prestigeType"], json!("mad"));
        assert!(doc.overrides.is_empty());
    }

    #[test]
    fn last_assignment_wins() {
        let doc = compile_src("minimumMoney = 1\nminimumMoney = 7");
        assert_eq!(doc.settings.len(), 1);
        assert_eq!(doc.settings["minimumMoney"], json!(7));
    }

    #[test]
    fn comparison_condition() {
        let doc = compile_src("sellCoal = ON if BrokenCars > 1");
        assert!(doc.settings.is_empty());
        assert_eq!(
            overrides(&doc, "sellCoal"),
            json!([{ "type1": "Other", "arg1": "bcar", "cmp": ">", "type2": "Number", "arg2": 1, "ret": true }])
        );
    }

    #[test]
    fn bare_and_negated_conditions() {
        let doc = compile_src("autoBuild = ON if Starving\nautoBuild = OFF if not Starving");
        assert_eq!(
            overrides(&doc, "autoBuild"),
            json!([
                { "type1": "Other", "arg1": "strv", "cmp": "==", "type2": "Boolean", "arg2": true, "ret": true },
                { "type1": "Other", "arg1": "strv", "cmp": "==", "type2": "Boolean", "arg2": false, "ret": false },
            ])
        );
    }

    #[test]
    fn logical_root_collapses_operands() {
        let doc = compile_src("autoJobs = OFF if ResourceQuantity.Food < 10 or Starving");
        assert_eq!(
            overrides(&doc, "autoJobs"),
            json!([{
                "type1": "Eval", "arg1": "_('ResourceQuantity', 'Food') < 10",
                "cmp": "OR",
                "type2": "Other", "arg2": "strv",
                "ret": false,
            }])
        );
    }

    #[test]
    fn eval_values_return_through_arg2() {
        let doc = compile_src(
            "minimumMoney = ResourceStorage.Money / 2\nminimumMoney = {{ 5 }} if Starving",
        );
        assert_eq!(
            overrides(&doc, "minimumMoney"),
            json!([
                { "type1": "Boolean", "arg1": true, "cmp": "A?B", "type2": "Eval", "arg2": "_('ResourceStorage', 'Money') / 2", "ret": null },
                { "type1": "Eval", "arg1": "_('Other', 'strv')", "cmp": "A?B", "type2": "Eval", "arg2": "5", "ret": null },
            ])
        );
    }

    #[test]
    fn overrides_keep_source_order_per_setting() {
        let doc = compile_src("if Starving then\n  autoJobs = OFF\n  autoBuild = OFF\nend\nautoJobs = ON if MadToggle");
        let jobs = &doc.overrides["autoJobs"];
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].ret, json!(false));
        assert_eq!(jobs[1].arg1, json!("madt"));
        assert_eq!(doc.overrides.keys().collect::<Vec<_>>(), vec!["autoJobs", "autoBuild"]);
    }

    #[test]
    fn triggers_are_sequenced() {
        let doc = compile_src(
            "Research tech-club when Built city-windmill\nwhen Researched tech-club do Build city-bank (3); Arpa lhc end",
        );
        let triggers = serde_json::to_value(&doc.triggers).unwrap();
        assert_eq!(
            triggers,
            json!([
                { "seq": 0, "priority": 0, "requirementType": "built", "requirementId": "city-windmill", "requirementCount": 1, "actionType": "research", "actionId": "tech-club", "actionCount": 1, "complete": false },
                { "seq": 1, "priority": 1, "requirementType": "researched", "requirementId": "tech-club", "requirementCount": 1, "actionType": "build", "actionId": "city-bank", "actionCount": 3, "complete": false },
                { "seq": 2, "priority": 2, "requirementType": "chain", "requirementId": "", "requirementCount": 0, "actionType": "arpa", "actionId": "arpalhc", "actionCount": 1, "complete": false },
            ])
        );
    }
}
