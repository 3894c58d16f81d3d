// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `on_input` control-flow interpreter: `use_skill`, `delegate`,
//! `respond`, `if`/`else if`/`else`, and `for_each`.
//!
//! Programs are parsed once (at projection time, from the `on_input`
//! attribute's `Value::List` shape) into a [`Statement`] tree, then walked
//! by [`run`] against an [`OnInputContext`] for every invocation. Walking is
//! always finite: the statement list is fixed at parse time and `for_each`
//! requires a materialized list, so there is no way for a program to loop
//! without bound.

use agentspec_core::Value;
use agentspec_expr::{compile, Env, ExprError, Program};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// One parsed `on_input` statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// `use_skill s(params)` — invoke a skill, binding its result to
    /// `last_output`.
    UseSkill {
        /// The skill (tool) name to invoke.
        skill: String,
        /// Parameter expressions, evaluated against the current scope at
        /// call time.
        params: BTreeMap<String, Program>,
    },
    /// `delegate to a` — invoke another agent with `last_output` (or the
    /// original input if nothing has set it yet).
    Delegate {
        /// The delegate agent's FQN.
        agent: String,
    },
    /// `respond expr` — evaluate `expr`, set `last_output` to its string
    /// form, and terminate the program immediately.
    Respond {
        /// The response expression.
        expr: Program,
    },
    /// `if cond { .. } else if cond { .. } else { .. }`.
    If {
        /// `(condition, body)` pairs, evaluated left to right; the first
        /// whose condition is true has its body executed.
        branches: Vec<(Program, Vec<Statement>)>,
        /// The trailing `else` body, empty if there is none.
        else_branch: Vec<Statement>,
    },
    /// `for_each v in coll { .. }`.
    ForEach {
        /// The loop variable's name, bound in `body`'s scope each iteration.
        var: String,
        /// An expression evaluating to a `Value::List`.
        collection: Program,
        /// The loop body, executed once per element, sequentially.
        body: Vec<Statement>,
    },
}

/// Failure parsing an `on_input` attribute value into a [`Statement`] tree.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    /// The top-level value wasn't a list of statements.
    #[error("on_input must be a list of statements")]
    NotAList,
    /// A statement wasn't a mapping.
    #[error("on_input statement must be a mapping")]
    NotAMapping,
    /// A statement mapping had no (or a non-string) `type` field.
    #[error("on_input statement is missing a string `type` field")]
    MissingType,
    /// A statement mapping was missing a required field.
    #[error("{statement} statement is missing required field {field:?}")]
    MissingField {
        /// The statement kind being parsed.
        statement: &'static str,
        /// The missing field's name.
        field: &'static str,
    },
    /// A statement declared a `type` outside the known vocabulary.
    #[error("unknown on_input statement type {0:?}")]
    UnknownStatement(String),
    /// An expression field failed to compile.
    #[error("failed to compile expression {source:?}: {error}")]
    BadExpr {
        /// The offending expression source.
        source: String,
        /// The underlying parse failure.
        error: ExprError,
    },
}

fn as_map(value: &Value) -> Result<&BTreeMap<String, Value>, ParseError> {
    value.as_map().ok_or(ParseError::NotAMapping)
}

fn str_field<'a>(
    map: &'a BTreeMap<String, Value>,
    statement: &'static str,
    field: &'static str,
) -> Result<&'a str, ParseError> {
    map.get(field)
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField { statement, field })
}

fn compile_expr(src: &str) -> Result<Program, ParseError> {
    compile(src).map_err(|error| ParseError::BadExpr { source: src.to_string(), error })
}

fn compile_expr_field(
    map: &BTreeMap<String, Value>,
    statement: &'static str,
    field: &'static str,
) -> Result<Program, ParseError> {
    compile_expr(str_field(map, statement, field)?)
}

fn parse_statement(value: &Value) -> Result<Statement, ParseError> {
    let map = as_map(value)?;
    let kind = map.get("type").and_then(Value::as_str).ok_or(ParseError::MissingType)?;
    match kind {
        "use_skill" => {
            let skill = str_field(map, "use_skill", "skill")?.to_string();
            let mut params = BTreeMap::new();
            if let Some(raw_params) = map.get("params").and_then(Value::as_map) {
                for (key, v) in raw_params {
                    let src = match v {
                        Value::String(s) => s.clone(),
                        other => agentspec_core::canonical_string(other),
                    };
                    params.insert(key.clone(), compile_expr(&src)?);
                }
            }
            Ok(Statement::UseSkill { skill, params })
        }
        "delegate" => {
            let agent = str_field(map, "delegate", "agent")?.to_string();
            Ok(Statement::Delegate { agent })
        }
        "respond" => {
            let expr = compile_expr_field(map, "respond", "expr")?;
            Ok(Statement::Respond { expr })
        }
        "if" => {
            let raw_branches =
                map.get("branches").and_then(Value::as_list).ok_or(ParseError::MissingField {
                    statement: "if",
                    field: "branches",
                })?;
            let mut branches = Vec::with_capacity(raw_branches.len());
            for branch in raw_branches {
                let branch_map = as_map(branch)?;
                let cond = compile_expr_field(branch_map, "if", "cond")?;
                let body = parse_block(branch_map.get("body"))?;
                branches.push((cond, body));
            }
            let else_branch = parse_block(map.get("else"))?;
            Ok(Statement::If { branches, else_branch })
        }
        "for_each" => {
            let var = str_field(map, "for_each", "var")?.to_string();
            let collection = compile_expr_field(map, "for_each", "in")?;
            let body = parse_block(map.get("body"))?;
            Ok(Statement::ForEach { var, collection, body })
        }
        other => Err(ParseError::UnknownStatement(other.to_string())),
    }
}

fn parse_block(value: Option<&Value>) -> Result<Vec<Statement>, ParseError> {
    match value {
        None => Ok(Vec::new()),
        Some(v) => parse_program(v),
    }
}

/// Parse an `on_input` attribute value into a statement list.
pub fn parse_program(value: &Value) -> Result<Vec<Statement>, ParseError> {
    let items = value.as_list().ok_or(ParseError::NotAList)?;
    items.iter().map(parse_statement).collect()
}

/// Invokes a skill by name with JSON-encoded parameters, returning its
/// string output (or an error description the interpreter feeds back into
/// `on_error` handling, never raised mid-program).
#[async_trait]
pub trait SkillInvoker: Send + Sync {
    /// Call `skill` with `params`, returning its string output.
    async fn invoke_skill(&self, skill: &str, params: serde_json::Value) -> Result<String, String>;
}

/// Invokes another agent by FQN with a string input, returning its final
/// output.
#[async_trait]
pub trait Delegator: Send + Sync {
    /// Run `agent_fqn` against `input`, returning its final output.
    async fn delegate(&self, agent_fqn: &str, input: &str) -> Result<String, String>;
}

/// One executed statement, in execution order, for the interpreter's
/// activity trace.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEntry {
    /// A skill was invoked.
    UseSkill {
        /// The skill name.
        skill: String,
        /// Whether the call succeeded.
        success: bool,
    },
    /// Execution delegated to another agent.
    Delegate {
        /// The delegate agent's FQN.
        agent: String,
        /// Whether the call succeeded.
        success: bool,
    },
    /// A `respond` statement terminated the program.
    Respond,
    /// An `if` branch was taken (`None` means the implicit empty else ran).
    Branch {
        /// Index of the taken branch, or `None` for the `else` body.
        index: Option<usize>,
    },
    /// A `for_each` loop ran for `iterations` elements.
    ForEach {
        /// Number of elements iterated.
        iterations: usize,
    },
}

/// Failure raised by a nested `use_skill`/`delegate` call, or by an
/// expression evaluation failure. The caller's `on_error` policy decides
/// what happens next — the interpreter itself never recovers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OnInputError {
    /// A `use_skill` call failed.
    #[error("skill {skill:?} failed: {reason}")]
    SkillFailed {
        /// The skill name.
        skill: String,
        /// The failure description.
        reason: String,
    },
    /// A `delegate` call failed.
    #[error("delegate to {agent:?} failed: {reason}")]
    DelegateFailed {
        /// The delegate agent's FQN.
        agent: String,
        /// The failure description.
        reason: String,
    },
    /// An expression failed to evaluate.
    #[error("expression evaluation failed: {0}")]
    Expr(#[from] ExprError),
    /// A `for_each` collection expression did not evaluate to a list.
    #[error("for_each collection did not evaluate to a list")]
    NotAList,
}

/// The outcome of running an `on_input` program to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct OnInputOutcome {
    /// The final value of `last_output`.
    pub output: String,
    /// Every statement the interpreter executed, in order.
    pub trace: Vec<ActivityEntry>,
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => agentspec_core::canonical_string(other),
    }
}

fn value_to_json(v: &Value) -> serde_json::Value {
    serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
}

/// Run a parsed `on_input` program.
///
/// `input` seeds `last_output` before the first statement runs, mirroring
/// "delegate to a" falling back to the original input if nothing has set
/// `last_output` yet.
pub async fn run(
    statements: &[Statement],
    input: &str,
    skills: &dyn SkillInvoker,
    delegator: &dyn Delegator,
) -> Result<OnInputOutcome, OnInputError> {
    let mut last_output = input.to_string();
    let mut trace = Vec::new();
    let mut scope: BTreeMap<String, Value> = BTreeMap::new();
    run_block(statements, &mut last_output, &mut scope, &mut trace, skills, delegator).await?;
    Ok(OnInputOutcome { output: last_output, trace })
}

fn build_env(last_output: &str, scope: &BTreeMap<String, Value>) -> Env {
    let mut env = Env::new().with("last_output", Value::String(last_output.to_string()));
    for (k, v) in scope {
        env.set(k.clone(), v.clone());
    }
    env
}

/// Returns `Ok(true)` if a `respond` statement ran and the program should
/// stop, `Ok(false)` to keep going.
async fn run_block(
    statements: &[Statement],
    last_output: &mut String,
    scope: &mut BTreeMap<String, Value>,
    trace: &mut Vec<ActivityEntry>,
    skills: &dyn SkillInvoker,
    delegator: &dyn Delegator,
) -> Result<bool, OnInputError> {
    for statement in statements {
        let stopped = run_statement(statement, last_output, scope, trace, skills, delegator).await?;
        if stopped {
            return Ok(true);
        }
    }
    Ok(false)
}

#[allow(clippy::too_many_lines)]
async fn run_statement(
    statement: &Statement,
    last_output: &mut String,
    scope: &mut BTreeMap<String, Value>,
    trace: &mut Vec<ActivityEntry>,
    skills: &dyn SkillInvoker,
    delegator: &dyn Delegator,
) -> Result<bool, OnInputError> {
    match statement {
        Statement::UseSkill { skill, params } => {
            let env = build_env(last_output, scope);
            let mut resolved = serde_json::Map::new();
            for (key, expr) in params {
                let value = expr.eval(&env)?;
                resolved.insert(key.clone(), value_to_json(&value));
            }
            match skills.invoke_skill(skill, serde_json::Value::Object(resolved)).await {
                Ok(output) => {
                    *last_output = output;
                    trace.push(ActivityEntry::UseSkill { skill: skill.clone(), success: true });
                    Ok(false)
                }
                Err(reason) => {
                    trace.push(ActivityEntry::UseSkill { skill: skill.clone(), success: false });
                    Err(OnInputError::SkillFailed { skill: skill.clone(), reason })
                }
            }
        }
        Statement::Delegate { agent } => match delegator.delegate(agent, last_output).await {
            Ok(output) => {
                *last_output = output;
                trace.push(ActivityEntry::Delegate { agent: agent.clone(), success: true });
                Ok(false)
            }
            Err(reason) => {
                trace.push(ActivityEntry::Delegate { agent: agent.clone(), success: false });
                Err(OnInputError::DelegateFailed { agent: agent.clone(), reason })
            }
        },
        Statement::Respond { expr } => {
            let env = build_env(last_output, scope);
            let value = expr.eval(&env)?;
            *last_output = value_to_string(&value);
            trace.push(ActivityEntry::Respond);
            Ok(true)
        }
        Statement::If { branches, else_branch } => {
            let env = build_env(last_output, scope);
            for (index, (cond, body)) in branches.iter().enumerate() {
                let taken = matches!(cond.eval(&env)?, Value::Bool(true));
                if taken {
                    trace.push(ActivityEntry::Branch { index: Some(index) });
                    return run_block(body, last_output, scope, trace, skills, delegator).await;
                }
            }
            trace.push(ActivityEntry::Branch { index: None });
            run_block(else_branch, last_output, scope, trace, skills, delegator).await
        }
        Statement::ForEach { var, collection, body } => {
            let env = build_env(last_output, scope);
            let items = match collection.eval(&env)? {
                Value::List(items) => items,
                _ => return Err(OnInputError::NotAList),
            };
            let iterations = items.len();
            for item in items {
                scope.insert(var.clone(), item);
                let stopped = run_block(body, last_output, scope, trace, skills, delegator).await?;
                if stopped {
                    scope.remove(var);
                    trace.push(ActivityEntry::ForEach { iterations });
                    return Ok(true);
                }
            }
            scope.remove(var);
            trace.push(ActivityEntry::ForEach { iterations });
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSkills;
    #[async_trait]
    impl SkillInvoker for EchoSkills {
        async fn invoke_skill(&self, skill: &str, params: serde_json::Value) -> Result<String, String> {
            Ok(format!("{skill}:{params}"))
        }
    }

    struct FailingSkills;
    #[async_trait]
    impl SkillInvoker for FailingSkills {
        async fn invoke_skill(&self, _skill: &str, _params: serde_json::Value) -> Result<String, String> {
            Err("boom".to_string())
        }
    }

    struct EchoDelegator;
    #[async_trait]
    impl Delegator for EchoDelegator {
        async fn delegate(&self, agent_fqn: &str, input: &str) -> Result<String, String> {
            Ok(format!("{agent_fqn} saw {input}"))
        }
    }

    fn map_value(pairs: Vec<(&str, Value)>) -> Value {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn parses_use_skill_delegate_and_respond() {
        let program = Value::List(vec![
            map_value(vec![
                ("type", Value::String("use_skill".into())),
                ("skill", Value::String("search".into())),
                (
                    "params",
                    map_value(vec![("query", Value::String("\"hello\"".into()))]),
                ),
            ]),
            map_value(vec![
                ("type", Value::String("delegate".into())),
                ("agent", Value::String("pkg/Agent/b".into())),
            ]),
            map_value(vec![
                ("type", Value::String("respond".into())),
                ("expr", Value::String("last_output".into())),
            ]),
        ]);
        let statements = parse_program(&program).unwrap();
        assert_eq!(statements.len(), 3);
        assert!(matches!(statements[0], Statement::UseSkill { .. }));
        assert!(matches!(statements[1], Statement::Delegate { .. }));
        assert!(matches!(statements[2], Statement::Respond { .. }));
    }

    #[test]
    fn unknown_statement_type_is_rejected() {
        let program = Value::List(vec![map_value(vec![("type", Value::String("loop_forever".into()))])]);
        assert!(matches!(parse_program(&program), Err(ParseError::UnknownStatement(_))));
    }

    #[tokio::test]
    async fn use_skill_binds_last_output_and_respond_terminates() {
        let program = Value::List(vec![
            map_value(vec![
                ("type", Value::String("use_skill".into())),
                ("skill", Value::String("echo".into())),
                ("params", map_value(vec![])),
            ]),
            map_value(vec![
                ("type", Value::String("respond".into())),
                ("expr", Value::String("last_output".into())),
            ]),
        ]);
        let statements = parse_program(&program).unwrap();
        let outcome = run(&statements, "hi", &EchoSkills, &EchoDelegator).await.unwrap();
        assert_eq!(outcome.output, "echo:{}");
        assert_eq!(outcome.trace.len(), 2);
    }

    #[tokio::test]
    async fn respond_stops_remaining_statements() {
        let program = Value::List(vec![
            map_value(vec![
                ("type", Value::String("respond".into())),
                ("expr", Value::String("\"done\"".into())),
            ]),
            map_value(vec![
                ("type", Value::String("delegate".into())),
                ("agent", Value::String("pkg/Agent/never".into())),
            ]),
        ]);
        let statements = parse_program(&program).unwrap();
        let outcome = run(&statements, "hi", &EchoSkills, &EchoDelegator).await.unwrap();
        assert_eq!(outcome.output, "done");
        assert_eq!(outcome.trace.len(), 1, "the statement after respond must not run");
    }

    #[tokio::test]
    async fn failing_skill_surfaces_as_error_not_panic() {
        let program = Value::List(vec![map_value(vec![
            ("type", Value::String("use_skill".into())),
            ("skill", Value::String("search".into())),
            ("params", map_value(vec![])),
        ])]);
        let statements = parse_program(&program).unwrap();
        let err = run(&statements, "hi", &FailingSkills, &EchoDelegator).await.unwrap_err();
        assert!(matches!(err, OnInputError::SkillFailed { .. }));
    }

    #[tokio::test]
    async fn if_else_if_else_picks_first_true_branch() {
        let program = Value::List(vec![map_value(vec![
            ("type", Value::String("if".into())),
            (
                "branches",
                Value::List(vec![
                    map_value(vec![
                        ("cond", Value::String("false".into())),
                        (
                            "body",
                            Value::List(vec![map_value(vec![
                                ("type", Value::String("respond".into())),
                                ("expr", Value::String("\"first\"".into())),
                            ])]),
                        ),
                    ]),
                    map_value(vec![
                        ("cond", Value::String("true".into())),
                        (
                            "body",
                            Value::List(vec![map_value(vec![
                                ("type", Value::String("respond".into())),
                                ("expr", Value::String("\"second\"".into())),
                            ])]),
                        ),
                    ]),
                ]),
            ),
            (
                "else",
                Value::List(vec![map_value(vec![
                    ("type", Value::String("respond".into())),
                    ("expr", Value::String("\"else\"".into())),
                ])]),
            ),
        ])]);
        let statements = parse_program(&program).unwrap();
        let outcome = run(&statements, "hi", &EchoSkills, &EchoDelegator).await.unwrap();
        assert_eq!(outcome.output, "second");
    }

    #[tokio::test]
    async fn for_each_binds_loop_variable_each_iteration() {
        let program = Value::List(vec![
            map_value(vec![
                ("type", Value::String("for_each".into())),
                ("var", Value::String("x".into())),
                ("in", Value::String("items".into())),
                (
                    "body",
                    Value::List(vec![map_value(vec![
                        ("type", Value::String("use_skill".into())),
                        ("skill", Value::String("echo".into())),
                        ("params", map_value(vec![("v", Value::String("x".into()))])),
                    ])]),
                ),
            ]),
            map_value(vec![
                ("type", Value::String("respond".into())),
                ("expr", Value::String("last_output".into())),
            ]),
        ]);
        let statements = parse_program(&program).unwrap();
        // `in` expression needs `items` bound; run manually via a wrapper scope.
        let mut last_output = "start".to_string();
        let mut scope = BTreeMap::new();
        scope.insert(
            "items".to_string(),
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        );
        let mut trace = Vec::new();
        run_block(&statements, &mut last_output, &mut scope, &mut trace, &EchoSkills, &EchoDelegator)
            .await
            .unwrap();
        assert_eq!(last_output, "echo:{\"v\":3}");
    }
}
