// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation of a compiled [`Program`] against a typed environment.

use crate::ast::{BinOp, Expr, Program};
use crate::ExprError;
use agentspec_core::Value;
use std::collections::BTreeMap;

/// An evaluation environment: identifier name to value.
#[derive(Debug, Clone, Default)]
pub struct Env(BTreeMap<String, Value>);

impl Env {
    /// An empty environment.
    #[must_use]
    pub fn new() -> Self {
        Env(BTreeMap::new())
    }

    /// Bind an identifier, builder-style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Bind an identifier in place.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Look up an identifier.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Upper bound on AST nodes visited during one evaluation. The language has
/// no loops or recursion, so this is a defense-in-depth cap rather than a
/// load-bearing one — well-formed programs never approach it.
const STEP_LIMIT: u32 = 100_000;

struct Evaluator<'a> {
    env: &'a Env,
    steps: u32,
}

impl Program {
    /// Evaluate this program against `env`.
    pub fn eval(&self, env: &Env) -> Result<Value, ExprError> {
        let mut ev = Evaluator { env, steps: 0 };
        ev.eval_expr(&self.root)
    }
}

impl Evaluator<'_> {
    fn tick(&mut self) -> Result<(), ExprError> {
        self.steps += 1;
        if self.steps > STEP_LIMIT {
            return Err(ExprError::OutOfRange("expression exceeded its step limit".into()));
        }
        Ok(())
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, ExprError> {
        self.tick()?;
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Ident(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| ExprError::UndefinedIdentifier(name.clone())),
            Expr::Field(base, field) => {
                let base_val = self.eval_expr(base)?;
                match &base_val {
                    Value::Map(m) => Ok(m.get(field).cloned().unwrap_or(Value::Null)),
                    Value::Null => Ok(Value::Null),
                    other => Err(ExprError::TypeMismatch(format!(
                        "cannot access field {field:?} on {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Index(base, index) => {
                let base_val = self.eval_expr(base)?;
                let index_val = self.eval_expr(index)?;
                match (&base_val, &index_val) {
                    (Value::List(items), Value::Int(i)) => {
                        let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                        if idx < 0 || idx as usize >= items.len() {
                            return Err(ExprError::OutOfRange(format!(
                                "index {i} out of range for list of length {}",
                                items.len()
                            )));
                        }
                        Ok(items[idx as usize].clone())
                    }
                    (Value::Map(m), Value::String(k)) => Ok(m.get(k).cloned().unwrap_or(Value::Null)),
                    (other, _) => Err(ExprError::TypeMismatch(format!(
                        "cannot index into {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Not(inner) => Ok(Value::Bool(!self.eval_bool(inner)?)),
            Expr::Neg(inner) => match self.eval_expr(inner)? {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ExprError::TypeMismatch(format!("cannot negate {}", other.type_name()))),
            },
            Expr::Ternary(cond, then_b, else_b) => {
                if self.eval_bool(cond)? {
                    self.eval_expr(then_b)
                } else {
                    self.eval_expr(else_b)
                }
            }
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_expr(item)?);
                }
                Ok(Value::List(out))
            }
            Expr::Call(name, args) => self.eval_call(name, args),
            Expr::Binary(op, left, right) => self.eval_binary(*op, left, right),
        }
    }

    fn eval_bool(&mut self, expr: &Expr) -> Result<bool, ExprError> {
        match self.eval_expr(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(ExprError::TypeMismatch(format!("expected bool, found {}", other.type_name()))),
        }
    }

    fn eval_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value, ExprError> {
        use BinOp::*;
        match op {
            And => {
                if !self.eval_bool(left)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            Or => {
                if self.eval_bool(left)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(right)?))
            }
            Eq => Ok(Value::Bool(self.eval_expr(left)? == self.eval_expr(right)?)),
            Ne => Ok(Value::Bool(self.eval_expr(left)? != self.eval_expr(right)?)),
            Lt | Le | Gt | Ge => {
                let l = self.eval_number(left)?;
                let r = self.eval_number(right)?;
                Ok(Value::Bool(match op {
                    Lt => l < r,
                    Le => l <= r,
                    Gt => l > r,
                    Ge => l >= r,
                    _ => unreachable!(),
                }))
            }
            Add | Sub | Mul | Div | Mod => self.eval_arith(op, left, right),
            In => {
                let needle = self.eval_expr(left)?;
                match self.eval_expr(right)? {
                    Value::List(items) => Ok(Value::Bool(items.contains(&needle))),
                    Value::String(hay) => match needle {
                        Value::String(n) => Ok(Value::Bool(hay.contains(&n))),
                        other => Err(ExprError::TypeMismatch(format!(
                            "cannot test {} in string",
                            other.type_name()
                        ))),
                    },
                    other => Err(ExprError::TypeMismatch(format!(
                        "right side of 'in' must be a list or string, found {}",
                        other.type_name()
                    ))),
                }
            }
            Match => {
                let hay = match self.eval_expr(left)? {
                    Value::String(s) => s,
                    other => return Err(ExprError::TypeMismatch(format!(
                        "left side of '=~' must be a string, found {}",
                        other.type_name()
                    ))),
                };
                let pattern = match self.eval_expr(right)? {
                    Value::String(s) => s,
                    other => return Err(ExprError::TypeMismatch(format!(
                        "right side of '=~' must be a string, found {}",
                        other.type_name()
                    ))),
                };
                let re = regex::Regex::new(&pattern)
                    .map_err(|e| ExprError::TypeMismatch(format!("invalid regex {pattern:?}: {e}")))?;
                Ok(Value::Bool(re.is_match(&hay)))
            }
        }
    }

    fn eval_number(&mut self, expr: &Expr) -> Result<f64, ExprError> {
        match self.eval_expr(expr)? {
            Value::Int(i) => Ok(i as f64),
            Value::Float(f) => Ok(f),
            other => Err(ExprError::TypeMismatch(format!("expected number, found {}", other.type_name()))),
        }
    }

    fn eval_arith(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value, ExprError> {
        let l = self.eval_expr(left)?;
        let r = self.eval_expr(right)?;
        if let (Value::Int(a), Value::Int(b)) = (&l, &r) {
            return Ok(Value::Int(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => {
                    if *b == 0 {
                        return Err(ExprError::OutOfRange("division by zero".into()));
                    }
                    a / b
                }
                BinOp::Mod => {
                    if *b == 0 {
                        return Err(ExprError::OutOfRange("modulo by zero".into()));
                    }
                    a % b
                }
                _ => unreachable!(),
            }));
        }
        let a = match &l {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            other => return Err(ExprError::TypeMismatch(format!("expected number, found {}", other.type_name()))),
        };
        let b = match &r {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            other => return Err(ExprError::TypeMismatch(format!("expected number, found {}", other.type_name()))),
        };
        Ok(Value::Float(match op {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Mod => a % b,
            _ => unreachable!(),
        }))
    }

    fn eval_call(&mut self, name: &str, args: &[Expr]) -> Result<Value, ExprError> {
        match name {
            "has" => {
                if args.len() != 1 {
                    return Err(ExprError::TypeMismatch("has() takes exactly one argument".into()));
                }
                // `has` never raises UndefinedIdentifier for a missing property
                // chain — that's exactly what it's checking for.
                Ok(Value::Bool(self.eval_expr(&args[0]).is_ok_and(|v| !v.is_null())))
            }
            "len" => {
                if args.len() != 1 {
                    return Err(ExprError::TypeMismatch("len() takes exactly one argument".into()));
                }
                match self.eval_expr(&args[0])? {
                    Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
                    Value::List(l) => Ok(Value::Int(l.len() as i64)),
                    Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                    other => Err(ExprError::TypeMismatch(format!("len() of {}", other.type_name()))),
                }
            }
            "contains" => {
                if args.len() != 2 {
                    return Err(ExprError::TypeMismatch("contains() takes exactly two arguments".into()));
                }
                let hay = self.eval_expr(&args[0])?;
                let needle = self.eval_expr(&args[1])?;
                match (hay, needle) {
                    (Value::String(h), Value::String(n)) => Ok(Value::Bool(h.contains(&n))),
                    (Value::List(h), n) => Ok(Value::Bool(h.contains(&n))),
                    _ => Err(ExprError::TypeMismatch("contains() expects (string,string) or (list,value)".into())),
                }
            }
            "starts_with" => {
                if args.len() != 2 {
                    return Err(ExprError::TypeMismatch("starts_with() takes exactly two arguments".into()));
                }
                let (s, prefix) = (self.eval_expr(&args[0])?, self.eval_expr(&args[1])?);
                match (s, prefix) {
                    (Value::String(s), Value::String(p)) => Ok(Value::Bool(s.starts_with(&p))),
                    _ => Err(ExprError::TypeMismatch("starts_with() expects two strings".into())),
                }
            }
            "matches" => {
                if args.len() != 2 {
                    return Err(ExprError::TypeMismatch("matches() takes exactly two arguments".into()));
                }
                self.eval_binary(BinOp::Match, &args[0], &args[1])
            }
            other => Err(ExprError::UndefinedIdentifier(format!("unknown function {other}()"))),
        }
    }
}
