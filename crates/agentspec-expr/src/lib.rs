// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! A sandboxed, non-Turing-complete expression engine used for pipeline
//! `when` clauses, delegation conditions, and `if` bodies.
//!
//! Guarantees: no loops, no recursion, no user-defined functions beyond a
//! small whitelist; side-effect-free; always terminates; bounded memory;
//! type errors surface at evaluation time with a closed taxonomy
//! (`TypeMismatch`, `UndefinedIdentifier`, `OutOfRange`).
//!
//! `compile()` produces a reusable [`Program`]; `Program::eval()` evaluates
//! it against an [`Env`].

mod ast;
mod eval;
mod lexer;
mod parser;

pub use ast::Program;
pub use eval::Env;
pub use parser::compile;

/// Evaluation and compilation failures: the three evaluation-time kinds
/// (`TypeMismatch`, `UndefinedIdentifier`, `OutOfRange`) form a closed
/// taxonomy; `ParseError` covers the compile step.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExprError {
    /// The expression source could not be parsed.
    #[error("expression parse error: {0}")]
    ParseError(String),
    /// An operator was applied to operands of an unsupported type.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// An identifier or property path has no binding in the environment.
    #[error("undefined identifier: {0}")]
    UndefinedIdentifier(String),
    /// An index, slice, or arithmetic operation went out of its valid range.
    #[error("out of range: {0}")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentspec_core::Value;

    fn eval_str(src: &str, env: &Env) -> Value {
        compile(src).unwrap().eval(env).unwrap()
    }

    #[test]
    fn literals_and_arithmetic() {
        assert_eq!(eval_str("1 + 2 * 3", &Env::new()), Value::Int(7));
        assert_eq!(eval_str("(1 + 2) * 3", &Env::new()), Value::Int(9));
        assert_eq!(eval_str("7 % 3", &Env::new()), Value::Int(1));
    }

    #[test]
    fn property_access_chain() {
        let env = Env::new().with(
            "a",
            Value::Map(std::collections::BTreeMap::from([(
                "b".to_string(),
                Value::Map(std::collections::BTreeMap::from([(
                    "c".to_string(),
                    Value::Int(42),
                )])),
            )])),
        );
        assert_eq!(eval_str("a.b.c", &env), Value::Int(42));
    }

    #[test]
    fn comparisons_and_booleans() {
        assert_eq!(eval_str("1 < 2 && 2 < 3", &Env::new()), Value::Bool(true));
        assert_eq!(eval_str("1 > 2 || 3 == 3", &Env::new()), Value::Bool(true));
        assert_eq!(eval_str("not (1 == 1)", &Env::new()), Value::Bool(false));
    }

    #[test]
    fn ternary_expression() {
        assert_eq!(eval_str("1 < 2 ? \"yes\" : \"no\"", &Env::new()), Value::String("yes".into()));
    }

    #[test]
    fn membership_and_len() {
        let env = Env::new().with("xs", Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(eval_str("1 in xs", &env), Value::Bool(true));
        assert_eq!(eval_str("len(xs) > 0", &env), Value::Bool(true));
    }

    #[test]
    fn has_reports_presence_without_erroring() {
        let env = Env::new();
        assert_eq!(eval_str("has(missing)", &env), Value::Bool(false));
    }

    #[test]
    fn regex_match_operator() {
        let env = Env::new().with("s", Value::String("hello123".into()));
        assert_eq!(eval_str(r#"s =~ "^hello\\d+$""#, &env), Value::Bool(true));
    }

    #[test]
    fn undefined_identifier_is_reported() {
        let err = compile("missing").unwrap().eval(&Env::new()).unwrap_err();
        assert!(matches!(err, ExprError::UndefinedIdentifier(_)));
    }

    #[test]
    fn out_of_range_index_is_reported() {
        let env = Env::new().with("xs", Value::List(vec![Value::Int(1)]));
        let err = compile("xs[5]").unwrap().eval(&env).unwrap_err();
        assert!(matches!(err, ExprError::OutOfRange(_)));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let err = compile("1 + \"a\"").unwrap().eval(&Env::new()).unwrap_err();
        assert!(matches!(err, ExprError::TypeMismatch(_)));
    }

    proptest::proptest! {
        #[test]
        fn arithmetic_never_panics_and_terminates(a in -1000i64..1000, b in -1000i64..1000) {
            let env = Env::new();
            let src = format!("{a} + {b} * 2 - {a}");
            let _ = compile(&src).unwrap().eval(&env);
        }
    }
}
