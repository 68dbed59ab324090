//! Scalar function registry
//!
//! Functions are looked up by their qualified name (`namespace:name`, or the
//! bare name for the default namespace). Each entry carries an arity check, a
//! return-type rule evaluated at compile time and the implementation.

use crate::error::{EvalError, EvalResult};
use cepline_types::{AttributeType, Value, parse_timestamp};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Type alias for scalar function implementations
pub type ScalarFn = Arc<dyn Fn(&[Value]) -> EvalResult<Value> + Send + Sync>;

/// Type alias for compile-time return type rules
pub type ReturnTypeFn = Arc<dyn Fn(&[AttributeType]) -> EvalResult<AttributeType> + Send + Sync>;

/// Name and accepted argument count of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub min_args: usize,
    /// `None` for variadic functions
    pub max_args: Option<usize>,
}

impl FunctionSignature {
    /// Signature with exactly `count` arguments
    pub fn exact(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            min_args: count,
            max_args: Some(count),
        }
    }

    /// Variadic signature with at least `count` arguments
    pub fn at_least(name: impl Into<String>, count: usize) -> Self {
        Self {
            name: name.into(),
            min_args: count,
            max_args: None,
        }
    }

    /// Check an argument count against this signature
    pub fn check_arity(&self, found: usize) -> EvalResult<()> {
        let ok = found >= self.min_args && self.max_args.is_none_or(|max| found <= max);
        if ok {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{}..{max}", self.min_args),
            None => format!("at least {}", self.min_args),
        };
        Err(EvalError::invalid_argument_count(&self.name, expected, found))
    }
}

/// A registered scalar function
#[derive(Clone)]
pub struct ScalarFunction {
    pub signature: FunctionSignature,
    pub return_type: ReturnTypeFn,
    pub implementation: ScalarFn,
}

/// Registry of scalar functions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, ScalarFunction>,
}

/// The standard function set, built on first use
pub static STANDARD_FUNCTIONS: Lazy<Arc<FunctionRegistry>> =
    Lazy::new(|| Arc::new(FunctionRegistry::standard()));

impl FunctionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its signature name
    pub fn register(
        &mut self,
        signature: FunctionSignature,
        return_type: ReturnTypeFn,
        implementation: ScalarFn,
    ) {
        self.functions.insert(
            signature.name.clone(),
            ScalarFunction {
                signature,
                return_type,
                implementation,
            },
        );
    }

    /// Get a function by qualified name
    pub fn get(&self, name: &str) -> Option<&ScalarFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registry with the built-in functions
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register(
            FunctionSignature::at_least("coalesce", 1),
            Arc::new(|types: &[AttributeType]| unify("coalesce", types)),
            Arc::new(|args: &[Value]| Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null))),
        );

        registry.register(
            FunctionSignature::exact("ifThenElse", 3),
            Arc::new(|types: &[AttributeType]| {
                expect_type("ifThenElse", types[0], AttributeType::Bool)?;
                unify("ifThenElse", &types[1..])
            }),
            Arc::new(|args: &[Value]| Ok(if args[0].is_true() { args[1].clone() } else { args[2].clone() })),
        );

        registry.register(
            FunctionSignature::at_least("maximum", 1),
            Arc::new(|types: &[AttributeType]| widen_all("maximum", types)),
            Arc::new(|args: &[Value]| Ok(args.iter().filter(|v| !v.is_null()).max().cloned().unwrap_or(Value::Null))),
        );

        registry.register(
            FunctionSignature::at_least("minimum", 1),
            Arc::new(|types: &[AttributeType]| widen_all("minimum", types)),
            Arc::new(|args: &[Value]| Ok(args.iter().filter(|v| !v.is_null()).min().cloned().unwrap_or(Value::Null))),
        );

        registry.register(
            FunctionSignature::at_least("str:concat", 1),
            Arc::new(|_: &[AttributeType]| Ok(AttributeType::String)),
            Arc::new(|args: &[Value]| {
                if args.iter().any(Value::is_null) {
                    return Ok(Value::Null);
                }
                Ok(Value::String(args.iter().map(plain_text).collect()))
            }),
        );

        registry.register(
            FunctionSignature::exact("str:length", 1),
            Arc::new(|types: &[AttributeType]| {
                expect_type("str:length", types[0], AttributeType::String)?;
                Ok(AttributeType::Int)
            }),
            Arc::new(|args: &[Value]| {
                Ok(match &args[0] {
                    Value::String(s) => Value::Int(s.chars().count() as i32),
                    _ => Value::Null,
                })
            }),
        );

        registry.register(
            FunctionSignature::exact("regex:matches", 2),
            Arc::new(|types: &[AttributeType]| {
                expect_type("regex:matches", types[0], AttributeType::String)?;
                expect_type("regex:matches", types[1], AttributeType::String)?;
                Ok(AttributeType::Bool)
            }),
            Arc::new(|args: &[Value]| match (&args[0], &args[1]) {
                (Value::String(pattern), Value::String(text)) => {
                    let regex = Regex::new(&format!("^(?:{pattern})$"))
                        .map_err(|e| EvalError::invalid_argument("regex:matches", e.to_string()))?;
                    Ok(Value::Bool(regex.is_match(text)))
                }
                _ => Ok(Value::Null),
            }),
        );

        registry.register(
            FunctionSignature::exact("time:toMillis", 1),
            Arc::new(|types: &[AttributeType]| match types[0] {
                AttributeType::String | AttributeType::Int | AttributeType::Long | AttributeType::Object => {
                    Ok(AttributeType::Long)
                }
                other => Err(EvalError::type_mismatch("STRING or LONG", other.name())),
            }),
            Arc::new(|args: &[Value]| match &args[0] {
                Value::String(text) => Ok(Value::Long(parse_timestamp(text)?)),
                Value::Null => Ok(Value::Null),
                other => other
                    .as_long()
                    .map(Value::Long)
                    .ok_or_else(|| EvalError::invalid_argument("time:toMillis", format!("{other}"))),
            }),
        );

        registry
    }
}

/// Argument text without literal decoration
fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Long(l) => l.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
    }
}

fn expect_type(function: &str, found: AttributeType, expected: AttributeType) -> EvalResult<()> {
    if found == expected || found == AttributeType::Object {
        Ok(())
    } else {
        Err(EvalError::invalid_argument(
            function,
            format!("expected {expected}, found {found}"),
        ))
    }
}

/// Common type of arguments that must agree; nulls (`Object`) adapt
fn unify(function: &str, types: &[AttributeType]) -> EvalResult<AttributeType> {
    let mut result = AttributeType::Object;
    for ty in types.iter().copied().filter(|t| *t != AttributeType::Object) {
        result = match result {
            AttributeType::Object => ty,
            current if current == ty => current,
            current => current.widen(ty).ok_or_else(|| {
                EvalError::invalid_argument(function, format!("incompatible types {current} and {ty}"))
            })?,
        };
    }
    Ok(result)
}

fn widen_all(function: &str, types: &[AttributeType]) -> EvalResult<AttributeType> {
    if let Some(bad) = types
        .iter()
        .find(|t| !t.is_numeric() && **t != AttributeType::Object)
    {
        return Err(EvalError::invalid_argument(
            function,
            format!("expected numeric arguments, found {bad}"),
        ));
    }
    unify(function, types)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> EvalResult<Value> {
        let function = STANDARD_FUNCTIONS.get(name).unwrap();
        function.signature.check_arity(args.len())?;
        (function.implementation)(args)
    }

    #[test]
    fn test_standard_functions_registered() {
        for name in [
            "coalesce",
            "ifThenElse",
            "maximum",
            "minimum",
            "str:concat",
            "str:length",
            "regex:matches",
            "time:toMillis",
        ] {
            assert!(STANDARD_FUNCTIONS.contains(name), "{name} missing");
        }
    }

    #[test]
    fn test_arity() {
        assert!(matches!(
            call("ifThenElse", &[Value::Bool(true)]),
            Err(EvalError::InvalidArgumentCount { found: 1, .. })
        ));
        assert!(call("coalesce", &[]).is_err());
    }

    #[test]
    fn test_coalesce_and_maximum() {
        assert_eq!(call("coalesce", &[Value::Null, Value::Int(2)]).unwrap(), Value::Int(2));
        assert_eq!(
            call("maximum", &[Value::Int(3), Value::Null, Value::Double(2.5)]).unwrap(),
            Value::Int(3)
        );
        assert!(call("minimum", &[Value::Null]).unwrap().is_null());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            call("str:concat", &[Value::string("IBM"), Value::Long(7)]).unwrap(),
            Value::string("IBM7")
        );
        assert!(call("str:concat", &[Value::string("a"), Value::Null]).unwrap().is_null());
        assert_eq!(call("str:length", &[Value::string("héllo")]).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_regex_matches_whole_input() {
        let matches = |p: &str, t: &str| call("regex:matches", &[Value::string(p), Value::string(t)]).unwrap();
        assert_eq!(matches("IB.", "IBM"), Value::Bool(true));
        assert_eq!(matches("IB", "IBM"), Value::Bool(false));
        assert!(call("regex:matches", &[Value::string("("), Value::string("x")]).is_err());
    }

    #[test]
    fn test_to_millis() {
        assert_eq!(
            call("time:toMillis", &[Value::string("1970-01-01 00:00:01")]).unwrap(),
            Value::Long(1000)
        );
        assert_eq!(call("time:toMillis", &[Value::Int(5)]).unwrap(), Value::Long(5));
    }

    #[test]
    fn test_return_type_rules() {
        let maximum = STANDARD_FUNCTIONS.get("maximum").unwrap();
        assert_eq!(
            (maximum.return_type)(&[AttributeType::Int, AttributeType::Double]).unwrap(),
            AttributeType::Double
        );
        assert!((maximum.return_type)(&[AttributeType::String]).is_err());
    }
}
