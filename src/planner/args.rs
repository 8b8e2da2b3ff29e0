//! Declarative argument builders.
//!
//! A field's argument builder can't be a Rust closure if `Plan` is to carry a stable,
//! comparable fingerprint suitable for per-(query,vars) memoization — closures
//! aren't `Hash`/`Eq`. Instead each argument
//! is compiled once, at plan time, into an [`ArgSpec`] that is replayed against a
//! variables map on every read/write.

use std::hash::{Hash, Hasher};

use serde_json_bytes::{Map, Value};

use crate::key::value_fingerprint_bytes as value_to_bytes;

/// One argument of a field, as it will be rebuilt from a variables map at call time.
#[derive(Debug, Clone)]
pub enum ArgSpec {
    /// `field(name: $var)` — renamed from the variable's name to the schema arg name.
    Variable { arg_name: String, var_name: String },
    /// `field(name: "literal")` — a constant baked in at plan time.
    Literal { arg_name: String, value: Value },
    /// `field(name: { nested... })` / `field(name: [ ... ])` — only variables and
    /// literals nested inside compile further; cachebay does not evaluate GraphQL
    /// enums/directives inside argument values beyond passing their literal text.
    Nested { arg_name: String, value: ArgValue },
}

/// A (possibly nested) argument value, mixing variable references and literals.
#[derive(Debug, Clone)]
pub enum ArgValue {
    Variable(String),
    Literal(Value),
    Object(Vec<(String, ArgValue)>),
    List(Vec<ArgValue>),
}

impl ArgValue {
    fn resolve(&self, variables: &Map) -> Value {
        match self {
            ArgValue::Variable(name) => variables
                .get(name.as_str())
                .cloned()
                .unwrap_or(Value::Null),
            ArgValue::Literal(v) => v.clone(),
            ArgValue::Object(fields) => {
                let mut map = Map::new();
                for (k, v) in fields {
                    map.insert(k.clone(), v.resolve(variables));
                }
                Value::Object(map)
            }
            ArgValue::List(items) => {
                Value::Array(items.iter().map(|v| v.resolve(variables)).collect())
            }
        }
    }

    /// Stable hash contribution independent of process-local allocation order.
    fn hash_stable<H: Hasher>(&self, state: &mut H) {
        match self {
            ArgValue::Variable(name) => {
                0u8.hash(state);
                name.hash(state);
            }
            ArgValue::Literal(v) => {
                1u8.hash(state);
                value_to_bytes(v).hash(state);
            }
            ArgValue::Object(fields) => {
                2u8.hash(state);
                let mut sorted: Vec<&(String, ArgValue)> = fields.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                for (k, v) in sorted {
                    k.hash(state);
                    v.hash_stable(state);
                }
            }
            ArgValue::List(items) => {
                3u8.hash(state);
                for item in items {
                    item.hash_stable(state);
                }
            }
        }
    }
}

/// An ordered set of [`ArgSpec`]s compiled for a single field occurrence.
#[derive(Debug, Clone, Default)]
pub struct ArgBuilder {
    pub specs: Vec<ArgSpec>,
}

impl ArgBuilder {
    pub fn build(&self, variables: &Map) -> Map {
        let mut out = Map::new();
        for spec in &self.specs {
            let (name, value) = match spec {
                ArgSpec::Variable { arg_name, var_name } => (
                    arg_name.clone(),
                    variables.get(var_name.as_str()).cloned().unwrap_or(Value::Null),
                ),
                ArgSpec::Literal { arg_name, value } => (arg_name.clone(), value.clone()),
                ArgSpec::Nested { arg_name, value } => (arg_name.clone(), value.resolve(variables)),
            };
            out.insert(name, value);
        }
        out
    }

    pub fn hash_stable<H: Hasher>(&self, state: &mut H) {
        let mut sorted: Vec<&ArgSpec> = self.specs.iter().collect();
        sorted.sort_by_key(|s| match s {
            ArgSpec::Variable { arg_name, .. }
            | ArgSpec::Literal { arg_name, .. }
            | ArgSpec::Nested { arg_name, .. } => arg_name.clone(),
        });
        for spec in sorted {
            match spec {
                ArgSpec::Variable { arg_name, var_name } => {
                    arg_name.hash(state);
                    0u8.hash(state);
                    var_name.hash(state);
                }
                ArgSpec::Literal { arg_name, value } => {
                    arg_name.hash(state);
                    1u8.hash(state);
                    value_to_bytes(value).hash(state);
                }
                ArgSpec::Nested { arg_name, value } => {
                    arg_name.hash(state);
                    2u8.hash(state);
                    value.hash_stable(state);
                }
            }
        }
    }
}
