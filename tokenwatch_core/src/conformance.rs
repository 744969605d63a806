//! CW20 interface conformance, judged from a contract's published JSON schemas.
//!
//! The check is fixture based: a handful of representative requests must validate
//! against the schemas. A schema can pass while being broader or narrower than the
//! standard outside those shapes, and an unusual but valid phrasing can fail.

use std::fmt::Display;

use serde_json::{json, Value};

const SAMPLE_ADDRESS: &str = "wasm14hj2tavq8fpesdwxxcu44rty3hh90vhujrvcmstl4zr3txmfvw9s4hmalr";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interface {
    Execute,
    Query,
}

impl Display for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Interface::Execute => "execute",
            Interface::Query => "query",
        };
        write!(f, "{s}")
    }
}

/// Why a contract is not considered a CW20 token: one line per violated rule.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", .violations.join("\n"))]
pub struct NonConformance {
    pub violations: Vec<String>,
}

fn execute_samples() -> Vec<(&'static str, Value)> {
    vec![
        (
            "transfer",
            json!({"transfer": {"recipient": SAMPLE_ADDRESS, "amount": "1000"}}),
        ),
        (
            "send",
            json!({"send": {"contract": SAMPLE_ADDRESS, "amount": "1000", "msg": "e30="}}),
        ),
    ]
}

fn query_samples() -> Vec<(&'static str, Value)> {
    vec![
        ("balance", json!({"balance": {"address": SAMPLE_ADDRESS}})),
        ("token_info", json!({"token_info": {}})),
        ("all_accounts", json!({"all_accounts": {"limit": 10}})),
    ]
}

pub fn check(execute_schema: &Value, query_schema: &Value) -> Result<(), NonConformance> {
    let mut violations = Vec::new();
    validate(Interface::Execute, execute_schema, &execute_samples(), &mut violations);
    validate(Interface::Query, query_schema, &query_samples(), &mut violations);

    if violations.is_empty() {
        Ok(())
    } else {
        Err(NonConformance { violations })
    }
}

fn validate(
    interface: Interface,
    schema: &Value,
    samples: &[(&str, Value)],
    violations: &mut Vec<String>,
) {
    let validator = match jsonschema::validator_for(schema) {
        Ok(validator) => validator,
        Err(err) => {
            violations.push(format!("{interface} schema is invalid: {err}"));
            return;
        }
    };

    for (name, sample) in samples {
        if let Err(err) = validator.validate(sample) {
            tracing::debug!("{interface} schema rejected {name} sample: {err}");
            violations.push(format!("{interface} schema rejects {name} request: {err}"));
        }
    }
}
