#![allow(unused)]

use serde_json::Value;

static CW20_EXECUTE: &str = include_str!("fixtures/cw20_execute_msg.json");
static CW20_QUERY: &str = include_str!("fixtures/cw20_query_msg.json");

pub fn cw20_execute_schema() -> Value {
    serde_json::from_str(CW20_EXECUTE).unwrap()
}

pub fn cw20_query_schema() -> Value {
    serde_json::from_str(CW20_QUERY).unwrap()
}

/// An execute schema that only knows about `transfer`.
pub fn transfer_only_schema() -> Value {
    let mut schema = cw20_execute_schema();
    let variants = schema["oneOf"].as_array_mut().unwrap();
    variants.retain(|v| v["required"][0] == "transfer");
    schema
}
