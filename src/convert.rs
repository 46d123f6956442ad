use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Map, Number, Value};

use crate::error::{BatchError, Result};
use crate::model::Item;

/// Converts one JSON record into a DynamoDB item. The record must be an object.
pub fn json_to_item(record: Value) -> Result<Item> {
    match record {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| Ok::<_, BatchError>((k, json_value_to_av(v)?)))
            .collect(),
        other => Err(BatchError::Serialization(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

pub fn item_to_json(item: &Item) -> Result<Value> {
    let mut map = Map::new();
    for (k, v) in item {
        map.insert(k.clone(), av_to_json_value(v)?);
    }
    Ok(Value::Object(map))
}

pub fn json_value_to_av(value: Value) -> Result<AttributeValue> {
    match value {
        Value::String(s) => Ok(AttributeValue::S(s)),
        Value::Number(num) => number_to_av(&num),
        Value::Bool(b) => Ok(AttributeValue::Bool(b)),
        Value::Null => Ok(AttributeValue::Null(true)),
        Value::Array(arr) => Ok(AttributeValue::L(
            arr.into_iter()
                .map(json_value_to_av)
                .collect::<Result<_>>()?,
        )),
        Value::Object(map) => {
            let mut av_map = HashMap::with_capacity(map.len());
            for (k, v) in map {
                av_map.insert(k, json_value_to_av(v)?);
            }
            Ok(AttributeValue::M(av_map))
        }
    }
}

fn number_to_av(num: &Number) -> Result<AttributeValue> {
    if let Some(n) = num.as_i64() {
        Ok(AttributeValue::N(n.to_string()))
    } else if let Some(n) = num.as_u64() {
        Ok(AttributeValue::N(n.to_string()))
    } else if let Some(n) = num.as_f64().filter(|f| f.is_finite()) {
        Ok(AttributeValue::N(n.to_string()))
    } else {
        Err(BatchError::Serialization(format!("number {num} out of range")))
    }
}

pub fn av_to_json_value(av: &AttributeValue) -> Result<Value> {
    match av {
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => Ok(number_from_str(n)),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::L(lst) => Ok(Value::Array(
            lst.iter().map(av_to_json_value).collect::<Result<_>>()?,
        )),
        AttributeValue::M(map) => {
            let mut json_map = Map::new();
            for (k, v) in map {
                json_map.insert(k.clone(), av_to_json_value(v)?);
            }
            Ok(Value::Object(json_map))
        }
        AttributeValue::Ss(set) => Ok(Value::Array(
            set.iter().cloned().map(Value::String).collect(),
        )),
        AttributeValue::Ns(set) => Ok(Value::Array(
            set.iter().map(|n| number_from_str(n)).collect(),
        )),
        _ => Err(BatchError::Deserialization(
            "Unsupported AttributeValue".to_string(),
        )),
    }
}

// DynamoDB numbers are strings; anything that doesn't fit an f64 stays a string.
fn number_from_str(n: &str) -> Value {
    if let Ok(i) = n.parse::<i64>() {
        Value::Number(i.into())
    } else if let Some(f) = n.parse::<f64>().ok().and_then(Number::from_f64) {
        Value::Number(f)
    } else {
        Value::String(n.to_string())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
