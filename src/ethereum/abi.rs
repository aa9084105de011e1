//! ABI descriptors, the per-contract method/event index, and the conversion
//! between JSON arguments and ABI values.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, EventExt, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Event, Function, JsonAbi, Param, StateMutability},
    primitives::{Bytes, B256, I256, U256},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use super::utils;
use crate::error::{Result, SdkError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    pub name: String,
    pub signature: String,
    pub selector: String,
    pub inputs: Vec<ParamDescriptor>,
    pub outputs: Vec<ParamDescriptor>,
    pub state_mutability: String,
    /// `view` or `pure`: callable without a transaction
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescriptor {
    pub name: String,
    pub signature: String,
    pub topic: String,
    pub inputs: Vec<ParamDescriptor>,
    pub anonymous: bool,
}

fn mutability_str(mutability: StateMutability) -> &'static str {
    match mutability {
        StateMutability::Pure => "pure",
        StateMutability::View => "view",
        StateMutability::NonPayable => "nonpayable",
        StateMutability::Payable => "payable",
    }
}

fn param_descriptor(param: &Param) -> ParamDescriptor {
    ParamDescriptor {
        name: param.name.clone(),
        ty: param.selector_type().into_owned(),
        indexed: None,
    }
}

fn method_descriptor(function: &Function) -> MethodDescriptor {
    MethodDescriptor {
        name: function.name.clone(),
        signature: function.signature(),
        selector: format!("0x{}", hex::encode(function.selector())),
        inputs: function.inputs.iter().map(param_descriptor).collect(),
        outputs: function.outputs.iter().map(param_descriptor).collect(),
        state_mutability: mutability_str(function.state_mutability).to_string(),
        read_only: matches!(
            function.state_mutability,
            StateMutability::View | StateMutability::Pure
        ),
    }
}

fn event_descriptor(event: &Event) -> EventDescriptor {
    EventDescriptor {
        name: event.name.clone(),
        signature: event.signature(),
        topic: format!("0x{}", hex::encode(event.selector())),
        inputs: event
            .inputs
            .iter()
            .map(|p| ParamDescriptor {
                name: p.name.clone(),
                ty: p.selector_type().into_owned(),
                indexed: Some(p.indexed),
            })
            .collect(),
        anonymous: event.anonymous,
    }
}

/// Name-keyed view of a contract ABI, built once per contract handle.
#[derive(Debug, Clone)]
pub struct AbiIndex {
    abi: JsonAbi,
    methods: BTreeMap<String, Vec<Function>>,
    events: BTreeMap<String, Vec<Event>>,
    by_topic: HashMap<B256, Event>,
}

impl AbiIndex {
    pub fn new(abi: JsonAbi) -> Self {
        let methods = abi.functions.clone();
        let events = abi.events.clone();
        let by_topic = abi
            .events()
            .filter(|e| !e.anonymous)
            .map(|e| (e.selector(), e.clone()))
            .collect();
        Self {
            abi,
            methods,
            events,
            by_topic,
        }
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn methods(&self) -> Vec<MethodDescriptor> {
        self.methods
            .values()
            .flat_map(|overloads| overloads.iter().map(method_descriptor))
            .collect()
    }

    pub fn events(&self) -> Vec<EventDescriptor> {
        self.events
            .values()
            .flat_map(|overloads| overloads.iter().map(event_descriptor))
            .collect()
    }

    /// Pick the overload of `name` that takes `arg_count` arguments.
    pub fn resolve_method(&self, name: &str, arg_count: Option<usize>) -> Result<&Function> {
        let overloads = self
            .methods
            .get(name)
            .ok_or_else(|| SdkError::MethodNotFound(name.to_string()))?;

        if overloads.len() == 1 {
            return Ok(&overloads[0]);
        }

        match arg_count {
            Some(count) => overloads
                .iter()
                .find(|f| f.inputs.len() == count)
                .ok_or_else(|| {
                    let signatures: Vec<String> = overloads.iter().map(|f| f.signature()).collect();
                    SdkError::InvalidInput(format!(
                        "No overload of '{}' takes {} arguments. Available: {}",
                        name,
                        count,
                        signatures.join(", ")
                    ))
                }),
            None => Ok(&overloads[0]),
        }
    }

    /// First declared overload of event `name`.
    pub fn event(&self, name: &str) -> Result<&Event> {
        self.events
            .get(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| SdkError::EventNotFound(name.to_string()))
    }

    /// topic0 of every non-anonymous overload of event `name`.
    pub fn event_topics(&self, name: &str) -> Result<Vec<B256>> {
        let overloads = self
            .events
            .get(name)
            .filter(|overloads| !overloads.is_empty())
            .ok_or_else(|| SdkError::EventNotFound(name.to_string()))?;
        Ok(overloads
            .iter()
            .filter(|e| !e.anonymous)
            .map(|e| e.selector())
            .collect())
    }

    pub fn event_by_topic(&self, topic0: &B256) -> Option<&Event> {
        self.by_topic.get(topic0)
    }
}

/// Parse an ABI given as a JSON array, a compiler artifact `{abi: [...]}`, or
/// a string holding either.
pub fn parse_abi(value: &Value) -> Result<JsonAbi> {
    let parsed;
    let value = match value {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text)
                .map_err(|e| SdkError::InvalidInput(format!("ABI is not valid JSON: {}", e)))?;
            &parsed
        }
        other => other,
    };
    let value = match value.get("abi") {
        Some(inner) if value.is_object() => inner,
        _ => value,
    };
    serde_json::from_value(value.clone())
        .map_err(|e| SdkError::InvalidInput(format!("Invalid contract ABI: {}", e)))
}

/// Number of positional arguments in a JSON argument list, if it is one.
pub fn arg_count(args: &Value) -> Option<usize> {
    match args {
        Value::Array(items) => Some(items.len()),
        Value::Null => Some(0),
        _ => None,
    }
}

/// Convert JSON arguments (positional array, named object, or null) to ABI values.
pub fn args_to_values(function: &Function, args: &Value) -> Result<Vec<DynSolValue>> {
    let expected = || {
        function
            .inputs
            .iter()
            .map(|input| format!("{}: {}", input.name, input.selector_type()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let ordered: Vec<&Value> = match args {
        Value::Null => Vec::new(),
        Value::Array(params) => params.iter().collect(),
        Value::Object(obj) => function
            .inputs
            .iter()
            .map(|input| {
                obj.get(&input.name).ok_or_else(|| {
                    SdkError::InvalidInput(format!(
                        "Missing parameter '{}' for '{}'. Expected: ({})",
                        input.name,
                        function.name,
                        expected()
                    ))
                })
            })
            .collect::<Result<_>>()?,
        other => {
            return Err(SdkError::InvalidInput(format!(
                "Arguments for '{}' must be an array or an object, got {}",
                function.name, other
            )))
        }
    };

    if ordered.len() != function.inputs.len() {
        return Err(SdkError::InvalidInput(format!(
            "'{}' expects {} arguments, got {}. Expected: ({})",
            function.name,
            function.inputs.len(),
            ordered.len(),
            expected()
        )));
    }

    function
        .inputs
        .iter()
        .zip(ordered)
        .enumerate()
        .map(|(i, (input, value))| {
            let ty = input.resolve().map_err(|e| {
                SdkError::InvalidInput(format!("Unsupported ABI type '{}': {}", input.ty, e))
            })?;
            json_to_sol_value(value, &ty).map_err(|e| {
                SdkError::InvalidInput(format!(
                    "Invalid argument #{} ('{}' of type '{}'): {}",
                    i + 1,
                    input.name,
                    input.selector_type(),
                    e
                ))
            })
        })
        .collect()
}

pub fn encode_call(function: &Function, args: &Value) -> Result<Bytes> {
    let values = args_to_values(function, args)?;
    function
        .abi_encode_input(&values)
        .map(Bytes::from)
        .map_err(|e| SdkError::InvalidInput(format!("Failed to encode '{}': {}", function.name, e)))
}

pub fn decode_output(function: &Function, data: &[u8]) -> Result<Value> {
    if data.is_empty() {
        return Ok(Value::Null);
    }

    let decoded = function.abi_decode_output(data, false).map_err(|e| {
        SdkError::Provider(format!("Failed to decode output of '{}': {}", function.name, e))
    })?;

    Ok(match decoded.as_slice() {
        [single] => sol_value_to_json(single),
        values => Value::Array(values.iter().map(sol_value_to_json).collect()),
    })
}

/// Decode a log against `event` into a JSON object keyed by parameter name
/// (positional index for unnamed parameters).
pub fn decode_event_args(event: &Event, topics: &[B256], data: &[u8]) -> Result<Value> {
    let decoded = event
        .decode_log_parts(topics.iter().copied(), data, false)
        .map_err(|e| SdkError::Provider(format!("Failed to decode event '{}': {}", event.name, e)))?;

    let mut indexed = decoded.indexed.iter();
    let mut body = decoded.body.iter();
    let mut args = Map::new();

    for (i, input) in event.inputs.iter().enumerate() {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        };
        let key = if input.name.is_empty() {
            i.to_string()
        } else {
            input.name.clone()
        };
        args.insert(key, value.map(sol_value_to_json).unwrap_or(Value::Null));
    }

    Ok(Value::Object(args))
}

fn parse_bytes(value: &Value) -> std::result::Result<Vec<u8>, String> {
    let s = value.as_str().ok_or("bytes must be a 0x-prefixed hex string")?;
    hex::decode(s.trim_start_matches("0x")).map_err(|_| format!("invalid hex string: {}", s))
}

fn parse_uint(value: &Value) -> std::result::Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("{} is not an unsigned integer", n)),
        Value::String(s) => utils::validate_hex_value(s).map_err(|e| e.to_string()),
        _ => Err("unsigned integers must be numbers or numeric strings".to_string()),
    }
}

/// Two's-complement range check: -2^(bits-1) <= n < 2^(bits-1).
fn fits_signed(n: &I256, bits: usize) -> bool {
    if bits >= 256 {
        return true;
    }
    let bound = U256::from(1u8) << (bits - 1);
    let magnitude = n.unsigned_abs();
    if n.is_negative() {
        magnitude <= bound
    } else {
        magnitude < bound
    }
}

fn parse_int(value: &Value) -> std::result::Result<I256, String> {
    let s = match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err("signed integers must be numbers or numeric strings".to_string()),
    };
    match s.strip_prefix("0x") {
        Some(hex) => I256::from_hex_str(hex),
        None => I256::from_dec_str(&s),
    }
    .map_err(|_| format!("invalid signed integer: {}", s))
}

/// Convert a JSON value to an ABI value of the given type.
pub fn json_to_sol_value(value: &Value, ty: &DynSolType) -> std::result::Result<DynSolValue, String> {
    match ty {
        DynSolType::Address => {
            let s = value.as_str().ok_or("address must be a string")?;
            utils::validate_address(s)
                .map(DynSolValue::Address)
                .map_err(|e| e.to_string())
        }
        DynSolType::Bool => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            Value::String(s) if s == "true" || s == "false" => Ok(DynSolValue::Bool(s == "true")),
            _ => Err("bool must be true or false".to_string()),
        },
        DynSolType::Uint(bits) => {
            let n = parse_uint(value)?;
            if n.bit_len() > *bits {
                return Err(format!("{} does not fit in uint{}", n, bits));
            }
            Ok(DynSolValue::Uint(n, *bits))
        }
        DynSolType::Int(bits) => {
            let n = parse_int(value)?;
            if !fits_signed(&n, *bits) {
                return Err(format!("{} does not fit in int{}", n, bits));
            }
            Ok(DynSolValue::Int(n, *bits))
        }
        DynSolType::String => value
            .as_str()
            .map(|s| DynSolValue::String(s.to_string()))
            .ok_or_else(|| "string parameter must be a string".to_string()),
        DynSolType::Bytes => Ok(DynSolValue::Bytes(parse_bytes(value)?)),
        DynSolType::FixedBytes(size) => {
            let bytes = parse_bytes(value)?;
            if bytes.len() > *size {
                return Err(format!("expected at most {} bytes, got {}", size, bytes.len()));
            }
            Ok(DynSolValue::FixedBytes(B256::right_padding_from(&bytes), *size))
        }
        DynSolType::Array(inner) => {
            let items = value.as_array().ok_or("array parameter must be an array")?;
            items
                .iter()
                .map(|item| json_to_sol_value(item, inner))
                .collect::<std::result::Result<_, _>>()
                .map(DynSolValue::Array)
        }
        DynSolType::FixedArray(inner, len) => {
            let items = value.as_array().ok_or("array parameter must be an array")?;
            if items.len() != *len {
                return Err(format!("expected {} elements, got {}", len, items.len()));
            }
            items
                .iter()
                .map(|item| json_to_sol_value(item, inner))
                .collect::<std::result::Result<_, _>>()
                .map(DynSolValue::FixedArray)
        }
        DynSolType::Tuple(types) => {
            let items = value.as_array().ok_or("tuple parameter must be an array")?;
            if items.len() != types.len() {
                return Err(format!("expected {} tuple fields, got {}", types.len(), items.len()));
            }
            items
                .iter()
                .zip(types)
                .map(|(item, ty)| json_to_sol_value(item, ty))
                .collect::<std::result::Result<_, _>>()
                .map(DynSolValue::Tuple)
        }
        other => Err(format!("unsupported ABI type: {}", other.sol_type_name())),
    }
}

/// Convert a decoded ABI value to JSON. Integers become decimal strings.
pub fn sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Address(addr) => Value::String(addr.to_checksum(None)),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::FixedBytes(word, size) => {
            Value::String(format!("0x{}", hex::encode(&word[..*size])))
        }
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(sol_value_to_json).collect())
        }
        other => Value::String(format!("{:?}", other)),
    }
}
