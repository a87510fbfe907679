//! The builtin operator library.
//!
//! Operators resolve their blobs once at construction: inputs must already
//! exist in the store, outputs are created empty. Construction order therefore
//! matters; a network can only read blobs created by operators built before it.

use std::{sync::Arc, thread, time::Duration};

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde_json::Value as JsonValue;
use stepflow_types::OperatorDef;
use tracing::info;

use crate::{
    blob::{Blob, BlobStore, BlobValue},
    network::Operator,
};

/// Operator types understood by the builtin factory.
pub const OPERATOR_TYPES: &[&str] = &["ConstantFill", "Copy", "Fail", "Increment", "LessThan", "Not", "Print", "Sleep"];

pub(super) fn build(definition: &OperatorDef, store: &Arc<BlobStore>) -> Result<Box<dyn Operator>> {
    let operator: Box<dyn Operator> = match definition.op_type.as_str() {
        "ConstantFill" => {
            expect_arity(definition, 0..=0, 1)?;
            let value = fill_value(definition)?;
            Box::new(ConstantFill {
                value,
                output: output_blob(definition, store, 0),
            })
        }
        "Copy" => {
            expect_arity(definition, 1..=1, 1)?;
            Box::new(CopyBlob {
                input: input_blob(definition, store, 0)?,
                output: output_blob(definition, store, 0),
            })
        }
        "Fail" => Box::new(Fail {
            message: string_arg(definition, "message").unwrap_or("operator failed on purpose").to_string(),
        }),
        "Increment" => {
            expect_arity(definition, 0..=0, 1)?;
            let by = match definition.args.get("by") {
                None => 1,
                Some(value) => value.as_i64().ok_or_else(|| anyhow!("argument 'by' must be an integer"))?,
            };
            Box::new(Increment {
                by,
                output: output_blob(definition, store, 0),
            })
        }
        "LessThan" => {
            let bound = match definition.args.get("bound") {
                None => None,
                Some(value) => Some(value.as_f64().ok_or_else(|| anyhow!("argument 'bound' must be a number"))?),
            };
            let right = match bound {
                Some(bound) => {
                    expect_arity(definition, 1..=1, 1)?;
                    Operand::Bound(bound)
                }
                None => {
                    expect_arity(definition, 2..=2, 1)?;
                    Operand::Blob(definition.inputs[1].clone(), input_blob(definition, store, 1)?)
                }
            };
            Box::new(LessThan {
                left: (definition.inputs[0].clone(), input_blob(definition, store, 0)?),
                right,
                output: output_blob(definition, store, 0),
            })
        }
        "Not" => {
            expect_arity(definition, 1..=1, 1)?;
            Box::new(Not {
                input: (definition.inputs[0].clone(), input_blob(definition, store, 0)?),
                output: output_blob(definition, store, 0),
            })
        }
        "Print" => {
            expect_arity(definition, 1..=usize::MAX, 0)?;
            let inputs = (0..definition.inputs.len())
                .map(|index| Ok((definition.inputs[index].clone(), input_blob(definition, store, index)?)))
                .collect::<Result<Vec<_>>>()?;
            Box::new(Print { inputs })
        }
        "Sleep" => {
            let millis = match definition.args.get("millis") {
                None => 0,
                Some(value) => value.as_u64().ok_or_else(|| anyhow!("argument 'millis' must be a non-negative integer"))?,
            };
            Box::new(Sleep {
                duration: Duration::from_millis(millis),
            })
        }
        other => bail!("unknown operator type '{other}'; expected one of {}", OPERATOR_TYPES.join(", ")),
    };
    Ok(operator)
}

fn expect_arity(definition: &OperatorDef, inputs: std::ops::RangeInclusive<usize>, outputs: usize) -> Result<()> {
    ensure!(
        inputs.contains(&definition.inputs.len()),
        "{} expects {} input(s), got {}",
        definition.op_type,
        if inputs.start() == inputs.end() {
            inputs.start().to_string()
        } else {
            format!("at least {}", inputs.start())
        },
        definition.inputs.len()
    );
    ensure!(
        definition.outputs.len() == outputs,
        "{} expects {outputs} output(s), got {}",
        definition.op_type,
        definition.outputs.len()
    );
    Ok(())
}

fn input_blob(definition: &OperatorDef, store: &BlobStore, index: usize) -> Result<Arc<Blob>> {
    let name = &definition.inputs[index];
    store
        .get_blob(name)
        .with_context(|| format!("input blob '{name}' does not exist"))
}

fn output_blob(definition: &OperatorDef, store: &BlobStore, index: usize) -> Arc<Blob> {
    store.create_blob(&definition.outputs[index])
}

fn string_arg<'a>(definition: &'a OperatorDef, key: &str) -> Option<&'a str> {
    definition.args.get(key).and_then(JsonValue::as_str)
}

/// `value` (scalar or array) repeated `count` times when scalar.
fn fill_value(definition: &OperatorDef) -> Result<BlobValue> {
    let value = definition.args.get("value").context("ConstantFill requires a 'value' argument")?;
    let count = match definition.args.get("count") {
        None => 1,
        Some(count) => count.as_u64().context("argument 'count' must be a non-negative integer")? as usize,
    };
    let elements: Vec<&JsonValue> = match value {
        JsonValue::Array(items) => items.iter().collect(),
        scalar => std::iter::repeat_n(scalar, count).collect(),
    };
    let Some(first) = elements.first() else {
        bail!("ConstantFill cannot infer an element type from an empty value");
    };

    let mismatch = || anyhow!("ConstantFill values must share one element type");
    Ok(match first {
        JsonValue::Bool(_) => BlobValue::Bool(elements.iter().map(|item| item.as_bool().ok_or_else(mismatch)).collect::<Result<_>>()?),
        JsonValue::Number(number) if number.is_i64() || number.is_u64() => {
            BlobValue::Int(elements.iter().map(|item| item.as_i64().ok_or_else(mismatch)).collect::<Result<_>>()?)
        }
        JsonValue::Number(_) => BlobValue::Float(elements.iter().map(|item| item.as_f64().ok_or_else(mismatch)).collect::<Result<_>>()?),
        JsonValue::String(_) => BlobValue::Text(
            elements
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(mismatch))
                .collect::<Result<_>>()?,
        ),
        other => bail!("ConstantFill does not support value {other}"),
    })
}

struct ConstantFill {
    value: BlobValue,
    output: Arc<Blob>,
}

impl Operator for ConstantFill {
    fn op_type(&self) -> &str {
        "ConstantFill"
    }

    fn run(&self) -> Result<()> {
        self.output.set(self.value.clone());
        Ok(())
    }
}

struct CopyBlob {
    input: Arc<Blob>,
    output: Arc<Blob>,
}

impl Operator for CopyBlob {
    fn op_type(&self) -> &str {
        "Copy"
    }

    fn run(&self) -> Result<()> {
        let value = self.input.get().context("cannot copy an empty blob")?;
        self.output.set(value);
        Ok(())
    }
}

struct Fail {
    message: String,
}

impl Operator for Fail {
    fn op_type(&self) -> &str {
        "Fail"
    }

    fn run(&self) -> Result<()> {
        Err(anyhow!(self.message.clone()))
    }
}

struct Increment {
    by: i64,
    output: Arc<Blob>,
}

impl Operator for Increment {
    fn op_type(&self) -> &str {
        "Increment"
    }

    fn run(&self) -> Result<()> {
        self.output.update(|slot| {
            let current = match slot {
                None => 0,
                Some(BlobValue::Int(values)) if values.len() == 1 => values[0],
                Some(other) => bail!("Increment expects an int scalar, found {} {}", other.element_type(), other),
            };
            let Some(next) = current.checked_add(self.by) else {
                bail!("Increment overflowed: {current} + {}", self.by);
            };
            *slot = Some(BlobValue::Int(vec![next]));
            Ok(())
        })
    }
}

enum Operand {
    Blob(String, Arc<Blob>),
    Bound(f64),
}

fn numeric_scalar(name: &str, blob: &Blob) -> Result<f64> {
    blob.get()
        .as_ref()
        .and_then(BlobValue::as_f64_scalar)
        .with_context(|| format!("blob '{name}' must hold a numeric scalar"))
}

struct LessThan {
    left: (String, Arc<Blob>),
    right: Operand,
    output: Arc<Blob>,
}

impl Operator for LessThan {
    fn op_type(&self) -> &str {
        "LessThan"
    }

    fn run(&self) -> Result<()> {
        let left = numeric_scalar(&self.left.0, &self.left.1)?;
        let right = match &self.right {
            Operand::Blob(name, blob) => numeric_scalar(name, blob)?,
            Operand::Bound(bound) => *bound,
        };
        self.output.set(BlobValue::Bool(vec![left < right]));
        Ok(())
    }
}

struct Not {
    input: (String, Arc<Blob>),
    output: Arc<Blob>,
}

impl Operator for Not {
    fn op_type(&self) -> &str {
        "Not"
    }

    fn run(&self) -> Result<()> {
        let (name, blob) = &self.input;
        let value = blob
            .get()
            .as_ref()
            .and_then(BlobValue::as_bool_scalar)
            .with_context(|| format!("blob '{name}' must hold a bool scalar"))?;
        self.output.set(BlobValue::Bool(vec![!value]));
        Ok(())
    }
}

struct Print {
    inputs: Vec<(String, Arc<Blob>)>,
}

impl Operator for Print {
    fn op_type(&self) -> &str {
        "Print"
    }

    fn run(&self) -> Result<()> {
        for (name, blob) in &self.inputs {
            match blob.get() {
                Some(value) => info!(blob = %name, element_type = %value.element_type(), value = %value, "blob contents"),
                None => info!(blob = %name, "blob is empty"),
            }
        }
        Ok(())
    }
}

struct Sleep {
    duration: Duration,
}

impl Operator for Sleep {
    fn op_type(&self) -> &str {
        "Sleep"
    }

    fn run(&self) -> Result<()> {
        thread::sleep(self.duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn def(op_type: &str, inputs: &[&str], outputs: &[&str], args: JsonValue) -> OperatorDef {
        OperatorDef {
            op_type: op_type.into(),
            name: None,
            inputs: inputs.iter().map(|name| name.to_string()).collect(),
            outputs: outputs.iter().map(|name| name.to_string()).collect(),
            args: args
                .as_object()
                .map(|map| map.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
                .unwrap_or_default(),
        }
    }

    fn value_of(store: &BlobStore, name: &str) -> Option<BlobValue> {
        store.get_blob(name).and_then(|blob| blob.get())
    }

    #[test]
    fn constant_fill_repeats_scalars_and_accepts_arrays() {
        let store = Arc::new(BlobStore::new());
        build(&def("ConstantFill", &[], &["ones"], json!({ "value": 1.5, "count": 3 })), &store)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(value_of(&store, "ones"), Some(BlobValue::Float(vec![1.5, 1.5, 1.5])));

        build(&def("ConstantFill", &[], &["flags"], json!({ "value": [true, false] })), &store)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(value_of(&store, "flags"), Some(BlobValue::Bool(vec![true, false])));
    }

    #[test]
    fn constant_fill_rejects_mixed_arrays() {
        let store = Arc::new(BlobStore::new());
        let error = build(&def("ConstantFill", &[], &["x"], json!({ "value": [1, "two"] })), &store)
            .err()
            .expect("mixed");
        assert!(error.to_string().contains("share one element type"), "unexpected error: {error}");
    }

    #[test]
    fn missing_input_fails_construction() {
        let store = Arc::new(BlobStore::new());
        let error = build(&def("Copy", &["absent"], &["out"], json!({})), &store).err().expect("missing input");
        assert!(error.to_string().contains("'absent'"), "unexpected error: {error}");
    }

    #[test]
    fn arity_is_checked() {
        let store = Arc::new(BlobStore::new());
        let error = build(&def("Increment", &[], &[], json!({})), &store).err().expect("no output");
        assert!(error.to_string().contains("expects 1 output"), "unexpected error: {error}");
    }

    #[test]
    fn less_than_with_bound_and_not() {
        let store = Arc::new(BlobStore::new());
        build(&def("ConstantFill", &[], &["n"], json!({ "value": 4 })), &store)
            .unwrap()
            .run()
            .unwrap();
        build(&def("LessThan", &["n"], &["below"], json!({ "bound": 5 })), &store)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(value_of(&store, "below"), Some(BlobValue::Bool(vec![true])));

        build(&def("Not", &["below"], &["above"], json!({})), &store).unwrap().run().unwrap();
        assert_eq!(value_of(&store, "above"), Some(BlobValue::Bool(vec![false])));
    }

    #[test]
    fn increment_rejects_non_integer_counter() {
        let store = Arc::new(BlobStore::new());
        store.create_blob("c").set(BlobValue::Text(vec!["x".into()]));
        let error = build(&def("Increment", &[], &["c"], json!({ "by": 2 })), &store)
            .unwrap()
            .run()
            .expect_err("text counter");
        assert!(error.to_string().contains("int scalar"), "unexpected error: {error}");
    }

    #[test]
    fn increment_overflow_fails_and_keeps_value() {
        let store = Arc::new(BlobStore::new());
        store.create_blob("c").set(BlobValue::Int(vec![i64::MAX]));
        let error = build(&def("Increment", &[], &["c"], json!({})), &store)
            .unwrap()
            .run()
            .expect_err("overflow");
        assert!(error.to_string().contains("overflowed"), "unexpected error: {error}");
        assert_eq!(value_of(&store, "c"), Some(BlobValue::Int(vec![i64::MAX])));
    }

    #[test]
    fn unknown_operator_lists_known_types() {
        let store = Arc::new(BlobStore::new());
        let error = build(&def("Warp", &[], &["x"], json!({})), &store).err().expect("unknown");
        assert!(error.to_string().contains("ConstantFill"), "unexpected error: {error}");
        assert!(!store.has_blob("x"));
    }
}
