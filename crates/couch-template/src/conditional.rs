//! Conditional field pruning.
//!
//! Object keys of the form `#{if(EXPR)}name` (optionally preceded by
//! whitespace) are kept as `name` when `EXPR` holds and dropped otherwise.

use crate::context::GenerationContext;
use crate::error::TemplateError;
use crate::expr::evaluate_condition;
use serde_json::{Map, Value};

const MARKER_OPEN: &str = "#{if(";
const MARKER_CLOSE: &str = ")}";

/// Split a conditional key into its expression and field name.
///
/// The expression runs up to the last `)}` of the key.
pub fn split_conditional_key(key: &str) -> Option<(&str, &str)> {
    let body = key.trim_start().strip_prefix(MARKER_OPEN)?;
    let close = body.rfind(MARKER_CLOSE)?;
    Some((&body[..close], &body[close + MARKER_CLOSE.len()..]))
}

/// Prunes and renames conditional keys, recursively.
pub struct ConditionalEvaluator<'a> {
    ctx: &'a GenerationContext<'a>,
}

impl<'a> ConditionalEvaluator<'a> {
    pub fn new(ctx: &'a GenerationContext<'a>) -> Self {
        Self { ctx }
    }

    /// Evaluate every conditional key in `value`.
    pub fn evaluate(&self, value: Value) -> Result<Value, TemplateError> {
        match value {
            Value::Object(map) => self.evaluate_object(map).map(Value::Object),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other),
        }
    }

    fn evaluate_object(&self, map: Map<String, Value>) -> Result<Map<String, Value>, TemplateError> {
        let mut out = Map::with_capacity(map.len());
        for (key, value) in map {
            let value = self.evaluate(value)?;
            match split_conditional_key(&key) {
                Some((expr, name)) => {
                    if evaluate_condition(expr, self.ctx)? {
                        out.insert(name.to_string(), value);
                    }
                }
                None => {
                    out.insert(key, value);
                }
            }
        }
        Ok(out)
    }
}
