//! Template expression evaluation
//!
//! A string of the exact form `{{ <expr> | <TAG> }}` is a template
//! expression. `EXT` reads an external variable, `REQ` walks the request
//! tree, `UNIQ` derives a per-scenario unique value. Every other value passes
//! through untouched; arrays and objects keep their shape.

use crate::error::EvaluationError;
use crate::identity::unique_value;
use crate::types::{ScenarioId, Variables};
use regex::Regex;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::LazyLock;

static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*(\S+)\s*\|\s*([^\s}]+)\s*\}\}$").expect("template pattern is valid")
});

/// Template evaluator tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluator {
    Ext,
    Req,
    Uniq,
}

impl FromStr for Evaluator {
    type Err = EvaluationError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "EXT" => Ok(Evaluator::Ext),
            "REQ" => Ok(Evaluator::Req),
            "UNIQ" => Ok(Evaluator::Uniq),
            other => Err(EvaluationError::UnsupportedEvaluator(other.to_string())),
        }
    }
}

/// A parsed `{{ expr | TAG }}` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template<'s> {
    pub expression: &'s str,
    pub tag: &'s str,
}

impl<'s> Template<'s> {
    /// Parse a string as a template expression, `None` for plain strings
    pub fn parse(input: &'s str) -> Option<Self> {
        let captures = TEMPLATE.captures(input)?;
        Some(Self {
            expression: captures.get(1)?.as_str(),
            tag: captures.get(2)?.as_str(),
        })
    }
}

/// Values a scenario's templates resolve against
#[derive(Debug, Clone)]
pub struct EvaluationContext<'a> {
    pub variables: &'a Variables,
    pub request: Value,
    pub response: Option<Value>,
    pub scenario_id: ScenarioId,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(variables: &'a Variables, request: Value, scenario_id: ScenarioId) -> Self {
        Self {
            variables,
            request,
            response: None,
            scenario_id,
        }
    }

    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }
}

/// Evaluate a value tree, replacing every template expression
pub fn evaluate_value(value: &Value, context: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    match value {
        Value::String(s) => evaluate_string(s, context),
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate_value(item, context))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, field)| Ok((key.clone(), evaluate_value(field, context)?)))
            .collect::<Result<Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn evaluate_string(input: &str, context: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    let Some(template) = Template::parse(input) else {
        return Ok(Value::String(input.to_string()));
    };

    match template.tag.parse::<Evaluator>()? {
        Evaluator::Ext => evaluate_ext(template.expression, context.variables),
        Evaluator::Req => evaluate_req(template.expression, &context.request),
        Evaluator::Uniq => Ok(Value::String(unique_value(
            &context.scenario_id,
            template.expression,
        ))),
    }
}

fn evaluate_ext(name: &str, variables: &Variables) -> Result<Value, EvaluationError> {
    match variables.get(name) {
        Some(value) if !value.is_null() => Ok(value.clone()),
        _ => Err(EvaluationError::VariableNotFound(name.to_string())),
    }
}

/// Walk a dot-delimited path; the first segment stands for the request root
fn evaluate_req(json_path: &str, request: &Value) -> Result<Value, EvaluationError> {
    let unresolved = || EvaluationError::UnresolvedRequestPath(json_path.to_string());

    let mut current = request;
    for segment in json_path.split('.').skip(1) {
        if current.is_null() {
            return Err(unresolved());
        }
        current = match current {
            Value::Object(fields) => fields.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(unresolved)?;
    }

    if current.is_null() {
        return Err(unresolved());
    }
    Ok(current.clone())
}
