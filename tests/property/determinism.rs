//! Property-based tests for determinism guarantees

use proptest::prelude::*;
use serde_json::{json, Value};
use trest::contract::{Operation, Parameter, ParameterLocation};
use trest::evaluate::{evaluate_value, EvaluationContext};
use trest::extract::extract_scenarios;
use trest::generate::generate_request;
use trest::types::{ScenarioId, Variables};

fn contract_with(paths: &[(String, usize)]) -> Value {
    let mut document = json!({ "openapi": "3.0.3", "paths": {} });
    for (path, count) in paths {
        let scenarios: Vec<Value> = (0..*count)
            .map(|i| json!({ "name": format!("scenario {}", i) }))
            .collect();
        document["paths"][path.as_str()] = json!({
            "get": {
                "responses": {
                    "200": { "description": "ok", "x-trest-scenarios": scenarios }
                }
            }
        });
    }
    document
}

fn string_parameter(name: &str, location: ParameterLocation) -> Parameter {
    Parameter {
        name: name.to_string(),
        location,
        schema: Some(json!({ "type": "string" })),
    }
}

fn operation() -> Operation {
    Operation {
        path: "/items/{id}".to_string(),
        method: "get".to_string(),
        parameters: vec![
            string_parameter("X-Request-Id", ParameterLocation::Header),
            string_parameter("id", ParameterLocation::Path),
        ],
    }
}

fn template_free() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 _.|-]{0,16}".prop_map(Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

proptest! {
    /// Same contract, same identifiers and coordinates
    #[test]
    fn test_extraction_is_deterministic(
        paths in prop::collection::btree_map("/[a-z]{1,8}", 1usize..4, 1..4)
    ) {
        let paths: Vec<(String, usize)> = paths.into_iter().collect();
        let first = extract_scenarios(contract_with(&paths)).unwrap();
        let second = extract_scenarios(contract_with(&paths)).unwrap();

        prop_assert_eq!(&first.coordinates, &second.coordinates);
        let expected: usize = paths.iter().map(|(_, count)| count).sum();
        prop_assert_eq!(first.coordinates.len(), expected);
    }

    #[test]
    fn test_request_generation_is_idempotent(bytes in any::<[u8; 16]>()) {
        let scenario_id = ScenarioId::from_bytes(bytes);
        let first = generate_request(&operation(), scenario_id).unwrap();
        let second = generate_request(&operation(), scenario_id).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_scenarios_get_distinct_requests(
        a in any::<[u8; 16]>(),
        b in any::<[u8; 16]>()
    ) {
        prop_assume!(a != b);
        let first = generate_request(&operation(), ScenarioId::from_bytes(a)).unwrap();
        let second = generate_request(&operation(), ScenarioId::from_bytes(b)).unwrap();
        prop_assert_ne!(&first.headers, &second.headers);
        prop_assert_ne!(&first.path, &second.path);
    }

    /// Values without template expressions evaluate to themselves
    #[test]
    fn test_evaluation_leaves_plain_values_untouched(value in template_free()) {
        let variables = Variables::new();
        let context = EvaluationContext::new(&variables, json!({}), ScenarioId::from_bytes([7; 16]));
        prop_assert_eq!(evaluate_value(&value, &context).unwrap(), value);
    }
}
