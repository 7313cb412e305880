//! Integration tests for the condition engine against card-format configs
//!
//! These exercise the path a card session takes: conditions are discovered
//! from a whole card configuration, state is pushed in, and listeners observe
//! epochs and results.

use std::sync::{Arc, Mutex};

use card_conditions::{
    collect_conditions, Condition, ConditionsEvaluation, ConditionsManager, EvaluateConditions,
    SimulatedViewport,
};
use card_core::{ConditionState, EntityState};
use serde_json::json;

// ============================================================================
// Configuration parsing
// ============================================================================

#[test]
fn test_card_config_conditions_parse() {
    let config = json!({
        "conditions": [
            {"condition": "view", "views": ["live", "clips"]},
            {"condition": "fullscreen", "fullscreen": true},
            {"condition": "expand", "expand": false},
            {"condition": "camera", "cameras": "camera.front"},
            {"condition": "media_loaded", "media_loaded": true},
            {"condition": "screen", "media_query": "(orientation: landscape)"},
            {"condition": "display_mode", "display_mode": "single"},
            {"condition": "triggered", "triggered": ["camera.front"]},
            {"condition": "interaction", "interaction": false},
            {"condition": "microphone", "muted": true},
            {"condition": "key", "key": "ArrowLeft", "state": "up"},
            {"condition": "users", "users": ["581fca7fdc014b8b894519cc531f9a04"]},
            {"condition": "state", "entity": "binary_sensor.motion", "state": "on"},
            {"condition": "numeric_state", "entity": "sensor.lux", "below": 10}
        ]
    });

    let conditions = collect_conditions(&config);
    assert_eq!(conditions.len(), 14);
}

#[test]
fn test_nested_compound_conditions_parse() {
    let config = json!({
        "condition": "and",
        "conditions": [
            {
                "condition": "or",
                "conditions": [
                    {"condition": "view", "views": ["live"]},
                    {"condition": "not", "conditions": [{"condition": "fullscreen", "fullscreen": true}]}
                ]
            },
            {"condition": "state", "entity": "sun.sun", "state_not": "below_horizon"}
        ]
    });

    let condition: Condition = serde_json::from_value(config).unwrap();
    assert!(matches!(condition, Condition::And(_)));
    assert!(condition.depends_on_telemetry());
}

// ============================================================================
// Manager behaviour
// ============================================================================

#[test]
fn test_session_flow() {
    let viewport = SimulatedViewport::new(1920, 1080);
    let manager = ConditionsManager::new(Arc::new(viewport.clone()));
    manager.set_conditions_from_config(&json!({
        "overrides": [{
            "conditions": [
                {"condition": "view", "views": ["live"]},
                {"condition": "screen", "media_query": "(orientation: portrait)"}
            ],
            "set": {"live.controls.thumbnails.mode": "none"}
        }]
    }));
    assert!(!manager.has_telemetry_conditions());

    let seen: Arc<Mutex<Vec<ConditionsEvaluation>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    manager.add_listener(Arc::new(move |evaluation: &ConditionsEvaluation| {
        sink.lock().unwrap().push(*evaluation)
    }));

    manager.set_state(ConditionState::new().with_view("live"));
    viewport.resize(1080, 1920);
    manager.set_state(ConditionState::new().with_view("live"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(!seen[0].result);
    assert!(seen[1].result);
    assert!(seen[1].epoch.version > seen[0].epoch.version);
    assert_eq!(seen[1].epoch, manager.get_epoch());
}

#[test]
fn test_foreign_element_evaluation() {
    let manager = ConditionsManager::new(Arc::new(SimulatedViewport::default()));
    manager.set_state(
        ConditionState::new()
            .with_view("live")
            .with_entity("binary_sensor.door", EntityState::new("on")),
    );

    let capability: Arc<dyn EvaluateConditions> = manager.clone();
    let element_conditions: Vec<Condition> = serde_json::from_value(json!([
        {"condition": "view", "views": ["live"]},
        {"condition": "state", "entity": "binary_sensor.door", "state": "on"}
    ]))
    .unwrap();

    assert!(capability.evaluate_conditions(&element_conditions, None));
    assert!(!capability.evaluate_conditions(
        &element_conditions,
        Some(&ConditionState::new().with_view("clips"))
    ));
}
