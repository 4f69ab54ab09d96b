#![cfg(target_arch = "wasm32")]
use vizij_state_wasm::{abi_version, VizijStateMachine};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

const GRAPH: &str = r#"{
    "config": { "lanes": { "main": { "fallback": "Idle" } } },
    "states": [
        {
            "id": 1,
            "name": "Idle",
            "priority": 10,
            "transitions": [
                { "target": "Move", "conditions": [{ "kind": "float", "key": "speed", "cmp": "greater", "value": 0.1 }] }
            ]
        },
        { "id": 2, "name": "Move", "priority": 20 },
        {
            "id": 3,
            "name": "Wave",
            "lane": "buff",
            "priority": 30,
            "cost": { "main": { "mask": "right_hand", "enter_cost": 0.6 } }
        }
    ]
}"#;

#[wasm_bindgen_test]
fn abi_is_1() {
    assert_eq!(abi_version(), 1);
}

#[wasm_bindgen_test]
fn null_spec_is_rejected() {
    assert!(VizijStateMachine::new(JsValue::NULL).is_err());
}

#[wasm_bindgen_test]
fn fallback_then_transition() {
    let mut sm = VizijStateMachine::from_json(GRAPH).unwrap();
    let out = sm.tick(0.016).unwrap();
    assert!(out.is_object());
    assert_eq!(sm.current_state("main").unwrap(), Some(1));

    sm.set_float("speed", 1.0);
    sm.tick(0.016).unwrap();
    assert_eq!(sm.current_state("main").unwrap(), Some(2));
}

#[wasm_bindgen_test]
fn entry_reports_reasons() {
    let mut sm = VizijStateMachine::from_json(GRAPH).unwrap();
    assert_eq!(sm.try_enter_state(JsValue::from_str("Wave"), None, false).unwrap(), "none");
    assert_eq!(
        sm.try_enter_state(JsValue::from_f64(3.0), None, false).unwrap(),
        "priority_too_low"
    );
    assert_eq!(
        sm.try_enter_state(JsValue::from_str("Nope"), None, false).unwrap(),
        "unknown_state"
    );
    assert!(sm.current_state("upper").is_err());
    assert_eq!(sm.exit_lane("buff").unwrap(), Some(3));
}
