use std::sync::Arc;

use js_sys::JSON;
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;

use vizij_state::vizij_blend::StaticClipTable;
use vizij_state::{DenialReason, Lane, MachineSpec, StateId, StateMachine, StateRef};

#[wasm_bindgen]
pub struct VizijStateMachine {
    core: StateMachine,
}

fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

fn parse_lane(lane: Option<String>) -> Result<Option<Lane>, JsError> {
    match lane {
        None => Ok(None),
        Some(name) => Lane::from_name(&name)
            .map(Some)
            .ok_or_else(|| JsError::new(&format!("unknown lane '{name}'"))),
    }
}

fn require_lane(lane: &str) -> Result<Lane, JsError> {
    Lane::from_name(lane).ok_or_else(|| JsError::new(&format!("unknown lane '{lane}'")))
}

/// Numbers select by id, strings by name.
fn parse_state(state: &JsValue) -> Result<StateRef, JsError> {
    if let Some(name) = state.as_string() {
        return Ok(StateRef::Name(name));
    }
    match state.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(StateRef::Id(n as u32)),
        _ => Err(JsError::new("state must be a non-negative integer id or a name")),
    }
}

fn reason_name(reason: DenialReason) -> String {
    serde_json::to_value(reason)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{reason:?}"))
}

#[wasm_bindgen]
impl VizijStateMachine {
    /// Build a machine from a graph object `{ config?, states: [...] }`.
    #[wasm_bindgen(constructor)]
    pub fn new(spec: JsValue) -> Result<VizijStateMachine, JsError> {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        if jsvalue_is_undefined_or_null(&spec) {
            return Err(JsError::new("state machine spec is null/undefined"));
        }
        // Round-trip through JSON so maps keyed by strings and untagged refs
        // parse exactly as they do from files.
        let json = JSON::stringify(&spec)
            .map_err(|e| JsError::new(&format!("spec stringify error: {e:?}")))?
            .as_string()
            .ok_or_else(|| JsError::new("spec stringify produced non-string"))?;
        Self::from_json(&json)
    }

    #[wasm_bindgen(js_name = fromJson)]
    pub fn from_json(json: &str) -> Result<VizijStateMachine, JsError> {
        let spec: MachineSpec =
            serde_json::from_str(json).map_err(|e| JsError::new(&format!("spec parse error: {e}")))?;
        Ok(VizijStateMachine {
            core: StateMachine::from_spec(&spec),
        })
    }

    /// Validation messages (warnings and errors) from building the graph.
    #[wasm_bindgen]
    pub fn validation(&self) -> Result<JsValue, JsError> {
        swb::to_value(&self.core.validation().messages())
            .map_err(|e| JsError::new(&format!("validation error: {e}")))
    }

    /// Clip lengths for phase timing: `{ clips: { name: { length, looping } } }`.
    /// Applies to states entered from now on.
    #[wasm_bindgen(js_name = set_clip_table)]
    pub fn set_clip_table(&mut self, clips: JsValue) -> Result<(), JsError> {
        let table: StaticClipTable =
            swb::from_value(clips).map_err(|e| JsError::new(&format!("clip table error: {e}")))?;
        self.core.set_clip_table(Arc::new(table));
        Ok(())
    }

    /// Advance by `dt` seconds. Returns `{ events, lanes }`.
    #[wasm_bindgen]
    pub fn tick(&mut self, dt: f32) -> Result<JsValue, JsError> {
        let out = self.core.tick(dt);
        swb::to_value(out).map_err(|e| JsError::new(&format!("outputs error: {e}")))
    }

    #[wasm_bindgen(js_name = set_float)]
    pub fn set_float(&mut self, key: &str, value: f32) {
        self.core.context_mut().set_float(key, value);
    }

    #[wasm_bindgen(js_name = set_int)]
    pub fn set_int(&mut self, key: &str, value: i32) {
        self.core.context_mut().set_int(key, value);
    }

    #[wasm_bindgen(js_name = set_bool)]
    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.core.context_mut().set_bool(key, value);
    }

    #[wasm_bindgen(js_name = set_trigger)]
    pub fn set_trigger(&mut self, key: &str) {
        self.core.context_mut().set_trigger(key);
    }

    #[wasm_bindgen(js_name = set_flag)]
    pub fn set_flag(&mut self, name: &str) {
        self.core.context_mut().set_flag(name);
    }

    #[wasm_bindgen(js_name = clear_flag)]
    pub fn clear_flag(&mut self, name: &str) {
        self.core.context_mut().clear_flag(name);
    }

    /// Request entry. Returns `"none"` when entered, otherwise the denial
    /// reason (`"priority_too_low"`, `"cost_not_enough"`, ...).
    #[wasm_bindgen(js_name = try_enter_state)]
    pub fn try_enter_state(&mut self, state: JsValue, lane: Option<String>, force: bool) -> Result<String, JsError> {
        let state = parse_state(&state)?;
        let lane = parse_lane(lane)?;
        Ok(match self.core.try_enter_state_detailed(state, lane, force) {
            Ok(()) => reason_name(DenialReason::None),
            Err(reason) => reason_name(reason),
        })
    }

    #[wasm_bindgen(js_name = exit_lane)]
    pub fn exit_lane(&mut self, lane: &str) -> Result<Option<u32>, JsError> {
        let lane = require_lane(lane)?;
        Ok(self.core.exit_lane(lane).map(|id| id.0))
    }

    #[wasm_bindgen(js_name = current_state)]
    pub fn current_state(&self, lane: &str) -> Result<Option<u32>, JsError> {
        let lane = require_lane(lane)?;
        Ok(self.core.current_state(lane).map(|id| id.0))
    }

    #[wasm_bindgen(js_name = set_lane_weight)]
    pub fn set_lane_weight(&mut self, lane: &str, weight: f32) -> Result<(), JsError> {
        let lane = require_lane(lane)?;
        self.core.set_lane_weight(lane, weight);
        Ok(())
    }

    #[wasm_bindgen(js_name = block_state)]
    pub fn block_state(&mut self, id: u32) {
        self.core.block_state(StateId(id));
    }

    #[wasm_bindgen(js_name = unblock_state)]
    pub fn unblock_state(&mut self, id: u32) {
        self.core.unblock_state(StateId(id));
    }

    /// Blend weights of the lane's current state, one per source slot.
    #[wasm_bindgen(js_name = blend_weights)]
    pub fn blend_weights(&self, lane: &str) -> Result<Vec<f32>, JsError> {
        let lane = require_lane(lane)?;
        Ok(self.core.blend_weights(lane).to_vec())
    }

    #[wasm_bindgen(js_name = force_phase)]
    pub fn force_phase(&mut self, lane: &str, phase: &str) -> Result<bool, JsError> {
        let lane = require_lane(lane)?;
        Ok(self.core.force_phase(lane, phase))
    }

    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.core.reset();
    }
}

/// Numeric ABI version for compatibility checks at init.
#[wasm_bindgen]
pub fn abi_version() -> u32 {
    1
}
