//! Keyframed scalar curves with per-segment cubic-bezier easing.
//!
//! Segment `i -> i+1` uses the `out` handle of key `i` and the `in` handle of
//! key `i+1`. Missing handles default to the standard ease
//! (`out = (0.42, 0)`, `in = (0.58, 1)`). Outside the key range the curve
//! clamps to the first/last value.

use serde::{Deserialize, Serialize};

const DEFAULT_OUT: [f32; 2] = [0.42, 0.0];
const DEFAULT_IN: [f32; 2] = [0.58, 1.0];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
    /// Outgoing bezier handle, normalized to the segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out: Option<[f32; 2]>,
    /// Incoming bezier handle, normalized to the segment.
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub r#in: Option<[f32; 2]>,
    /// Hold this key's value until the next key (step).
    #[serde(default)]
    pub hold: bool,
}

impl CurveKey {
    pub fn new(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            out: None,
            r#in: None,
            hold: false,
        }
    }

    pub fn linear(time: f32, value: f32) -> Self {
        Self {
            out: Some([0.0, 0.0]),
            r#in: Some([1.0, 1.0]),
            ..Self::new(time, value)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub keys: Vec<CurveKey>,
}

impl Curve {
    /// Build from keys; keys are sorted by time.
    pub fn new(mut keys: Vec<CurveKey>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// `(0,0) -> (1,1)` straight line.
    pub fn linear() -> Self {
        Self::new(vec![CurveKey::linear(0.0, 0.0), CurveKey::linear(1.0, 1.0)])
    }

    /// `(0,0) -> (1,1)` with the default ease-in-out handles.
    pub fn ease_in_out() -> Self {
        Self::new(vec![CurveKey::new(0.0, 0.0), CurveKey::new(1.0, 1.0)])
    }

    pub fn constant(value: f32) -> Self {
        Self::new(vec![CurveKey::new(0.0, value)])
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Evaluate at `t`. Empty curves evaluate to 0.
    pub fn evaluate(&self, t: f32) -> f32 {
        let (i0, i1, lt) = find_segment(&self.keys, t);
        let Some(a) = self.keys.get(i0) else {
            return 0.0;
        };
        if i0 == i1 || a.hold {
            return a.value;
        }
        let b = &self.keys[i1];
        let out = a.out.unwrap_or(DEFAULT_OUT);
        let inn = b.r#in.unwrap_or(DEFAULT_IN);
        let eased = bezier_ease_t(lt, out[0], out[1], inn[0], inn[1]);
        a.value + (b.value - a.value) * eased
    }
}

/// Locate the segment containing `t` and the local parameter within it.
fn find_segment(keys: &[CurveKey], t: f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n == 0 || n == 1 || t <= keys[0].time {
        return (0, 0, 0.0);
    }
    if t >= keys[n - 1].time {
        return (n - 1, n - 1, 0.0);
    }
    // First key strictly after t; t > keys[0].time so idx >= 1.
    let idx = keys.partition_point(|k| k.time <= t);
    let (i0, i1) = (idx - 1, idx);
    let denom = (keys[i1].time - keys[i0].time).max(f32::EPSILON);
    (i0, i1, ((t - keys[i0].time) / denom).clamp(0.0, 1.0))
}

#[inline]
fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

/// Invert the x bezier by bisection and return eased y.
#[inline]
pub fn bezier_ease_t(t: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if x1 == y1 && x2 == y2 {
        return t;
    }
    let mut lo = 0.0f32;
    let mut hi = 1.0f32;
    let mut mid = t;
    for _ in 0..24 {
        let x = cubic_bezier(0.0, x1, x2, 1.0, mid);
        if (x - t).abs() < 1e-6 {
            break;
        }
        if x < t {
            lo = mid;
        } else {
            hi = mid;
        }
        mid = 0.5 * (lo + hi);
    }
    cubic_bezier(0.0, y1, y2, 1.0, mid)
}
