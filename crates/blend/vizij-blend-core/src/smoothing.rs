//! Critically damped smoothing.

/// Critically damped spring toward `target`, time constant `smooth_time`.
/// Never overshoots; `velocity` carries state between calls.
#[inline]
pub fn smooth_damp(current: f32, target: f32, velocity: &mut f32, smooth_time: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return current;
    }
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let decay = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);
    let change = current - target;
    let temp = (*velocity + omega * change) * dt;
    *velocity = (*velocity - omega * temp) * decay;
    let mut out = target + (change + temp) * decay;
    if (target - current > 0.0) == (out > target) {
        out = target;
        *velocity = 0.0;
    }
    out
}

/// Element-wise [`smooth_damp`] over equally sized slices.
pub fn smooth_damp_slice(
    current: &mut [f32],
    target: &[f32],
    velocity: &mut [f32],
    smooth_time: f32,
    dt: f32,
) {
    for ((c, t), v) in current.iter_mut().zip(target).zip(velocity.iter_mut()) {
        *c = smooth_damp(*c, *t, v, smooth_time, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converges_without_overshoot() {
        let mut v = 0.0;
        let mut x = 0.0;
        let mut max_seen = 0.0f32;
        for _ in 0..240 {
            x = smooth_damp(x, 1.0, &mut v, 0.1, 1.0 / 60.0);
            max_seen = max_seen.max(x);
        }
        assert!((x - 1.0).abs() < 1e-3);
        assert!(max_seen <= 1.0);
    }

    #[test]
    fn zero_dt_is_identity() {
        let mut v = 3.0;
        assert_eq!(smooth_damp(0.25, 1.0, &mut v, 0.1, 0.0), 0.25);
        assert_eq!(v, 3.0);
    }
}
