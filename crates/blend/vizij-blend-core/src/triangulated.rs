//! Triangulated-2D (directional): fan triangulation around the sample
//! nearest the origin, barycentric weights inside the containing triangle.

use log::warn;
use vizij_params::ParamContext;

use crate::error::BlendConfigError;
use crate::planar::{Planar2dSpec, PlanarSamples};
use crate::runtime::BlendRuntime;
use crate::source::SourceRef;

/// Barycentric components below this still count as inside.
const INSIDE_TOLERANCE: f32 = -0.001;
const DEGENERATE_DENOM: f32 = 1e-4;

#[derive(Debug)]
pub struct Triangulated2d {
    samples: PlanarSamples,
    center: usize,
    /// `[center, outer_k, outer_k+1]`, outer samples ordered by angle.
    triangles: Vec<[usize; 3]>,
}

impl Triangulated2d {
    pub(crate) fn compile(spec: &Planar2dSpec) -> Result<Self, BlendConfigError> {
        let samples = PlanarSamples::compile(spec, "triangulated-2d")?;
        let center = samples.nearest([0.0, 0.0]);
        let c = samples.positions[center];

        let mut outer: Vec<usize> = (0..samples.positions.len()).filter(|&i| i != center).collect();
        outer.sort_by(|&a, &b| {
            let pa = samples.positions[a];
            let pb = samples.positions[b];
            let aa = (pa[1] - c[1]).atan2(pa[0] - c[0]);
            let ab = (pb[1] - c[1]).atan2(pb[0] - c[0]);
            aa.total_cmp(&ab)
        });

        let mut triangles = Vec::with_capacity(outer.len());
        let m = outer.len();
        // Two outer samples close a single triangle; don't emit it twice.
        let fan = if m == 2 { 1 } else { m };
        for k in 0..fan {
            let tri = [center, outer[k], outer[(k + 1) % m]];
            if barycentric(c, samples.positions[tri[0]], samples.positions[tri[1]], samples.positions[tri[2]]).is_none() {
                warn!(
                    "triangulated-2d: skipping degenerate triangle ({}, {}, {})",
                    tri[0], tri[1], tri[2]
                );
                continue;
            }
            triangles.push(tri);
        }
        Ok(Self {
            samples,
            center,
            triangles,
        })
    }

    pub(crate) fn sources(&self) -> &[SourceRef] {
        &self.samples.sources
    }

    pub fn center(&self) -> usize {
        self.center
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub(crate) fn prime(&self, rt: &mut BlendRuntime) {
        self.samples.set_single(rt, self.center);
    }

    pub(crate) fn update(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32, immediate: bool) {
        let p = self.samples.advance_input(rt, ctx, dt, immediate);
        if self.samples.positions.len() == 1 {
            self.samples.set_single(rt, 0);
            return;
        }
        let pos = &self.samples.positions;
        for tri in &self.triangles {
            let Some((u, v, w)) = barycentric(p, pos[tri[0]], pos[tri[1]], pos[tri[2]]) else {
                continue;
            };
            if u < INSIDE_TOLERANCE || v < INSIDE_TOLERANCE || w < INSIDE_TOLERANCE {
                continue;
            }
            let (u, v, w) = (u.max(0.0), v.max(0.0), w.max(0.0));
            let sum = u + v + w;
            if sum <= f32::EPSILON {
                continue;
            }
            rt.clear_targets();
            rt.targets[tri[0]] = u / sum;
            rt.targets[tri[1]] = v / sum;
            rt.targets[tri[2]] = w / sum;
            rt.set_weights_from_targets();
            return;
        }
        let nearest = self.samples.nearest(p);
        self.samples.set_single(rt, nearest);
    }
}

/// Barycentric weights `(a, b, c)` of `p`; `None` for degenerate triangles.
pub fn barycentric(p: [f32; 2], a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> Option<(f32, f32, f32)> {
    let v0 = [c[0] - a[0], c[1] - a[1]];
    let v1 = [b[0] - a[0], b[1] - a[1]];
    let v2 = [p[0] - a[0], p[1] - a[1]];
    let dot = |x: [f32; 2], y: [f32; 2]| x[0] * y[0] + x[1] * y[1];
    let d00 = dot(v0, v0);
    let d01 = dot(v0, v1);
    let d11 = dot(v1, v1);
    let d20 = dot(v2, v0);
    let d21 = dot(v2, v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < DEGENERATE_DENOM {
        return None;
    }
    let w = (d11 * d20 - d01 * d21) / denom;
    let v = (d00 * d21 - d01 * d20) / denom;
    let u = 1.0 - v - w;
    Some((u, v, w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barycentric_vertices_and_centroid() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        let c = [0.0, 1.0];
        let (u, v, w) = barycentric(a, a, b, c).unwrap();
        assert!((u - 1.0).abs() < 1e-6 && v.abs() < 1e-6 && w.abs() < 1e-6);
        let (u, v, w) = barycentric([1.0 / 3.0, 1.0 / 3.0], a, b, c).unwrap();
        for x in [u, v, w] {
            assert!((x - 1.0 / 3.0).abs() < 1e-5);
        }
    }

    #[test]
    fn collinear_is_degenerate() {
        assert!(barycentric([0.5, 0.0], [0.0, 0.0], [1.0, 0.0], [2.0, 0.0]).is_none());
    }
}
