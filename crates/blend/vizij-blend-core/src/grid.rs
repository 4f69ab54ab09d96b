//! Grid-2D (Cartesian): bilinear weights over the four samples around the
//! input.

use log::warn;
use vizij_params::ParamContext;

use crate::error::BlendConfigError;
use crate::planar::{dist2, Planar2dSpec, PlanarSamples};
use crate::runtime::BlendRuntime;
use crate::source::SourceRef;

/// Axis values closer than this share a grid line.
const AXIS_EPSILON: f32 = 1e-4;

#[derive(Debug)]
pub struct Grid2d {
    samples: PlanarSamples,
    xs: Vec<f32>,
    ys: Vec<f32>,
    /// Row-major `ys.len() x xs.len()` map from grid node to sample.
    cells: Vec<Option<usize>>,
}

fn unique_sorted(mut values: Vec<f32>) -> Vec<f32> {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup_by(|a, b| (*a - *b).abs() <= AXIS_EPSILON);
    values
}

fn axis_index(axis: &[f32], value: f32) -> Option<usize> {
    axis.iter().position(|&v| (v - value).abs() <= AXIS_EPSILON)
}

impl Grid2d {
    pub(crate) fn compile(spec: &Planar2dSpec) -> Result<Self, BlendConfigError> {
        let samples = PlanarSamples::compile(spec, "grid-2d")?;
        let xs = unique_sorted(samples.positions.iter().map(|p| p[0]).collect());
        let ys = unique_sorted(samples.positions.iter().map(|p| p[1]).collect());
        let mut cells = vec![None; xs.len() * ys.len()];
        for (i, p) in samples.positions.iter().enumerate() {
            let (Some(ix), Some(iy)) = (axis_index(&xs, p[0]), axis_index(&ys, p[1])) else {
                continue;
            };
            let cell = &mut cells[iy * xs.len() + ix];
            if cell.is_some() {
                warn!("grid-2d: sample {i} duplicates grid node ({}, {}); ignored", p[0], p[1]);
                continue;
            }
            *cell = Some(i);
        }
        Ok(Self {
            samples,
            xs,
            ys,
            cells,
        })
    }

    pub(crate) fn sources(&self) -> &[SourceRef] {
        &self.samples.sources
    }

    pub(crate) fn prime(&self, rt: &mut BlendRuntime) {
        let center = self.samples.nearest([0.0, 0.0]);
        self.samples.set_single(rt, center);
    }

    fn cell(&self, ix: usize, iy: usize) -> Option<usize> {
        self.cells.get(iy * self.xs.len() + ix).copied().flatten()
    }

    /// Exact bilinear interpolation inside a fully populated grid cell.
    fn grid_cell(&self, rt: &mut BlendRuntime, p: [f32; 2]) -> bool {
        let (nx, ny) = (self.xs.len(), self.ys.len());
        if nx < 2 || ny < 2 {
            return false;
        }
        if p[0] < self.xs[0] || p[0] > self.xs[nx - 1] || p[1] < self.ys[0] || p[1] > self.ys[ny - 1] {
            return false;
        }
        let ix = self.xs.partition_point(|&x| x <= p[0]).clamp(1, nx - 1) - 1;
        let iy = self.ys.partition_point(|&y| y <= p[1]).clamp(1, ny - 1) - 1;
        let corners = (
            self.cell(ix, iy),
            self.cell(ix + 1, iy),
            self.cell(ix, iy + 1),
            self.cell(ix + 1, iy + 1),
        );
        let (Some(c00), Some(c10), Some(c01), Some(c11)) = corners else {
            return false;
        };
        let tx = ((p[0] - self.xs[ix]) / (self.xs[ix + 1] - self.xs[ix])).clamp(0.0, 1.0);
        let ty = ((p[1] - self.ys[iy]) / (self.ys[iy + 1] - self.ys[iy])).clamp(0.0, 1.0);
        rt.clear_targets();
        rt.targets[c00] = (1.0 - tx) * (1.0 - ty);
        rt.targets[c10] = tx * (1.0 - ty);
        rt.targets[c01] = (1.0 - tx) * ty;
        rt.targets[c11] = tx * ty;
        true
    }

    /// Bilinear over the bounding box of the four nearest samples.
    fn nearest_four(&self, rt: &mut BlendRuntime, p: [f32; 2]) -> bool {
        let pos = &self.samples.positions;
        if pos.len() < 4 {
            return false;
        }
        let mut best = [(f32::INFINITY, usize::MAX); 4];
        for (i, q) in pos.iter().enumerate() {
            let d = dist2(p, *q);
            if d < best[3].0 {
                best[3] = (d, i);
                best.sort_by(|a, b| a.0.total_cmp(&b.0));
            }
        }
        let (mut min_x, mut max_x, mut min_y, mut max_y) =
            (f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::NEG_INFINITY);
        for &(_, i) in &best {
            min_x = min_x.min(pos[i][0]);
            max_x = max_x.max(pos[i][0]);
            min_y = min_y.min(pos[i][1]);
            max_y = max_y.max(pos[i][1]);
        }
        let (w, h) = (max_x - min_x, max_y - min_y);
        if w <= AXIS_EPSILON || h <= AXIS_EPSILON {
            return false;
        }
        let tx = ((p[0] - min_x) / w).clamp(0.0, 1.0);
        let ty = ((p[1] - min_y) / h).clamp(0.0, 1.0);
        let mut sum = 0.0;
        let mut raw = [0.0f32; 4];
        for (k, &(_, i)) in best.iter().enumerate() {
            let q = pos[i];
            let fx = if q[0] - min_x <= max_x - q[0] { 1.0 - tx } else { tx };
            let fy = if q[1] - min_y <= max_y - q[1] { 1.0 - ty } else { ty };
            raw[k] = fx * fy;
            sum += raw[k];
        }
        if sum <= 1e-6 {
            return false;
        }
        rt.clear_targets();
        for (k, &(_, i)) in best.iter().enumerate() {
            rt.targets[i] += raw[k] / sum;
        }
        true
    }

    pub(crate) fn update(&self, rt: &mut BlendRuntime, ctx: &ParamContext, dt: f32, immediate: bool) {
        let p = self.samples.advance_input(rt, ctx, dt, immediate);
        if self.samples.positions.len() == 1 {
            self.samples.set_single(rt, 0);
            return;
        }
        if self.grid_cell(rt, p) || self.nearest_four(rt, p) {
            rt.set_weights_from_targets();
            return;
        }
        let nearest = self.samples.nearest(p);
        self.samples.set_single(rt, nearest);
    }
}
