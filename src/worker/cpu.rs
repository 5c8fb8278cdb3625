//! CPU compute backends.
//!
//! Two flavors share one kernel: the single-core variant walks the outer
//! loop serially on the worker thread, the multi-core variant fans the outer
//! loop out across the rayon pool in equally sized chunks and joins before
//! the buffers swap roles. Both read the front pair, write the back pair and
//! swap, so a completed step always leaves two self-consistent populations.

use rayon::prelude::*;

use crate::error::SimError;
use crate::params::SimParams;
use crate::worker::ComputeBackend;

/// Body-state double buffer on the host.
pub struct CpuBackend {
    threaded: bool,
    name: String,
    body_count: usize,
    positions: Vec<f32>,
    velocities: Vec<f32>,
    back_positions: Vec<f32>,
    back_velocities: Vec<f32>,
}

impl CpuBackend {
    /// Serial variant: one thread, straight loop.
    pub fn single(body_count: usize) -> Self {
        CpuBackend::new(body_count, false)
    }

    /// Parallel variant: outer loop split across the rayon pool.
    pub fn pooled(body_count: usize) -> Self {
        CpuBackend::new(body_count, true)
    }

    fn new(body_count: usize, threaded: bool) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let name = if threaded {
            format!("CPU ({cores} cores)")
        } else {
            String::from("CPU (1 core)")
        };

        CpuBackend {
            threaded,
            name,
            body_count,
            positions: vec![0.0; 4 * body_count],
            velocities: vec![0.0; 4 * body_count],
            back_positions: vec![0.0; 4 * body_count],
            back_velocities: vec![0.0; 4 * body_count],
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn device_count(&self) -> u32 {
        1
    }

    fn load(&mut self, positions: &[f32], velocities: &[f32]) -> Result<(), SimError> {
        if positions.len() != 4 * self.body_count || velocities.len() != 4 * self.body_count {
            return Err(SimError::Size(format!(
                "expected {} elements, got {}/{}",
                4 * self.body_count,
                positions.len(),
                velocities.len()
            )));
        }
        self.positions.copy_from_slice(positions);
        self.velocities.copy_from_slice(velocities);
        Ok(())
    }

    fn advance(&mut self, params: &SimParams, range: (usize, usize)) -> Result<(), SimError> {
        {
            let src_positions = &self.positions;
            let src_velocities = &self.velocities;

            if self.threaded {
                // Fan the outer i-loop out; each task owns a disjoint slice
                // of the write buffers, all reads go to the front pair.
                self.back_positions
                    .par_chunks_mut(4)
                    .zip(self.back_velocities.par_chunks_mut(4))
                    .enumerate()
                    .for_each(|(i, (position_out, velocity_out))| {
                        integrate_into(
                            i,
                            src_positions,
                            src_velocities,
                            params,
                            range,
                            position_out,
                            velocity_out,
                        );
                    });
            } else {
                self.back_positions
                    .chunks_mut(4)
                    .zip(self.back_velocities.chunks_mut(4))
                    .enumerate()
                    .for_each(|(i, (position_out, velocity_out))| {
                        integrate_into(
                            i,
                            src_positions,
                            src_velocities,
                            params,
                            range,
                            position_out,
                            velocity_out,
                        );
                    });
            }
        }

        // Role swap: the freshly written pair becomes the front.
        std::mem::swap(&mut self.positions, &mut self.back_positions);
        std::mem::swap(&mut self.velocities, &mut self.back_velocities);
        Ok(())
    }

    fn positions(&self) -> &[f32] {
        &self.positions
    }

    fn velocities(&self) -> &[f32] {
        &self.velocities
    }
}

fn integrate_into(
    i: usize,
    positions: &[f32],
    velocities: &[f32],
    params: &SimParams,
    range: (usize, usize),
    position_out: &mut [f32],
    velocity_out: &mut [f32],
) {
    if i < range.0 || i >= range.1 {
        // Outside the integration window: carry through unchanged.
        position_out.copy_from_slice(&positions[4 * i..4 * i + 4]);
        velocity_out.copy_from_slice(&velocities[4 * i..4 * i + 4]);
        return;
    }
    let (position, velocity) = integrate_body(i, positions, velocities, params);
    position_out.copy_from_slice(&position);
    velocity_out.copy_from_slice(&velocity);
}

/// Advances body `i` one step against the whole population.
///
/// Softened accumulation followed by the fixed update order every backend
/// shares: velocity first (damped, plus acceleration), then position from
/// the new velocity. The self-interaction term contributes zero because the
/// displacement is zero while the softened denominator is not.
pub fn integrate_body(
    i: usize,
    positions: &[f32],
    velocities: &[f32],
    params: &SimParams,
) -> ([f32; 4], [f32; 4]) {
    let n = positions.len() / 4;
    let px = positions[4 * i];
    let py = positions[4 * i + 1];
    let pz = positions[4 * i + 2];
    let softening_sq = params.softening_sq();

    let mut ax = 0.0_f32;
    let mut ay = 0.0_f32;
    let mut az = 0.0_f32;

    for j in 0..n {
        let dx = positions[4 * j] - px;
        let dy = positions[4 * j + 1] - py;
        let dz = positions[4 * j + 2] - pz;

        let r2 = dx * dx + dy * dy + dz * dz + softening_sq;
        let inv = 1.0 / r2.sqrt();
        let s = positions[4 * j + 3] * inv * inv * inv;

        ax += dx * s;
        ay += dy * s;
        az += dz * s;
    }

    let dt = params.time_step;
    let vx = velocities[4 * i] * params.damping + ax * dt;
    let vy = velocities[4 * i + 1] * params.damping + ay * dt;
    let vz = velocities[4 * i + 2] * params.damping + az * dt;

    (
        [px + vx * dt, py + vy * dt, pz + vz * dt, positions[4 * i + 3]],
        [vx, vy, vz, velocities[4 * i + 3]],
    )
}
