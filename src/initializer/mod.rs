//! # Body Initializer Module
//!
//! Produces the initial position and velocity arrays for a chosen
//! configuration. Positions and velocities are flat `4N` arrays of `f32`
//! laid out as 4-wide tuples: `(x, y, z, mass)` and `(vx, vy, vz, w)` with
//! `w` unused. The 4-wide layout is what the GPU kernel consumes directly,
//! so every generator produces it and the CPU kernels keep it.
//!
//! ## Configurations
//!
//! - **Random**: uniform cloud in the unit ball scaled by the cluster scale,
//!   velocities uniform in the unit ball scaled by the velocity scale.
//! - **Shell**: thick spherical shell with tangential velocities, producing
//!   a coherent rotation about the z axis.
//! - **Expand**: small core with radially outward velocities proportional to
//!   position.
//! - **MwM31**: two disc clusters offset along x, counter-rotating, drifting
//!   toward each other.
//! - **Script**: copies the seed arrays a user script populated through the
//!   script bridge.
//!
//! Initialization is all-or-nothing: a zero population or an unpopulated
//! script seed fails with `SimError::InitEmpty` and produces no arrays.


use rand::Rng;
use rand::prelude::*;
use rand_distr::{UnitBall, UnitSphere, Uniform};

use crate::bridge::ScriptBridge;
use crate::error::SimError;
use crate::params::{Config, SimParams};

/// Seed arrays for one population, 4-wide layout.
#[derive(Debug, Clone)]
pub struct BodyData {
    pub positions: Vec<f32>,
    pub velocities: Vec<f32>,
}

impl BodyData {
    fn with_capacity(n: usize) -> Self {
        BodyData {
            positions: Vec::with_capacity(4 * n),
            velocities: Vec::with_capacity(4 * n),
        }
    }

    /// Number of bodies held.
    pub fn len(&self) -> usize {
        self.positions.len() / 4
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn push(&mut self, position: [f32; 3], mass: f32, velocity: [f32; 3]) {
        self.positions.extend_from_slice(&position);
        self.positions.push(mass);
        self.velocities.extend_from_slice(&velocity);
        self.velocities.push(1.0 / mass);
    }
}

/// Seeds `n` bodies for `config` using a thread-local RNG.
pub fn initialize(
    config: Config,
    n: usize,
    params: &SimParams,
    bridge: &ScriptBridge,
) -> Result<BodyData, SimError> {
    let mut rng = rand::rng();
    initialize_with(&mut rng, config, n, params, bridge)
}

/// Seeds `n` bodies for `config` from a caller-supplied RNG, which makes
/// reproducible populations possible.
pub fn initialize_with<R: Rng + ?Sized>(
    rng: &mut R,
    config: Config,
    n: usize,
    params: &SimParams,
    bridge: &ScriptBridge,
) -> Result<BodyData, SimError> {
    if n == 0 {
        return Err(SimError::InitEmpty);
    }

    match config {
        Config::Random => Ok(random_cloud(rng, n, params)),
        Config::Shell => Ok(rotating_shell(rng, n, params)),
        Config::Expand => Ok(expanding_core(rng, n, params)),
        Config::MwM31 => Ok(colliding_discs(rng, n, params)),
        Config::Script => scripted(n, bridge),
    }
}

/// Narrow mass distribution around 1.
fn mass_distribution() -> Uniform<f32> {
    Uniform::new(0.975, 1.025).expect("mass bounds are ordered")
}

fn random_cloud<R: Rng + ?Sized>(rng: &mut R, n: usize, params: &SimParams) -> BodyData {
    let masses = mass_distribution();
    let mut data = BodyData::with_capacity(n);

    for _ in 0..n {
        let p: [f32; 3] = UnitBall.sample(rng);
        let v: [f32; 3] = UnitBall.sample(rng);
        data.push(
            scaled(p, params.cluster_scale),
            masses.sample(rng),
            scaled(v, params.velocity_scale),
        );
    }

    data
}

fn rotating_shell<R: Rng + ?Sized>(rng: &mut R, n: usize, params: &SimParams) -> BodyData {
    let masses = mass_distribution();
    let thickness = Uniform::new(0.95_f32, 1.05).expect("shell bounds are ordered");
    let mut data = BodyData::with_capacity(n);

    for _ in 0..n {
        let dir: [f32; 3] = UnitSphere.sample(rng);
        let radius = params.cluster_scale * thickness.sample(rng);
        let position = scaled(dir, radius);

        // Tangent to the shell, orthogonal to the z axis projection, so the
        // whole shell rotates coherently about z.
        let tangent = normalized(cross(dir, pick_axis(dir)));

        data.push(
            position,
            masses.sample(rng),
            scaled(tangent, params.velocity_scale),
        );
    }

    data
}

fn expanding_core<R: Rng + ?Sized>(rng: &mut R, n: usize, params: &SimParams) -> BodyData {
    let masses = mass_distribution();
    let core_scale = params.cluster_scale * 0.1;
    let mut data = BodyData::with_capacity(n);

    for _ in 0..n {
        let p: [f32; 3] = UnitBall.sample(rng);
        let position = scaled(p, core_scale);
        // Radial velocity proportional to the position vector.
        let velocity = scaled(position, params.velocity_scale);
        data.push(position, masses.sample(rng), velocity);
    }

    data
}

fn colliding_discs<R: Rng + ?Sized>(rng: &mut R, n: usize, params: &SimParams) -> BodyData {
    let masses = mass_distribution();
    let radii = Uniform::new(0.1_f32, 1.0).expect("disc bounds are ordered");
    let angles = Uniform::new(0.0_f32, std::f32::consts::TAU).expect("angle bounds are ordered");
    let heights = Uniform::new(-0.05_f32, 0.05).expect("height bounds are ordered");

    let offset = 2.0 * params.cluster_scale;
    let drift = 0.25 * params.velocity_scale;
    let half = n / 2;
    let mut data = BodyData::with_capacity(n);

    for i in 0..n {
        // First half forms the disc at -x drifting right, second half the
        // disc at +x drifting left; the spins oppose each other.
        let (center_x, spin) = if i < half { (-offset, 1.0) } else { (offset, -1.0) };

        let r = radii.sample(rng) * params.cluster_scale;
        let angle = angles.sample(rng);
        let position = [
            center_x + r * angle.cos(),
            r * angle.sin(),
            heights.sample(rng) * params.cluster_scale,
        ];

        // Tangential speed for the spin plus the approach drift along x.
        let tangential = params.velocity_scale * spin;
        let velocity = [
            -angle.sin() * tangential - center_x.signum() * drift,
            angle.cos() * tangential,
            0.0,
        ];

        data.push(position, masses.sample(rng), velocity);
    }

    data
}

fn scripted(n: usize, bridge: &ScriptBridge) -> Result<BodyData, SimError> {
    let (points, velocities) = bridge.seeded_arrays().ok_or(SimError::InitEmpty)?;

    if points.len() != 4 * n || velocities.len() != 4 * n {
        return Err(SimError::Size(format!(
            "script seeded {} bodies, worker expects {n}",
            points.len() / 4
        )));
    }

    // The script owns the whole 4-wide tuples, mass component included.
    Ok(BodyData {
        positions: points,
        velocities,
    })
}

fn scaled(v: [f32; 3], factor: f32) -> [f32; 3] {
    [v[0] * factor, v[1] * factor, v[2] * factor]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalized(v: [f32; 3]) -> [f32; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm < f32::EPSILON {
        [0.0, 0.0, 0.0]
    } else {
        scaled(v, 1.0 / norm)
    }
}

/// Helper axis for tangent construction, switched away from z near the
/// poles where the cross product would degenerate.
fn pick_axis(dir: [f32; 3]) -> [f32; 3] {
    if dir[2].abs() > 0.9 {
        [1.0, 0.0, 0.0]
    } else {
        [0.0, 0.0, 1.0]
    }
}
