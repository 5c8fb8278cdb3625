//! # Parameter Record Module
//!
//! The immutable-per-step bundle of kernel tunables that every simulator
//! worker snapshots at reset time: time step, cluster and velocity scales,
//! softening, damping, plus the rendering hints the visualizer consumes and
//! the initial-configuration selector.
//!
//! A fixed table of ten demo presets is provided for the engine's demo
//! cycle. Parameter records are plain `Copy` values; workers receive them by
//! value on reset and never share a mutable copy afterwards.

// Unit tests
pub mod tests;

use serde::{Deserialize, Serialize};

use crate::constants::{bodies, defaults, scale};

/// Initial body configuration selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Config {
    /// Uniform cloud in a scaled unit sphere.
    Random = 0,
    /// Thick rotating spherical shell.
    Shell = 1,
    /// Small core with radially outward velocities.
    Expand = 2,
    /// Two counter-rotating disc clusters on a collision course.
    MwM31 = 3,
    /// Bodies seeded by a user script through the script bridge.
    Script = 4,
}

impl Config {
    pub const COUNT: usize = 5;

    /// Cycles to the next configuration, wrapping after `Script`.
    pub fn next(self) -> Self {
        match self {
            Config::Random => Config::Shell,
            Config::Shell => Config::Expand,
            Config::Expand => Config::MwM31,
            Config::MwM31 => Config::Script,
            Config::Script => Config::Random,
        }
    }
}

/// Kernel tunables and rendering hints for one simulation run.
///
/// `time_step` and `softening` are stored with their global scale factors
/// already folded in, matching the preset table layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimParams {
    /// Integration time step, pre-multiplied by `scale::K_TIME`.
    pub time_step: f32,
    /// Radius scale applied by the body initializers.
    pub cluster_scale: f32,
    /// Velocity scale applied by the body initializers.
    pub velocity_scale: f32,
    /// Gravitational softening factor, pre-multiplied by
    /// `scale::K_SOFTENING`. The kernel uses its square.
    pub softening: f32,
    /// Per-step velocity damping; 1.0 conserves momentum exactly.
    pub damping: f32,
    /// Star point size hint for the visualizer.
    pub point_size: f32,
    /// Initial view rotation about the x axis, degrees.
    pub rotate_x: f32,
    /// Initial view rotation about the y axis, degrees.
    pub rotate_y: f32,
    /// Initial camera distance.
    pub view_distance: f32,
    /// Which initializer seeds the run.
    pub config: Config,
}

impl Default for SimParams {
    fn default() -> Self {
        DEMO_PRESETS[0]
    }
}

impl SimParams {
    /// Returns the preset at `index`, wrapping around the table.
    pub fn preset(index: usize) -> Self {
        DEMO_PRESETS[index % DEMO_PRESETS.len()]
    }

    /// Softening squared, the form the kernel actually consumes.
    pub fn softening_sq(&self) -> f32 {
        self.softening * self.softening
    }

    /// Validates a body count against the GPU workgroup constraint.
    pub fn valid_body_count(n: usize) -> bool {
        n > 0 && n % bodies::WORKGROUP_SIZE == 0
    }
}

/// Demo preset table.
///
/// Column order: time step (pre-scaled), cluster scale, velocity scale,
/// softening (pre-scaled), damping, point size, x rotation, y rotation,
/// view distance, configuration.
pub const DEMO_PRESETS: [SimParams; 10] = [
    preset(0.005, 0.48, 14.0, 0.0921, 0.93, 0.9, 90.0, 20.0, 25.0, Config::Shell),
    preset(0.003, 3.48, 15.0, 0.1221, 0.93, 0.9, 90.0, 20.0, 15.0, Config::Shell),
    preset(0.005, 1.32, 12.0, 0.30, 0.40, 0.18, 90.0, 0.0, 9.0, Config::Shell),
    preset(0.016, 0.68, 12.0, 0.1, 1.0, 1.2, 39.0, 2.0, 50.0, Config::Shell),
    preset(0.0006, 0.16, 10.0, 1.0, 1.0, 0.15, 90.0, 10.0, 5.0, Config::Shell),
    preset(0.0016, 0.32, 27.0, 0.145, 1.0, 0.1, 90.0, 0.0, 4.15, Config::Shell),
    preset(0.016, 0.4, 10.0, 0.15, 1.0, 1.0, 90.0, 0.0, 50.0, Config::Shell),
    preset(0.008, 1.18, 5.0, 0.09, 0.89, 1.2, 90.0, 2.0, 30.0, Config::Shell),
    preset(0.005, 1.48, 13.0, 0.0921, 0.93, 0.9, 90.0, 20.0, 25.0, Config::Shell),
    preset(0.0021, 6.78, 6.0, 0.002215462, 0.97, 1.2, 90.0, 0.0, 30.0, Config::Shell),
];

/// Builds one preset row, folding in the global scale factors the same way
/// for every entry.
const fn preset(
    time_step: f32,
    cluster_scale: f32,
    velocity_scale: f32,
    softening: f32,
    damping: f32,
    point_size: f32,
    rotate_x: f32,
    rotate_y: f32,
    view_distance: f32,
    config: Config,
) -> SimParams {
    SimParams {
        time_step: scale::K_TIME * time_step,
        cluster_scale,
        velocity_scale,
        softening: scale::K_SOFTENING * softening,
        damping,
        point_size,
        rotate_x,
        rotate_y,
        view_distance,
        config,
    }
}

/// Fallback record used before any preset has been applied; mirrors the
/// engine defaults rather than any demo entry.
pub fn baseline() -> SimParams {
    SimParams {
        time_step: scale::K_TIME * 0.016,
        cluster_scale: 1.54,
        velocity_scale: 8.0,
        softening: scale::K_SOFTENING * 0.1,
        damping: 1.0,
        point_size: 1.0,
        rotate_x: 0.0,
        rotate_y: 0.0,
        view_distance: defaults::VIEW_DISTANCE,
        config: Config::Shell,
    }
}
