//! # Script Bridge Module
//!
//! Read-mostly surface the core exports to the embedded scripting runtime.
//! Scripts see three scalars (`particleCount`, `scale`, `vscale`), the last
//! frame timings, the OS user name, and two flat 1-based arrays (`points`,
//! `velocities`) they may read and write.
//!
//! Writes never touch a device buffer or an in-step worker buffer. They land
//! in host-only seed storage that the body initializer's `Script`
//! configuration copies into the active worker on the next reset, so the
//! worker's buffer role-swap invariant is untouchable from script code.
//!
//! The indexed arrays are 1-based on the script side per the embedded
//! language's convention; the bridge converts to 0-based before touching the
//! buffer and bounds-checks every access.

// Unit tests
pub mod tests;

use std::sync::Mutex;

use crate::error::SimError;

/// Value crossing the script boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Number(f64),
    Text(String),
}

/// Names the bridge registers with the embedded runtime's function table.
const ZERO_ARG_FUNCTIONS: [&str; 6] = [
    "universe.particleCount",
    "universe.scale",
    "universe.vscale",
    "universe.fps",
    "universe.deltaTime",
    "system.user",
];

struct Seed {
    particle_count: usize,
    scale: f32,
    vscale: f32,
    fps: f32,
    delta_time: f32,
    /// Flat 4-wide position seed storage, `4 * particle_count` elements.
    points: Vec<f32>,
    /// Flat 4-wide velocity seed storage, same length as `points`.
    velocities: Vec<f32>,
    /// Set on the first script write; an unwritten seed store means a
    /// script configuration has nothing to hand the initializer.
    written: bool,
}

/// Shared host-side seed store and call surface.
///
/// Instantiated once and injected into the initializer and the engine. The
/// scale factors are snapshots of the active parameter record, refreshed by
/// the engine at every reset.
pub struct ScriptBridge {
    seed: Mutex<Seed>,
}

impl ScriptBridge {
    /// Creates a bridge with zeroed seed storage for `particle_count` bodies.
    pub fn new(particle_count: usize) -> Self {
        ScriptBridge {
            seed: Mutex::new(Seed {
                particle_count,
                scale: 1.0,
                vscale: 1.0,
                fps: 0.0,
                delta_time: 0.0,
                points: vec![0.0; 4 * particle_count],
                velocities: vec![0.0; 4 * particle_count],
                written: false,
            }),
        }
    }

    /// Reconfigures the exposed scalars and resizes the seed arrays.
    ///
    /// Called by the engine on every parameter reset. Clears the written
    /// flag so a stale seed from a previous configuration cannot leak into
    /// the next script reset.
    pub fn configure(&self, particle_count: usize, scale: f32, vscale: f32) {
        let mut seed = self.seed.lock().unwrap();
        seed.particle_count = particle_count;
        seed.scale = scale;
        seed.vscale = vscale;
        seed.points.clear();
        seed.points.resize(4 * particle_count, 0.0);
        seed.velocities.clear();
        seed.velocities.resize(4 * particle_count, 0.0);
        seed.written = false;
    }

    /// Publishes the last frame timings for `universe.fps()` and
    /// `universe.deltaTime()`.
    pub fn set_frame_timing(&self, fps: f32, delta_time: f32) {
        let mut seed = self.seed.lock().unwrap();
        seed.fps = fps;
        seed.delta_time = delta_time;
    }

    pub fn particle_count(&self) -> usize {
        self.seed.lock().unwrap().particle_count
    }

    pub fn scale(&self) -> f32 {
        self.seed.lock().unwrap().scale
    }

    pub fn vscale(&self) -> f32 {
        self.seed.lock().unwrap().vscale
    }

    pub fn fps(&self) -> f32 {
        self.seed.lock().unwrap().fps
    }

    pub fn delta_time(&self) -> f32 {
        self.seed.lock().unwrap().delta_time
    }

    /// OS user name, as `system.user()` reports it.
    pub fn user(&self) -> String {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| String::from("unknown"))
    }

    /// Reads `points[index]` with the script's 1-based indexing.
    pub fn points_get(&self, index: usize) -> Result<f32, SimError> {
        let seed = self.seed.lock().unwrap();
        let flat = to_flat_index(index, seed.points.len(), "points")?;
        Ok(seed.points[flat])
    }

    /// Writes `points[index] = value` with the script's 1-based indexing.
    pub fn points_set(&self, index: usize, value: f32) -> Result<(), SimError> {
        let mut seed = self.seed.lock().unwrap();
        let flat = to_flat_index(index, seed.points.len(), "points")?;
        seed.points[flat] = value;
        seed.written = true;
        Ok(())
    }

    /// Reads `velocities[index]` with the script's 1-based indexing.
    pub fn velocities_get(&self, index: usize) -> Result<f32, SimError> {
        let seed = self.seed.lock().unwrap();
        let flat = to_flat_index(index, seed.velocities.len(), "velocities")?;
        Ok(seed.velocities[flat])
    }

    /// Writes `velocities[index] = value` with the script's 1-based indexing.
    pub fn velocities_set(&self, index: usize, value: f32) -> Result<(), SimError> {
        let mut seed = self.seed.lock().unwrap();
        let flat = to_flat_index(index, seed.velocities.len(), "velocities")?;
        seed.velocities[flat] = value;
        seed.written = true;
        Ok(())
    }

    /// Hands the initializer a copy of the script-populated seed arrays, or
    /// `None` when no script has written since the last configure.
    pub fn seeded_arrays(&self) -> Option<(Vec<f32>, Vec<f32>)> {
        let seed = self.seed.lock().unwrap();
        if seed.written {
            Some((seed.points.clone(), seed.velocities.clone()))
        } else {
            None
        }
    }

    /// Dispatches a call from the embedded runtime's function table.
    ///
    /// All registered functions take no arguments; passing any yields a
    /// diagnostic naming the function, mirroring the runtime's own error
    /// convention.
    pub fn call(&self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, SimError> {
        if !ZERO_ARG_FUNCTIONS.contains(&name) {
            return Err(SimError::Script(format!("unknown function {name}()")));
        }
        if !args.is_empty() {
            return Err(SimError::Script(format!("too many arguments for {name}()")));
        }
        let value = match name {
            "universe.particleCount" => ScriptValue::Number(self.particle_count() as f64),
            "universe.scale" => ScriptValue::Number(self.scale() as f64),
            "universe.vscale" => ScriptValue::Number(self.vscale() as f64),
            "universe.fps" => ScriptValue::Number(self.fps() as f64),
            "universe.deltaTime" => ScriptValue::Number(self.delta_time() as f64),
            "system.user" => ScriptValue::Text(self.user()),
            _ => unreachable!("name checked against the registration table"),
        };
        Ok(value)
    }
}

/// Converts a 1-based script index into a flat 0-based offset, rejecting
/// anything outside `1..=len`.
fn to_flat_index(index: usize, len: usize, array: &str) -> Result<usize, SimError> {
    if index == 0 || index > len {
        return Err(SimError::Script(format!(
            "index {index} out of range for {array} (1..={len})"
        )));
    }
    Ok(index - 1)
}
