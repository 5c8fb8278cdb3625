//! Shared numeric constants for the simulation core, the HUD geometry, and
//! the engine defaults. Grouped into small namespaces so call sites read as
//! `scale::K_TIME` or `bodies::COUNT`.

/// Scale factors applied to raw kernel tunables.
pub mod scale {
    /// Multiplier folded into every preset's time step; also the factor by
    /// which a step advances the simulated-year accumulator.
    pub const K_TIME: f32 = 0.4;
    /// Multiplier folded into every preset's softening factor.
    pub const K_SOFTENING: f32 = 1.0;
}

/// Body-count defaults and the device-side constraint on them.
pub mod bodies {
    /// Default population size.
    pub const COUNT: usize = 16_384;
    /// GPU compute workgroup width. Body counts handed to a GPU worker must
    /// be a multiple of this.
    pub const WORKGROUP_SIZE: usize = 256;
}

/// HUD button geometry used by the facade hit tests.
pub mod button {
    pub const WIDTH: f32 = 1000.0;
    pub const HEIGHT: f32 = 48.0;
    pub const SPACING: f32 = 32.0;
}

/// Star rendering hints forwarded to the visualizer.
pub mod star {
    pub const SIZE: f32 = 4.0;
    pub const SCALE: f32 = 1.0;
}

/// Engine-level defaults for view manipulation and metering.
pub mod defaults {
    pub const SPEED: f32 = 0.06;
    pub const ROTATION_DELTA: f32 = 0.06;
    pub const SCROLL_ZOOM_SPEED: f32 = 0.5;
    pub const VIEW_DISTANCE: f32 = 30.0;
    /// Sample-window length for the worker rate meters.
    pub const METER_SIZE: usize = 300;
}
