//! Simulator facade: one worker bundled with its HUD affordances.
//!
//! The facade owns the worker, a display label derived from the device name,
//! and the dock button used to select this simulator. Lifecycle operations
//! and queries delegate straight to the worker; the button logic is a pure
//! UI query over click coordinates.

use std::sync::Arc;

use crate::bridge::ScriptBridge;
use crate::constants::button;
use crate::error::SimError;
use crate::params::SimParams;
use crate::worker::{DeviceKind, Worker, WorkerState};

/// Dock button geometry and selection state for one facade.
#[derive(Debug, Clone, Copy)]
pub struct Button {
    /// Lower-left corner of the button in dock coordinates.
    pub origin: (f32, f32),
    pub width: f32,
    pub height: f32,
    pub selected: bool,
}

impl Button {
    fn new() -> Self {
        Button {
            origin: (0.0, 0.0),
            width: button::WIDTH,
            height: button::HEIGHT,
            selected: false,
        }
    }

    /// True when `point` falls within the button bounds.
    pub fn hit(&self, point: (f32, f32)) -> bool {
        point.0 >= self.origin.0
            && point.0 <= self.origin.0 + self.width
            && point.1 >= self.origin.1
            && point.1 <= self.origin.1 + self.height
    }
}

/// A worker plus its label and dock button.
pub struct Facade {
    worker: Worker,
    label: String,
    button: Button,
}

impl Facade {
    /// Creates and initializes the facade's worker. A device acquisition
    /// failure propagates so the mediator can drop this facade from the
    /// selectable set.
    pub fn new(
        kind: DeviceKind,
        body_count: usize,
        params: SimParams,
        bridge: Arc<ScriptBridge>,
    ) -> Result<Self, SimError> {
        let mut worker = Worker::new(kind, body_count, params, bridge);
        worker.initialize()?;

        let label = match kind {
            DeviceKind::CpuSingle => String::from("CPU single-core"),
            DeviceKind::CpuMulti => String::from("CPU multi-core"),
            DeviceKind::GpuPrimary | DeviceKind::GpuSecondary => {
                format!("GPU: {}", worker.name())
            }
        };

        Ok(Facade {
            worker,
            label,
            button: Button::new(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> DeviceKind {
        self.worker.kind()
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub fn worker_mut(&mut self) -> &mut Worker {
        &mut self.worker
    }

    // Lifecycle delegation

    pub fn start(&mut self, paused: bool) -> Result<(), SimError> {
        self.worker.start(paused)
    }

    pub fn stop(&mut self) {
        self.worker.stop();
    }

    pub fn pause(&self) {
        self.worker.pause();
    }

    pub fn unpause(&self) {
        self.worker.unpause();
    }

    pub fn reset_params(&self, params: SimParams) {
        self.worker.reset_params(params);
    }

    pub fn invalidate(&self, stale: bool) {
        self.worker.invalidate(stale);
    }

    // Kind queries

    pub fn is_cpu_single_core(&self) -> bool {
        self.kind() == DeviceKind::CpuSingle
    }

    pub fn is_cpu_multi_core(&self) -> bool {
        self.kind() == DeviceKind::CpuMulti
    }

    pub fn is_gpu_primary(&self) -> bool {
        self.kind() == DeviceKind::GpuPrimary
    }

    pub fn is_gpu_secondary(&self) -> bool {
        self.kind() == DeviceKind::GpuSecondary
    }

    // Worker queries

    pub fn is_paused(&self) -> bool {
        self.worker.is_paused()
    }

    pub fn is_stopped(&self) -> bool {
        self.worker.is_stopped()
    }

    pub fn is_acquired(&self) -> bool {
        self.worker.is_acquired()
    }

    pub fn state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn performance(&self) -> f64 {
        self.worker.performance()
    }

    pub fn updates(&self) -> f64 {
        self.worker.updates()
    }

    pub fn year(&self) -> f64 {
        self.worker.year()
    }

    pub fn size(&self) -> usize {
        self.worker.size()
    }

    // Data delegation

    pub fn position(&self, dst: &mut [f32]) -> Result<usize, SimError> {
        self.worker.position(dst)
    }

    pub fn position_in_range(&self, dst: &mut [f32]) -> Result<usize, SimError> {
        self.worker.position_in_range(dst)
    }

    pub fn velocity(&self, dst: &mut [f32]) -> Result<usize, SimError> {
        self.worker.velocity(dst)
    }

    pub fn set_position(&self, src: &[f32]) -> Result<(), SimError> {
        self.worker.set_position(src)
    }

    pub fn set_velocity(&self, src: &[f32]) -> Result<(), SimError> {
        self.worker.set_velocity(src)
    }

    pub fn set_range(&self, min: usize, max: usize) {
        self.worker.set_range(min, max);
    }

    // Button

    /// Places the dock button; called by the HUD layout pass.
    pub fn set_button_origin(&mut self, x: f32, y: f32) {
        self.button.origin = (x, y);
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.button.selected = selected;
    }

    /// Pure UI query: whether `point` hits this facade's button and whether
    /// the facade is currently the selected one.
    pub fn button(&self, point: (f32, f32)) -> (bool, bool) {
        (self.button.hit(point), self.button.selected)
    }

    pub fn button_geometry(&self) -> Button {
        self.button
    }
}

#[cfg(test)]
mod units {
    use super::*;
    use crate::params::Config;

    fn facade() -> Facade {
        let mut params = SimParams::preset(0);
        params.config = Config::Random;
        let bridge = Arc::new(ScriptBridge::new(64));
        Facade::new(DeviceKind::CpuSingle, 64, params, bridge).expect("cpu facade")
    }

    #[test]
    fn label_names_the_device_class() {
        let f = facade();
        assert_eq!(f.label(), "CPU single-core");
        assert!(f.is_cpu_single_core());
        assert!(!f.is_gpu_primary());
    }

    #[test]
    fn button_hit_test_respects_bounds() {
        let mut f = facade();
        f.set_button_origin(100.0, 200.0);

        let (hit, selected) = f.button((150.0, 210.0));
        assert!(hit);
        assert!(!selected);

        let (miss, _) = f.button((99.0, 210.0));
        assert!(!miss);
        let (miss, _) = f.button((150.0, 200.0 + button::HEIGHT + 1.0));
        assert!(!miss);
    }

    #[test]
    fn selection_flag_reports_through_button_query() {
        let mut f = facade();
        f.set_selected(true);
        let (_, selected) = f.button((0.0, 0.0));
        assert!(selected);
    }
}
