//! # Mediator Module
//!
//! Owns the ordered facade set and routes the active computation between
//! devices on demand. At most one facade is active at any instant; only the
//! active facade's worker runs unpaused, and only the active facade
//! publishes positions to the renderer.
//!
//! ## Hand-off
//!
//! Switching the active facade transfers the live population:
//!
//! 1. pause the outgoing worker and wait for its in-flight step to finish,
//! 2. copy its published positions and velocities into host scratch,
//! 3. inject both into the incoming worker, which swaps them in as its next
//!    readable state,
//! 4. clear the incoming meters so the hand-off is not measured as a step,
//! 5. mark the incoming facade active and unpause it.
//!
//! The outgoing worker stays started-but-paused so switching back is cheap.
//!
//! The render thread owns the mediator, so `select` and `update` are `&mut
//! self`: the exclusive borrow is the single linearization point between a
//! switch and a snapshot poll, and a frame observes either the outgoing
//! worker's state (before step 1) or the incoming worker's (after step 5).


use std::sync::Arc;

use log::{info, warn};

use crate::bridge::ScriptBridge;
use crate::error::SimError;
use crate::facade::Facade;
use crate::params::SimParams;
use crate::worker::DeviceKind;

/// Facade set, active selection and the shared render snapshot.
pub struct Mediator {
    facades: Vec<Facade>,
    active: usize,
    params: SimParams,
    body_count: usize,
    /// Render snapshot scratch, `4N` elements, refreshed by `update`.
    snapshot: Vec<f32>,
    /// Hand-off scratch for positions and velocities.
    scratch_positions: Vec<f32>,
    scratch_velocities: Vec<f32>,
    has_position: bool,
    /// User-level pause; a switch performed while paused leaves the
    /// incoming worker parked.
    paused: bool,
}

impl Mediator {
    /// Builds one facade per available device, seeds every worker with the
    /// given parameter record and starts them all paused, then unpauses the
    /// preferred one.
    ///
    /// Facades whose device cannot be acquired are dropped from the
    /// selectable set; the single-core CPU facade always succeeds, so the
    /// set is never empty.
    pub fn new(
        params: SimParams,
        body_count: usize,
        bridge: Arc<ScriptBridge>,
    ) -> Result<Self, SimError> {
        let mut facades = Vec::new();
        for kind in DeviceKind::ALL {
            match Facade::new(kind, body_count, params, Arc::clone(&bridge)) {
                Ok(facade) => {
                    info!("simulator available: {}", facade.label());
                    facades.push(facade);
                }
                Err(e) => {
                    info!("simulator unavailable ({kind:?}): {e}");
                }
            }
        }
        if facades.is_empty() {
            return Err(SimError::Device(String::from("no simulator available")));
        }

        // Seed and park every worker; the dock lays its buttons out in
        // facade order.
        for (index, facade) in facades.iter_mut().enumerate() {
            facade.worker().reset()?;
            facade.start(true)?;
            let y = index as f32
                * (crate::constants::button::HEIGHT + crate::constants::button::SPACING);
            facade.set_button_origin(0.0, y);
        }

        let active = preferred_index(&facades);
        facades[active].set_selected(true);
        facades[active].unpause();
        info!("active simulator: {}", facades[active].label());

        Ok(Mediator {
            facades,
            active,
            params,
            body_count,
            snapshot: vec![0.0; 4 * body_count],
            scratch_positions: vec![0.0; 4 * body_count],
            scratch_velocities: vec![0.0; 4 * body_count],
            has_position: false,
            paused: false,
        })
    }

    /// Switches the active facade to `kind`, carrying the live population
    /// across per the hand-off protocol.
    pub fn select(&mut self, kind: DeviceKind) -> Result<(), SimError> {
        let target = self
            .facades
            .iter()
            .position(|f| f.kind() == kind)
            .ok_or_else(|| SimError::Device(format!("no simulator for {kind:?}")))?;
        self.select_index(target)
    }

    /// Switches the active facade by position in the facade list.
    pub fn select_index(&mut self, target: usize) -> Result<(), SimError> {
        if target >= self.facades.len() {
            return Err(SimError::Device(format!("no simulator at index {target}")));
        }
        if target == self.active {
            return Ok(());
        }
        if self.facades[target].is_stopped() || !self.facades[target].is_acquired() {
            return Err(SimError::Device(format!(
                "simulator {} is not selectable",
                self.facades[target].label()
            )));
        }

        // Drain the outgoing step, then move its latest state across. A
        // worker whose device was lost still hands over the last state it
        // published.
        let outgoing = &self.facades[self.active];
        outgoing.pause();
        if outgoing.worker().has_failed() {
            outgoing
                .worker()
                .last_published(&mut self.scratch_positions, &mut self.scratch_velocities);
        } else {
            outgoing.position(&mut self.scratch_positions)?;
            outgoing.velocity(&mut self.scratch_velocities)?;
        }

        let incoming = &self.facades[target];
        incoming.set_position(&self.scratch_positions)?;
        incoming.set_velocity(&self.scratch_velocities)?;
        incoming.worker().reset_meters();

        self.facades[self.active].set_selected(false);
        self.facades[target].set_selected(true);
        self.active = target;
        if !self.paused {
            self.facades[target].unpause();
        }

        info!("switched to {}", self.facades[target].label());
        Ok(())
    }

    /// Broadcasts a new parameter record to every worker, active one
    /// included; each reseeds at its next step boundary.
    pub fn reset(&mut self, params: SimParams) {
        self.params = params;
        for facade in &self.facades {
            facade.reset_params(params);
        }
    }

    /// Polls the active worker's latest positions into the shared snapshot.
    /// Fails over to the single-core CPU worker when the active device has
    /// been lost.
    pub fn update(&mut self) {
        if self.facades[self.active].worker().has_failed() {
            self.failover();
        }
        let facade = &self.facades[self.active];
        match facade.position(&mut self.snapshot) {
            Ok(_) => self.has_position = true,
            Err(e) => warn!("snapshot poll failed on {}: {e}", facade.label()),
        }
    }

    /// Moves the last known state of a failed active worker onto the
    /// single-core CPU worker, which is always available.
    fn failover(&mut self) {
        let fallback = match self
            .facades
            .iter()
            .position(|f| f.is_cpu_single_core() && !f.worker().has_failed())
        {
            Some(index) if index != self.active => index,
            _ => return,
        };

        let failed = &self.facades[self.active];
        warn!("device lost on {}; failing over", failed.label());
        failed
            .worker()
            .last_published(&mut self.scratch_positions, &mut self.scratch_velocities);

        let incoming = &self.facades[fallback];
        if incoming.set_position(&self.scratch_positions).is_err()
            || incoming.set_velocity(&self.scratch_velocities).is_err()
        {
            return;
        }
        incoming.worker().reset_meters();

        self.facades[self.active].set_selected(false);
        self.facades[fallback].set_selected(true);
        self.active = fallback;
        if !self.paused {
            self.facades[fallback].unpause();
        }
        info!("failover complete: {}", self.facades[fallback].label());
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.facades[self.active].pause();
    }

    pub fn unpause(&mut self) {
        self.paused = false;
        self.facades[self.active].unpause();
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Delegates a dock click to the active facade's button.
    pub fn button(&self, point: (f32, f32)) -> (bool, bool) {
        self.facades[self.active].button(point)
    }

    /// Finds the facade whose dock button contains `point`.
    pub fn button_at(&self, point: (f32, f32)) -> Option<usize> {
        self.facades.iter().position(|f| f.button(point).0)
    }

    // Accessors for the active simulator

    pub fn performance(&self) -> f64 {
        self.facades[self.active].performance()
    }

    pub fn updates(&self) -> f64 {
        self.facades[self.active].updates()
    }

    /// Latest render snapshot; valid once `has_position` reports true.
    pub fn position(&self) -> &[f32] {
        &self.snapshot
    }

    pub fn has_position(&self) -> bool {
        self.has_position
    }

    pub fn is_cpu_single_core(&self) -> bool {
        self.facades[self.active].is_cpu_single_core()
    }

    pub fn is_cpu_multi_core(&self) -> bool {
        self.facades[self.active].is_cpu_multi_core()
    }

    pub fn is_gpu_primary(&self) -> bool {
        self.facades[self.active].is_gpu_primary()
    }

    pub fn is_gpu_secondary(&self) -> bool {
        self.facades[self.active].is_gpu_secondary()
    }

    pub fn count(&self) -> usize {
        self.facades.len()
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_kind(&self) -> DeviceKind {
        self.facades[self.active].kind()
    }

    pub fn params(&self) -> SimParams {
        self.params
    }

    pub fn body_count(&self) -> usize {
        self.body_count
    }

    pub fn facades(&self) -> &[Facade] {
        &self.facades
    }

    pub fn active_facade(&self) -> &Facade {
        &self.facades[self.active]
    }

    pub fn facade(&self, index: usize) -> Option<&Facade> {
        self.facades.get(index)
    }

    /// Stops every worker and releases the devices.
    pub fn shutdown(&mut self) {
        for facade in &mut self.facades {
            facade.worker_mut().terminate();
        }
    }
}

impl Drop for Mediator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Fastest available facade: GPU primary, then multi-core CPU, then the
/// single-core baseline.
fn preferred_index(facades: &[Facade]) -> usize {
    for kind in [
        DeviceKind::GpuPrimary,
        DeviceKind::CpuMulti,
        DeviceKind::CpuSingle,
    ] {
        if let Some(index) = facades.iter().position(|f| f.kind() == kind) {
            return index;
        }
    }
    0
}
