//! # Simulator Worker Module
//!
//! One worker per compute device. A worker owns the device's double-buffered
//! body state, advances the system one integration step at a time on its own
//! thread, and exposes read-only snapshots that are safe to copy while the
//! step loop runs.
//!
//! ## Architecture Overview
//!
//! The worker splits into a device-specific compute backend and a shared
//! control shell:
//!
//! - [`ComputeBackend`] is the capability seam every device implements:
//!   load a population, advance it one step, expose the freshly written
//!   buffers. Backends live in [`cpu`] and [`gpu`].
//! - [`Worker`] is the handle the facade and mediator talk to. It owns the
//!   worker thread, the lifecycle state machine, the pause/stop/reload
//!   flags, the rate meters, and the exchange.
//!
//! ## Double Buffering and the Exchange
//!
//! Each backend computes a step by reading its front buffers and writing its
//! back buffers, then swapping roles. After every completed step the worker
//! publishes the new front buffers into the *exchange*, a host-side copy of
//! positions, velocities, step counter and year guarded by the clock lock.
//! Readers only ever touch the exchange, so they see either the previous
//! step or the new one in full, never a torn mixture, and positions and
//! velocities always belong to the same step.
//!
//! ## Concurrency Model
//!
//! Two locks per worker, acquired in a fixed order (`run` before `clock`):
//!
//! - The `run` lock is held for the duration of each step. `pause()` sets
//!   the paused flag and then takes the lock once, which drains any
//!   in-flight step before returning.
//! - The `clock` lock guards the exchange. Readers take only this lock.
//!
//! Pause and stop are cooperative atomic flags polled at step boundaries;
//! the loop yields while paused. There are no condition variables.

// Unit tests
pub mod tests;
// CPU backends (serial and rayon fan-out)
pub mod cpu;
// GPU backend (wgpu compute)
pub mod gpu;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, info, warn};

use crate::bridge::ScriptBridge;
use crate::constants::scale;
use crate::error::SimError;
use crate::initializer;
use crate::meters::{self, Meter};
use crate::params::SimParams;

/// Compute device identifiers, in the mediator's facade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    CpuSingle = 0,
    CpuMulti = 1,
    GpuPrimary = 2,
    GpuSecondary = 3,
}

impl DeviceKind {
    pub const COUNT: usize = 4;

    pub const ALL: [DeviceKind; Self::COUNT] = [
        DeviceKind::CpuSingle,
        DeviceKind::CpuMulti,
        DeviceKind::GpuPrimary,
        DeviceKind::GpuSecondary,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_gpu(self) -> bool {
        matches!(self, DeviceKind::GpuPrimary | DeviceKind::GpuSecondary)
    }
}

/// Worker lifecycle states.
///
/// Transitions: `Created → Initialized → Running → Stopped → Terminated`,
/// with `Stopped → Running` allowed via `start`. Operations outside the
/// allowed set for the current state fail with `SimError::State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created = 0,
    Initialized = 1,
    Running = 2,
    Stopped = 3,
    Terminated = 4,
}

impl WorkerState {
    fn from_u8(value: u8) -> WorkerState {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Initialized,
            2 => WorkerState::Running,
            3 => WorkerState::Stopped,
            _ => WorkerState::Terminated,
        }
    }
}

/// Device-specific compute capability.
///
/// A backend owns the device-resident double buffers. `advance` reads the
/// front pair, writes the back pair and swaps roles; after it returns,
/// `positions`/`velocities` expose the new front state on the host.
pub trait ComputeBackend: Send {
    /// Human-readable device name.
    fn device_name(&self) -> &str;

    /// Number of physical devices behind this backend.
    fn device_count(&self) -> u32;

    /// Replaces the front buffers with a full population. The slices must
    /// be exactly `4 * n` long.
    fn load(&mut self, positions: &[f32], velocities: &[f32]) -> Result<(), SimError>;

    /// Advances bodies in `range` by one step; bodies outside the range are
    /// carried through unchanged so both buffers stay self-consistent.
    fn advance(&mut self, params: &SimParams, range: (usize, usize)) -> Result<(), SimError>;

    /// Host view of the current front positions.
    fn positions(&self) -> &[f32];

    /// Host view of the current front velocities.
    fn velocities(&self) -> &[f32];

    /// Forces a device-to-host refresh of the front buffers. Host-resident
    /// backends have nothing to do.
    fn refresh(&mut self) -> Result<(), SimError> {
        Ok(())
    }
}

/// Host-side publication of the latest completed step.
///
/// Positions and velocities are published together under the clock lock, so
/// a reader can never pair buffers from different steps.
pub struct Exchange {
    pub positions: Vec<f32>,
    pub velocities: Vec<f32>,
    pub step: u64,
    pub year: f64,
}

/// Step index sentinel meaning "never inject a failure".
const NO_FAULT: u64 = u64::MAX;

/// State shared between the worker handle and its thread.
struct Shared {
    /// Clock lock: exchange publication against readers.
    clock: Mutex<Exchange>,
    /// Run lock: step execution against pause/stop/state mutation.
    run: Mutex<()>,
    /// The device backend; `None` before initialize and after terminate.
    backend: Mutex<Option<Box<dyn ComputeBackend>>>,
    /// Live copy of the active parameter record.
    params: Mutex<SimParams>,
    /// Description of a fatal failure, if one happened.
    failure: Mutex<Option<String>>,

    paused: AtomicBool,
    stop: AtomicBool,
    /// Reseed from the initializer at the next step boundary.
    reload: AtomicBool,
    /// Exchange holds externally injected state the backend has not seen.
    seed_pending: AtomicBool,
    /// Host shadow marked stale; republish from the device when convenient.
    invalidated: AtomicBool,
    failed: AtomicBool,
    state: AtomicU8,

    /// Inject a device loss when the step counter would reach this value.
    fail_at: AtomicU64,

    range_min: AtomicUsize,
    range_max: AtomicUsize,

    /// Step-rate meter; throughput is derived from it.
    rate: Meter,

    bridge: Arc<ScriptBridge>,
    body_count: usize,
}

/// One simulator worker: device backend + thread + control surface.
pub struct Worker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
    kind: DeviceKind,
    device_name: String,
    device_count: u32,
}

impl Worker {
    /// Creates a worker in the `Created` state. No device is touched until
    /// `initialize`.
    pub fn new(
        kind: DeviceKind,
        body_count: usize,
        params: SimParams,
        bridge: Arc<ScriptBridge>,
    ) -> Self {
        Worker {
            shared: Arc::new(Shared {
                clock: Mutex::new(Exchange {
                    positions: vec![0.0; 4 * body_count],
                    velocities: vec![0.0; 4 * body_count],
                    step: 0,
                    year: 0.0,
                }),
                run: Mutex::new(()),
                backend: Mutex::new(None),
                params: Mutex::new(params),
                failure: Mutex::new(None),
                paused: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                reload: AtomicBool::new(false),
                seed_pending: AtomicBool::new(false),
                invalidated: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                state: AtomicU8::new(WorkerState::Created as u8),
                fail_at: AtomicU64::new(NO_FAULT),
                range_min: AtomicUsize::new(0),
                range_max: AtomicUsize::new(body_count),
                rate: Meter::new(),
                bridge,
                body_count,
            }),
            thread: None,
            kind,
            device_name: String::new(),
            device_count: 0,
        }
    }

    /// Acquires the device and allocates both buffer pairs.
    ///
    /// Fails with `SimError::Device` when the device cannot be acquired and
    /// `SimError::Size` when the population violates a device constraint;
    /// in both cases the worker stays in `Created`.
    pub fn initialize(&mut self) -> Result<(), SimError> {
        self.expect_state(WorkerState::Created)?;

        let backend: Box<dyn ComputeBackend> = match self.kind {
            DeviceKind::CpuSingle => Box::new(cpu::CpuBackend::single(self.shared.body_count)),
            DeviceKind::CpuMulti => Box::new(cpu::CpuBackend::pooled(self.shared.body_count)),
            DeviceKind::GpuPrimary => Box::new(gpu::GpuBackend::acquire(self.shared.body_count, 0)?),
            DeviceKind::GpuSecondary => {
                Box::new(gpu::GpuBackend::acquire(self.shared.body_count, 1)?)
            }
        };

        self.device_name = backend.device_name().to_string();
        self.device_count = backend.device_count();
        *self.shared.backend.lock().unwrap() = Some(backend);
        self.set_state(WorkerState::Initialized);

        info!(
            "initialized {:?} worker on {} ({} bodies)",
            self.kind, self.device_name, self.shared.body_count
        );
        Ok(())
    }

    /// Reseeds the population from the initializer and publishes it as step
    /// zero. A failed reset leaves the previous buffers intact.
    pub fn reset(&self) -> Result<(), SimError> {
        self.expect_state(WorkerState::Initialized)?;
        reset_population(&self.shared)
    }

    /// Advances exactly one step synchronously.
    ///
    /// A no-op returning `Ok` while the paused flag is set. Permitted before
    /// `start` (state `Initialized`) so a caller can drive the worker
    /// deterministically, and while `Running`, where it shares the run lock
    /// with the worker thread.
    pub fn step(&self) -> Result<(), SimError> {
        let state = self.state();
        if state != WorkerState::Initialized && state != WorkerState::Running {
            return Err(SimError::State(state));
        }
        if self.shared.paused.load(Ordering::Relaxed) {
            return Ok(());
        }
        match step_once(&self.shared) {
            Err(e) if e.is_device_failure() => {
                record_failure(&self.shared, &e);
                Err(e)
            }
            other => other,
        }
    }

    /// Spawns the step loop thread. `paused` controls whether the loop
    /// starts advancing immediately or waits for `unpause`.
    pub fn start(&mut self, paused: bool) -> Result<(), SimError> {
        let state = self.state();
        if state != WorkerState::Initialized && state != WorkerState::Stopped {
            return Err(SimError::State(state));
        }

        self.shared.paused.store(paused, Ordering::Relaxed);
        self.shared.stop.store(false, Ordering::Relaxed);
        self.set_state(WorkerState::Running);

        let shared = Arc::clone(&self.shared);
        self.thread = Some(thread::spawn(move || run_loop(shared)));
        Ok(())
    }

    /// Stops the step loop and joins the thread. The device stays acquired,
    /// so `start` can resume cheaply.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        if self.state() == WorkerState::Running {
            self.set_state(WorkerState::Stopped);
        }
    }

    /// Sets the paused flag and drains any in-flight step before returning.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Relaxed);
        // Taking the run lock once waits out a step that already started.
        drop(self.shared.run.lock().unwrap());
    }

    pub fn unpause(&self) {
        self.shared.paused.store(false, Ordering::Relaxed);
    }

    /// Requests loop exit: clears paused so the loop observes stop within
    /// one step duration.
    pub fn exit(&mut self) {
        self.shared.paused.store(false, Ordering::Relaxed);
        self.stop();
    }

    /// Releases the device. Idempotent.
    pub fn terminate(&mut self) {
        if self.state() == WorkerState::Terminated {
            return;
        }
        self.exit();
        *self.shared.backend.lock().unwrap() = None;
        self.set_state(WorkerState::Terminated);
        debug!("terminated {:?} worker", self.kind);
    }

    /// Copies the published positions into `dst`; returns the number of
    /// 4-tuples copied.
    pub fn position(&self, dst: &mut [f32]) -> Result<usize, SimError> {
        self.surface_failure()?;
        self.refresh_if_invalidated();
        let ex = self.shared.clock.lock().unwrap();
        Ok(copy_tuples(&ex.positions, dst, 0, self.shared.body_count))
    }

    /// Copies only the worker's range window of published positions.
    pub fn position_in_range(&self, dst: &mut [f32]) -> Result<usize, SimError> {
        self.surface_failure()?;
        self.refresh_if_invalidated();
        let min = self.shared.range_min.load(Ordering::Relaxed);
        let max = self.shared.range_max.load(Ordering::Relaxed);
        let ex = self.shared.clock.lock().unwrap();
        Ok(copy_tuples(&ex.positions, dst, min, max))
    }

    /// Copies the published velocities into `dst`; returns the number of
    /// 4-tuples copied.
    pub fn velocity(&self, dst: &mut [f32]) -> Result<usize, SimError> {
        self.surface_failure()?;
        let ex = self.shared.clock.lock().unwrap();
        Ok(copy_tuples(&ex.velocities, dst, 0, self.shared.body_count))
    }

    /// Copies the last published state regardless of failure status, both
    /// arrays under one clock acquisition. Returns the published step count.
    ///
    /// This is the failover read: a worker whose device just vanished still
    /// holds the last state it published, and the mediator moves exactly
    /// that state onto the fallback device.
    pub fn last_published(&self, positions: &mut [f32], velocities: &mut [f32]) -> u64 {
        let ex = self.shared.clock.lock().unwrap();
        copy_tuples(&ex.positions, positions, 0, self.shared.body_count);
        copy_tuples(&ex.velocities, velocities, 0, self.shared.body_count);
        ex.step
    }

    /// Replaces the published positions with caller state; the backend picks
    /// the new state up before its next step (the hand-off role swap).
    pub fn set_position(&self, src: &[f32]) -> Result<(), SimError> {
        self.inject(src, |ex| &mut ex.positions)
    }

    /// Replaces the published velocities with caller state.
    pub fn set_velocity(&self, src: &[f32]) -> Result<(), SimError> {
        self.inject(src, |ex| &mut ex.velocities)
    }

    fn inject(
        &self,
        src: &[f32],
        select: impl FnOnce(&mut Exchange) -> &mut Vec<f32>,
    ) -> Result<(), SimError> {
        if src.len() != 4 * self.shared.body_count {
            return Err(SimError::Size(format!(
                "expected {} elements, got {}",
                4 * self.shared.body_count,
                src.len()
            )));
        }
        // Run lock first: never mutate the exchange mid-step.
        let _run = self.shared.run.lock().unwrap();
        let mut ex = self.shared.clock.lock().unwrap();
        select(&mut ex).copy_from_slice(src);
        drop(ex);
        self.shared.seed_pending.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Installs a new parameter record and schedules a reseed at the next
    /// step boundary.
    pub fn reset_params(&self, params: SimParams) {
        *self.shared.params.lock().unwrap() = params;
        self.shared.reload.store(true, Ordering::SeqCst);
    }

    /// Updates live tunables (damping, softening, time step) without
    /// reseeding the population.
    pub fn set_params(&self, params: SimParams) {
        *self.shared.params.lock().unwrap() = params;
    }

    /// Marks the host shadow stale; the next position query republishes
    /// from the device.
    pub fn invalidate(&self, stale: bool) {
        self.shared.invalidated.store(stale, Ordering::SeqCst);
    }

    /// Restricts the integration window to `[min, max)`.
    pub fn set_range(&self, min: usize, max: usize) {
        let max = max.min(self.shared.body_count);
        self.shared.range_min.store(min.min(max), Ordering::Relaxed);
        self.shared.range_max.store(max, Ordering::Relaxed);
    }

    /// Debug hook: forces a device-loss failure when the step counter would
    /// reach `step`.
    pub fn fail_after(&self, step: u64) {
        self.shared.fail_at.store(step, Ordering::Relaxed);
    }

    // Accessors

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.shared.state.load(Ordering::Relaxed))
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state(), WorkerState::Stopped | WorkerState::Terminated)
    }

    /// True once the device has been acquired and not yet lost.
    pub fn is_acquired(&self) -> bool {
        !self.has_failed()
            && !matches!(self.state(), WorkerState::Created | WorkerState::Terminated)
    }

    pub fn has_failed(&self) -> bool {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Throughput in GFLOP/s derived from the step rate.
    pub fn performance(&self) -> f64 {
        meters::gflops(self.shared.rate.rate(), self.shared.body_count)
    }

    /// Step rate in updates per second.
    pub fn updates(&self) -> f64 {
        self.shared.rate.rate()
    }

    /// Simulated-time accumulator.
    pub fn year(&self) -> f64 {
        self.shared.clock.lock().unwrap().year
    }

    /// Steps completed since the last reset.
    pub fn step_count(&self) -> u64 {
        self.shared.clock.lock().unwrap().step
    }

    pub fn size(&self) -> usize {
        self.shared.body_count
    }

    pub fn minimum(&self) -> usize {
        self.shared.range_min.load(Ordering::Relaxed)
    }

    pub fn maximum(&self) -> usize {
        self.shared.range_max.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.device_name
    }

    pub fn devices(&self) -> u32 {
        self.device_count
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Clears both meters; used by the mediator so a hand-off is not
    /// measured as a step.
    pub fn reset_meters(&self) {
        self.shared.rate.reset();
    }

    // Internals

    fn expect_state(&self, expected: WorkerState) -> Result<(), SimError> {
        let state = self.state();
        if state != expected {
            return Err(SimError::State(state));
        }
        Ok(())
    }

    fn set_state(&self, state: WorkerState) {
        self.shared.state.store(state as u8, Ordering::Relaxed);
    }

    fn surface_failure(&self) -> Result<(), SimError> {
        if self.has_failed() {
            let detail = self.shared.failure.lock().unwrap();
            return Err(SimError::Device(
                detail.clone().unwrap_or_else(|| String::from("device lost")),
            ));
        }
        Ok(())
    }

    fn refresh_if_invalidated(&self) {
        if self.shared.invalidated.swap(false, Ordering::SeqCst) {
            let _run = self.shared.run.lock().unwrap();
            if let Err(e) = republish(&self.shared) {
                warn!("host shadow refresh failed: {e}");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // A dropped handle must not leave a detached step loop running.
        self.shared.stop.store(true, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// The worker thread body: poll flags, advance, publish, repeat.
fn run_loop(shared: Arc<Shared>) {
    debug!("worker step loop started");
    loop {
        if shared.stop.load(Ordering::Relaxed) {
            break;
        }
        if shared.paused.load(Ordering::Relaxed) {
            if shared.invalidated.swap(false, Ordering::SeqCst) {
                let _run = shared.run.lock().unwrap();
                if let Err(e) = republish(&shared) {
                    warn!("host shadow refresh failed: {e}");
                }
            }
            thread::yield_now();
            continue;
        }

        match step_once(&shared) {
            Ok(()) => {}
            Err(e) if e.is_device_failure() => {
                record_failure(&shared, &e);
                break;
            }
            Err(e) => {
                // Recoverable (for example an empty script reseed); keep
                // stepping on the previous population.
                warn!("step skipped: {e}");
            }
        }
    }
    debug!("worker step loop finished");
}

/// Executes one guarded step: service reload and pending seeds, advance the
/// backend, publish the result under the clock lock.
fn step_once(shared: &Shared) -> Result<(), SimError> {
    let _run = shared.run.lock().unwrap();

    if shared.reload.swap(false, Ordering::SeqCst) {
        reset_population(shared)?;
    }

    if shared.seed_pending.swap(false, Ordering::SeqCst) {
        let (positions, velocities) = {
            let ex = shared.clock.lock().unwrap();
            (ex.positions.clone(), ex.velocities.clone())
        };
        let mut slot = shared.backend.lock().unwrap();
        let backend = slot.as_mut().ok_or(SimError::State(WorkerState::Terminated))?;
        backend.load(&positions, &velocities)?;
    }

    let params = *shared.params.lock().unwrap();
    let range = (
        shared.range_min.load(Ordering::Relaxed),
        shared.range_max.load(Ordering::Relaxed),
    );

    let next_step = shared.clock.lock().unwrap().step + 1;
    if next_step == shared.fail_at.load(Ordering::Relaxed) {
        return Err(SimError::DeviceLost);
    }

    let started = Instant::now();
    {
        let mut slot = shared.backend.lock().unwrap();
        let backend = slot.as_mut().ok_or(SimError::State(WorkerState::Terminated))?;
        backend.advance(&params, range)?;

        // Publish the swap: both buffers, the counter and the year move
        // together, so readers never pair state from different steps.
        let mut ex = shared.clock.lock().unwrap();
        ex.positions.copy_from_slice(backend.positions());
        ex.velocities.copy_from_slice(backend.velocities());
        ex.step = next_step;
        ex.year += f64::from(params.time_step * scale::K_TIME);
    }
    shared.rate.record(started.elapsed());
    Ok(())
}

/// Reseeds from the initializer using the current parameter record. Leaves
/// every buffer untouched when generation fails.
fn reset_population(shared: &Shared) -> Result<(), SimError> {
    let params = *shared.params.lock().unwrap();
    let data = initializer::initialize(
        params.config,
        shared.body_count,
        &params,
        &shared.bridge,
    )?;

    let mut slot = shared.backend.lock().unwrap();
    let backend = slot.as_mut().ok_or(SimError::State(WorkerState::Terminated))?;
    backend.load(&data.positions, &data.velocities)?;

    let mut ex = shared.clock.lock().unwrap();
    ex.positions.copy_from_slice(&data.positions);
    ex.velocities.copy_from_slice(&data.velocities);
    ex.step = 0;
    ex.year = 0.0;
    shared.seed_pending.store(false, Ordering::SeqCst);
    Ok(())
}

/// Refreshes the host shadow from the device and republishes it without
/// advancing the step counter.
fn republish(shared: &Shared) -> Result<(), SimError> {
    if shared.seed_pending.load(Ordering::SeqCst) {
        // Injected state the backend has not consumed yet outranks the
        // device copy; the exchange already holds the fresher data.
        return Ok(());
    }
    let mut slot = shared.backend.lock().unwrap();
    let backend = match slot.as_mut() {
        Some(backend) => backend,
        None => return Ok(()),
    };
    backend.refresh()?;

    let mut ex = shared.clock.lock().unwrap();
    ex.positions.copy_from_slice(backend.positions());
    ex.velocities.copy_from_slice(backend.velocities());
    Ok(())
}

fn record_failure(shared: &Shared, error: &SimError) {
    warn!("worker failed: {error}");
    *shared.failure.lock().unwrap() = Some(error.to_string());
    shared.failed.store(true, Ordering::Relaxed);
    shared.stop.store(true, Ordering::Relaxed);
    shared
        .state
        .store(WorkerState::Stopped as u8, Ordering::Relaxed);
}

/// Copies 4-tuples `[from, to)` out of `src` into `dst`, clamped to what
/// fits; returns the tuple count.
fn copy_tuples(src: &[f32], dst: &mut [f32], from: usize, to: usize) -> usize {
    let available = to.saturating_sub(from);
    let count = available.min(dst.len() / 4);
    let offset = 4 * from;
    dst[..4 * count].copy_from_slice(&src[offset..offset + 4 * count]);
    count
}
