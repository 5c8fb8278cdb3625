//! # Engine Module
//!
//! Thin adapter between the application shell and the simulation core. The
//! engine owns the mediator and the script bridge, translates user input
//! (single-byte commands, scroll, click, pointer moves) into mediator and
//! visualizer calls, and paces the frame loop.
//!
//! The two non-trivial responsibilities live here:
//!
//! - **Demo cycling**: advance to the next preset, broadcast it to every
//!   worker, reconfigure the script bridge scales and tell the visualizer
//!   to reparameterize.
//! - **Simulator cycling**: walk the facade list from the active one,
//!   skipping workers that are stopped or lost their device.
//!
//! The visualizer itself is an external collaborator; the engine only talks
//! to the small [`Visualizer`] seam and works fine with none attached
//! (headless runs).


use std::sync::Arc;
use std::time::Instant;

use log::{info, warn};

use crate::bridge::ScriptBridge;
use crate::constants::defaults;
use crate::error::SimError;
use crate::mediator::Mediator;
use crate::params::{Config, DEMO_PRESETS, SimParams};

/// Single-byte command channel accepted by [`Engine::command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NextDemo,
    PreviousDemo,
    TogglePause,
    ToggleHud,
    ToggleDock,
    CycleSimulator,
    ToggleRotation,
    ToggleEarthView,
    ResetDemo,
}

impl Command {
    /// Decodes a command byte; unknown bytes are ignored by the engine.
    pub fn from_byte(byte: u8) -> Option<Command> {
        match byte {
            b'n' => Some(Command::NextDemo),
            b'b' => Some(Command::PreviousDemo),
            b' ' => Some(Command::TogglePause),
            b'h' => Some(Command::ToggleHud),
            b'd' => Some(Command::ToggleDock),
            b's' => Some(Command::CycleSimulator),
            b'r' => Some(Command::ToggleRotation),
            b'e' => Some(Command::ToggleEarthView),
            b'0' => Some(Command::ResetDemo),
            _ => None,
        }
    }
}

/// Mouse button transitions forwarded by the shell.
pub const CLICK_DOWN: i32 = 1;
pub const CLICK_UP: i32 = 0;

/// Rendering collaborator seam. The engine pushes view parameters on demo
/// changes and the latest positions every frame.
pub trait Visualizer {
    fn reparameterize(&mut self, params: &SimParams);
    fn frame(&mut self, positions: &[f32]);
}

/// Top-level coordinator: mediator + bridge + view state + frame pacing.
pub struct Engine {
    mediator: Mediator,
    bridge: Arc<ScriptBridge>,
    visualizer: Option<Box<dyn Visualizer>>,

    active_demo: usize,
    params: SimParams,
    /// Last record that initialized successfully; the revert target when a
    /// script configuration turns out to be empty.
    last_good_params: SimParams,

    show_hud: bool,
    show_dock: bool,
    rotating: bool,
    earth_view: bool,
    view_distance: f32,
    rotation: (f32, f32),
    grab_point: Option<(f32, f32)>,

    last_frame: Option<Instant>,
}

impl Engine {
    /// Builds the bridge, the mediator and all workers for `body_count`
    /// bodies, starting on preset `active_demo`.
    pub fn new(body_count: usize, active_demo: usize) -> Result<Self, SimError> {
        let params = SimParams::preset(active_demo);
        let bridge = Arc::new(ScriptBridge::new(body_count));
        bridge.configure(body_count, params.cluster_scale, params.velocity_scale);

        let mediator = Mediator::new(params, body_count, Arc::clone(&bridge))?;

        Ok(Engine {
            mediator,
            bridge,
            visualizer: None,
            active_demo: active_demo % DEMO_PRESETS.len(),
            params,
            last_good_params: params,
            show_hud: true,
            show_dock: true,
            rotating: false,
            earth_view: false,
            view_distance: params.view_distance,
            rotation: (params.rotate_x, params.rotate_y),
            grab_point: None,
            last_frame: None,
        })
    }

    /// Attaches the rendering collaborator.
    pub fn set_visualizer(&mut self, visualizer: Box<dyn Visualizer>) {
        visualizer_reparameterize(&mut self.visualizer, Some(visualizer), &self.params);
    }

    /// One frame: update timing, poll the mediator, feed the visualizer.
    pub fn tick(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            let delta = now.duration_since(last).as_secs_f32();
            if delta > 0.0 {
                self.bridge.set_frame_timing(1.0 / delta, delta);
            }
        }
        self.last_frame = Some(now);

        self.mediator.update();
        if self.mediator.has_position() {
            if let Some(v) = self.visualizer.as_mut() {
                v.frame(self.mediator.position());
            }
        }
    }

    /// Dispatches one command byte; unknown bytes are dropped.
    pub fn command(&mut self, byte: u8) {
        let Some(command) = Command::from_byte(byte) else {
            return;
        };
        match command {
            Command::NextDemo => {
                self.set_demo((self.active_demo + 1) % DEMO_PRESETS.len());
            }
            Command::PreviousDemo => {
                self.set_demo((self.active_demo + DEMO_PRESETS.len() - 1) % DEMO_PRESETS.len());
            }
            Command::ResetDemo => {
                self.set_demo(self.active_demo);
            }
            Command::TogglePause => {
                if self.mediator.is_paused() {
                    self.mediator.unpause();
                } else {
                    self.mediator.pause();
                }
            }
            Command::ToggleHud => self.show_hud = !self.show_hud,
            Command::ToggleDock => self.show_dock = !self.show_dock,
            Command::CycleSimulator => self.cycle_simulator(),
            Command::ToggleRotation => self.rotating = !self.rotating,
            Command::ToggleEarthView => self.earth_view = !self.earth_view,
        }
    }

    /// Applies preset `index`: broadcast to the workers, refresh the bridge
    /// scales, reparameterize the view.
    pub fn set_demo(&mut self, index: usize) {
        let index = index % DEMO_PRESETS.len();
        if self.apply_params(SimParams::preset(index)) {
            self.active_demo = index;
            info!("demo {index} active");
        }
    }

    /// Installs a parameter record, returning whether it was accepted.
    ///
    /// A script configuration whose seed store was never written cannot
    /// initialize anybody; the engine keeps the previous successful record
    /// instead of broadcasting a reset that every worker would reject.
    pub fn apply_params(&mut self, params: SimParams) -> bool {
        if params.config == Config::Script && self.bridge.seeded_arrays().is_none() {
            warn!("script configuration has no seeded bodies; keeping previous record");
            self.params = self.last_good_params;
            self.mediator.reset(self.params);
            return false;
        }

        self.params = params;
        self.last_good_params = params;

        if params.config != Config::Script {
            // A script seed survives until its reset consumes it; for every
            // other configuration the bridge just mirrors the new scales.
            self.bridge.configure(
                self.mediator.body_count(),
                params.cluster_scale,
                params.velocity_scale,
            );
        }

        self.view_distance = params.view_distance;
        self.rotation = (params.rotate_x, params.rotate_y);
        self.mediator.reset(params);
        visualizer_reparameterize(&mut self.visualizer, None, &params);
        true
    }

    /// Advances the active simulator to the next selectable facade.
    fn cycle_simulator(&mut self) {
        let count = self.mediator.count();
        for offset in 1..=count {
            let candidate = (self.mediator.active_index() + offset) % count;
            let facade = match self.mediator.facade(candidate) {
                Some(facade) => facade,
                None => continue,
            };
            if facade.is_stopped() || !facade.is_acquired() {
                continue;
            }
            if let Err(e) = self.mediator.select_index(candidate) {
                warn!("simulator cycle skipped a facade: {e}");
                continue;
            }
            return;
        }
    }

    /// Scroll wheel: zoom.
    pub fn scroll(&mut self, delta: f32) {
        self.view_distance =
            (self.view_distance + delta * defaults::SCROLL_ZOOM_SPEED).clamp(1.0, 500.0);
    }

    /// Mouse click: dock hit-test first, otherwise a rotation grab.
    pub fn click(&mut self, state: i32, point: (f32, f32)) {
        if state == CLICK_DOWN {
            if self.show_dock {
                if let Some(index) = self.mediator.button_at(point) {
                    if let Err(e) = self.mediator.select_index(index) {
                        warn!("dock selection failed: {e}");
                    }
                    return;
                }
            }
            self.grab_point = Some(point);
        } else {
            self.grab_point = None;
        }
    }

    /// Pointer move: drag rotation while grabbed.
    pub fn pointer(&mut self, point: (f32, f32)) {
        if let Some(grab) = self.grab_point {
            self.rotation.0 += (point.1 - grab.1) * defaults::ROTATION_DELTA;
            self.rotation.1 += (point.0 - grab.0) * defaults::ROTATION_DELTA;
            self.grab_point = Some(point);
        }
    }

    // Accessors

    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }

    pub fn mediator_mut(&mut self) -> &mut Mediator {
        &mut self.mediator
    }

    pub fn bridge(&self) -> &Arc<ScriptBridge> {
        &self.bridge
    }

    pub fn active_demo(&self) -> usize {
        self.active_demo
    }

    pub fn params(&self) -> SimParams {
        self.params
    }

    pub fn show_hud(&self) -> bool {
        self.show_hud
    }

    pub fn show_dock(&self) -> bool {
        self.show_dock
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating
    }

    pub fn earth_view(&self) -> bool {
        self.earth_view
    }

    pub fn view_distance(&self) -> f32 {
        self.view_distance
    }

    pub fn rotation(&self) -> (f32, f32) {
        self.rotation
    }
}

/// Applies `reparameterize` to the attached visualizer, optionally
/// installing a new one first.
fn visualizer_reparameterize(
    slot: &mut Option<Box<dyn Visualizer>>,
    replacement: Option<Box<dyn Visualizer>>,
    params: &SimParams,
) {
    if let Some(v) = replacement {
        *slot = Some(v);
    }
    if let Some(v) = slot.as_mut() {
        v.reparameterize(params);
    }
}
