use tracing::debug;

/// Which channel produced an activation. The state machine transitions on
/// the first activation regardless of source; the source is kept for
/// diagnostics and for deciding whether the release gate applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Keyboard,
    Mouse,
    Touch,
    Gamepad,
}

/// The single abstract event all input channels normalize into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    pub time_ms: f64,
    pub source: InputSource,
}

/// Read-only view of the physical gamepad. The aggregator owns the handle;
/// the release gate reads through the same trait.
pub trait GamepadPort {
    /// True while a pad is attached. A disappearing pad is "no activation
    /// this tick", never an error.
    fn connected(&mut self) -> bool;
    /// True if any button of the primary cluster is currently down.
    fn any_primary_pressed(&mut self) -> bool;
}

/// Port used on runs without a gamepad. Also makes the release gate a
/// pass-through, since keyboard/mouse/touch have no held concept.
pub struct NoPad;

impl GamepadPort for NoPad {
    fn connected(&mut self) -> bool {
        false
    }
    fn any_primary_pressed(&mut self) -> bool {
        false
    }
}

/// Normalizes keyboard, mouse, touch and polled-gamepad input into
/// `Activation`s. Does not de-duplicate across channels; the state machine
/// honors the first activation per expected response and ignores the rest.
#[derive(Debug, Default)]
pub struct InputAggregator {
    ctrl_held: bool,
    alt_held: bool,
    super_held: bool,
    /// Set on touch contact: the platform will also deliver a synthetic
    /// mouse-down for the same physical touch, which must not double-count.
    suppress_next_mouse: bool,
    /// Gamepad polling runs only while a response is expected.
    polling: bool,
}

impl InputAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_modifiers(&mut self, ctrl: bool, alt: bool, super_: bool) {
        self.ctrl_held = ctrl;
        self.alt_held = alt;
        self.super_held = super_;
    }

    /// The designated activation key went down.
    pub fn on_activation_key(&mut self, now_ms: f64) -> Option<Activation> {
        if self.ctrl_held || self.alt_held || self.super_held {
            return None;
        }
        Some(Activation {
            time_ms: now_ms,
            source: InputSource::Keyboard,
        })
    }

    /// Primary mouse button went down anywhere in the interactive surface.
    pub fn on_mouse_down(&mut self, now_ms: f64) -> Option<Activation> {
        if self.suppress_next_mouse {
            self.suppress_next_mouse = false;
            debug!("swallowed synthetic mouse-down after touch");
            return None;
        }
        Some(Activation {
            time_ms: now_ms,
            source: InputSource::Mouse,
        })
    }

    /// First touch contact anywhere in the interactive surface.
    pub fn on_touch_start(&mut self, now_ms: f64) -> Option<Activation> {
        self.suppress_next_mouse = true;
        Some(Activation {
            time_ms: now_ms,
            source: InputSource::Touch,
        })
    }

    /// Enables or disables gamepad polling. Driven by the state machine's
    /// expects-response view each tick, so polling stops as soon as the
    /// state no longer awaits input.
    pub fn set_gamepad_polling(&mut self, enabled: bool) {
        if self.polling != enabled {
            debug!(enabled, "gamepad polling");
        }
        self.polling = enabled;
    }

    /// One poll tick. Dispatches at most one activation and stops polling
    /// once it does; a vanished pad self-terminates the poll.
    pub fn poll_gamepad(
        &mut self,
        port: &mut dyn GamepadPort,
        now_ms: f64,
    ) -> Option<Activation> {
        if !self.polling || !port.connected() {
            return None;
        }
        if !port.any_primary_pressed() {
            return None;
        }
        self.polling = false;
        Some(Activation {
            time_ms: now_ms,
            source: InputSource::Gamepad,
        })
    }
}
