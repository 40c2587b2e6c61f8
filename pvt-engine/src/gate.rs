use crate::input::GamepadPort;
use tracing::debug;

/// Outcome of one gate check at a trial boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No device, or nothing held: arm the next trial now.
    Proceed,
    /// A button is down but below the prompt threshold; check again soon.
    Waiting,
    /// Held continuously past the threshold: show the release prompt and
    /// hide the stimulus target until release.
    PromptRelease,
}

/// Prevents a response button held through the end of one trial from firing
/// a spurious immediate response on the next. Consulted by the state machine
/// every time it is about to arm a stimulus; only meaningful when a gamepad
/// is the active device, since a click or tap has no held state.
#[derive(Debug)]
pub struct GamepadReleaseGate {
    hold_prompt_ms: f64,
    repoll_ms: f64,
    held_since: Option<f64>,
    next_poll_at: f64,
    prompting: bool,
}

impl GamepadReleaseGate {
    pub fn new(hold_prompt_ms: f64, repoll_ms: f64) -> Self {
        Self {
            hold_prompt_ms,
            repoll_ms,
            held_since: None,
            next_poll_at: 0.0,
            prompting: false,
        }
    }

    pub fn check(&mut self, now_ms: f64, port: &mut dyn GamepadPort) -> GateDecision {
        if !port.connected() {
            self.reset();
            return GateDecision::Proceed;
        }

        // Between re-polls, repeat the last pending decision.
        if self.held_since.is_some() && now_ms < self.next_poll_at {
            return if self.prompting {
                GateDecision::PromptRelease
            } else {
                GateDecision::Waiting
            };
        }

        if !port.any_primary_pressed() {
            if self.prompting {
                debug!("release observed, dismissing prompt");
            }
            self.reset();
            return GateDecision::Proceed;
        }

        let since = *self.held_since.get_or_insert(now_ms);
        self.next_poll_at = now_ms + self.repoll_ms;

        if now_ms - since >= self.hold_prompt_ms {
            if !self.prompting {
                debug!(held_ms = now_ms - since, "button held, prompting for release");
            }
            self.prompting = true;
            GateDecision::PromptRelease
        } else {
            GateDecision::Waiting
        }
    }

    pub fn is_prompting(&self) -> bool {
        self.prompting
    }

    pub fn reset(&mut self) {
        self.held_since = None;
        self.next_poll_at = 0.0;
        self.prompting = false;
    }
}
