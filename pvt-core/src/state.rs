/// Trial state machine states. Exactly one is active at any instant;
/// transitions are driven only by the trial state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    /// Waiting for the backend to issue a session token.
    Registration,
    /// Registered, waiting for the first activation.
    Ready,
    /// Inter-stimulus interval; the next stimulus is (or is about to be) armed.
    Isi,
    /// The stimulus is on screen, a response is expected.
    StimulusVisible,
    /// The missed-response watchdog fired; waiting for the subject to continue.
    Missed,
    /// Terminal. The run is over and the summary is shown.
    Debrief,
}

impl TrialState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialState::Debrief)
    }
}
