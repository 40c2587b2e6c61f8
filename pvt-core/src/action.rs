use serde::{Deserialize, Serialize};

/// Event kinds recorded over a run. Serialized lowercase to match the
/// backend's `action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Start,
    Falsestart,
    Stim,
    Response,
    Missed,
    End,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Falsestart => "falsestart",
            ActionKind::Stim => "stim",
            ActionKind::Response => "response",
            ActionKind::Missed => "missed",
            ActionKind::End => "end",
        }
    }
}

/// One timestamped event. Insertion order into the log equals temporal
/// order, since each is recorded at the moment it occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Monotonic time in milliseconds.
    pub time_ms: f64,
    pub kind: ActionKind,
}

/// Destination for the durable mirror of the log. Implementations must not
/// block: a slow or failed write never stalls trial progression, and the
/// in-memory log stays authoritative for in-session computations.
pub trait ActionSink {
    /// Called once per event, in recording order.
    fn record(&self, event: &ActionEvent);
    /// Called once, after the `end` event, to signal run completion.
    fn session_end(&self);
}

/// Sink used when no backend is configured (dry runs, tests).
pub struct NullSink;

impl ActionSink for NullSink {
    fn record(&self, _event: &ActionEvent) {}
    fn session_end(&self) {}
}

/// Append-only record of a run, plus the reaction times derived from it.
pub struct ActionLog {
    events: Vec<ActionEvent>,
    reaction_times_ms: Vec<f64>,
    sink: Box<dyn ActionSink>,
}

impl ActionLog {
    pub fn new(sink: Box<dyn ActionSink>) -> Self {
        Self {
            events: Vec::new(),
            reaction_times_ms: Vec::new(),
            sink,
        }
    }

    /// Appends an event and mirrors it to the sink.
    pub fn record(&mut self, time_ms: f64, kind: ActionKind) {
        let event = ActionEvent { time_ms, kind };
        self.sink.record(&event);
        self.events.push(event);
    }

    /// Records a `response` event and derives its reaction time against the
    /// scheduled stimulus onset (not the recorded `stim` timestamp).
    pub fn record_response(&mut self, time_ms: f64, stim_time_ms: f64) -> f64 {
        let rt = time_ms - stim_time_ms;
        self.reaction_times_ms.push(rt);
        self.record(time_ms, ActionKind::Response);
        rt
    }

    pub fn notify_end(&self) {
        self.sink.session_end();
    }

    pub fn events(&self) -> &[ActionEvent] {
        &self.events
    }

    pub fn reaction_times_ms(&self) -> &[f64] {
        &self.reaction_times_ms
    }

    /// Arithmetic mean over `response` events only. `None` when no response
    /// was ever recorded.
    pub fn mean_reaction_time_ms(&self) -> Option<f64> {
        if self.reaction_times_ms.is_empty() {
            return None;
        }
        let sum: f64 = self.reaction_times_ms.iter().sum();
        Some(sum / self.reaction_times_ms.len() as f64)
    }

    pub fn count(&self, kind: ActionKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}
