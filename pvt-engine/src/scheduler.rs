use rand::Rng;
use tracing::debug;

/// Internal arming phases. The coarse wait exists so the host can park on a
/// timer instead of busy-polling the whole interval; the fine poll runs on
/// frame callbacks and gives sub-frame onset accuracy.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    CoarseWait { wake_at: f64 },
    FinePoll,
}

/// Produces the stimulus-visible transition at the right instant and owns
/// the missed-response watchdog for the trial it armed.
#[derive(Debug)]
pub struct StimulusScheduler {
    isi_window_ms: (u64, u64),
    coarse_slack_ms: f64,
    missed_timeout_ms: f64,
    phase: Phase,
    stim_time: Option<f64>,
    watchdog_deadline: Option<f64>,
}

impl StimulusScheduler {
    pub fn new(isi_window_ms: (u64, u64), coarse_slack_ms: f64, missed_timeout_ms: f64) -> Self {
        Self {
            isi_window_ms,
            coarse_slack_ms,
            missed_timeout_ms,
            phase: Phase::Idle,
            stim_time: None,
            watchdog_deadline: None,
        }
    }

    /// Draws a fresh ISI and arms the stimulus. Returns the scheduled onset.
    pub fn arm<R: Rng>(&mut self, now_ms: f64, rng: &mut R) -> f64 {
        let (lo, hi) = self.isi_window_ms;
        let isi = rng.random_range(lo..=hi);
        let stim_time = now_ms + isi as f64;
        self.stim_time = Some(stim_time);
        self.phase = Phase::CoarseWait {
            wake_at: stim_time - self.coarse_slack_ms,
        };
        debug!(isi_ms = isi, stim_time_ms = stim_time, "stimulus armed");
        stim_time
    }

    /// One cooperative poll. Returns true exactly once per armed stimulus,
    /// when the target time has been reached or passed. The coarse phase
    /// cascades into fine polling within a single call, so a late poll
    /// cannot miss the onset by a full cycle.
    pub fn poll(&mut self, now_ms: f64) -> bool {
        if let Phase::CoarseWait { wake_at } = self.phase {
            if now_ms >= wake_at {
                self.phase = Phase::FinePoll;
            }
        }
        if self.phase == Phase::FinePoll {
            if let Some(stim_time) = self.stim_time {
                if now_ms >= stim_time {
                    self.phase = Phase::Idle;
                    return true;
                }
            }
        }
        false
    }

    /// Scheduled onset of the current (or just-fired) stimulus. Kept until
    /// the next arming so reaction times can be derived against it; never
    /// reused across trials.
    pub fn stim_time(&self) -> Option<f64> {
        self.stim_time
    }

    /// While in the coarse phase, the instant the host may sleep until
    /// instead of polling every frame.
    pub fn coarse_wake_at(&self) -> Option<f64> {
        match self.phase {
            Phase::CoarseWait { wake_at } => Some(wake_at),
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Drops any pending stimulus. Must be called at every state exit so a
    /// superseded arming cannot fire into a later trial.
    pub fn disarm(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Arms the one-shot missed-response watchdog at stimulus onset.
    pub fn arm_watchdog(&mut self, onset_ms: f64) {
        self.watchdog_deadline = Some(onset_ms + self.missed_timeout_ms);
    }

    /// Cancellation is immediate; a cancelled watchdog can never fire.
    pub fn cancel_watchdog(&mut self) {
        self.watchdog_deadline = None;
    }

    /// True at most once per armed watchdog, when its deadline has passed.
    pub fn watchdog_fired(&mut self, now_ms: f64) -> bool {
        match self.watchdog_deadline {
            Some(deadline) if now_ms >= deadline => {
                self.watchdog_deadline = None;
                true
            }
            _ => false,
        }
    }
}
