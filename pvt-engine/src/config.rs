use serde::{Deserialize, Serialize};

/// Timing constants for one run. Defaults match the reference deployment;
/// all of them may be overridden from the startup config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock budget for the run, measured from the first `start`
    /// activation. Checked only when arming a new trial, never mid-stimulus.
    #[serde(default = "EngineConfig::default_game_duration")]
    pub game_duration_ms: f64,
    /// Inclusive bounds for the uniformly-drawn inter-stimulus interval.
    #[serde(default = "EngineConfig::default_isi_window")]
    pub isi_window_ms: (u64, u64),
    /// One-shot watchdog armed at stimulus onset.
    #[serde(default = "EngineConfig::default_missed_timeout")]
    pub missed_timeout_ms: f64,
    /// How early the coarse wake-up fires before the stimulus target time.
    #[serde(default = "EngineConfig::default_coarse_slack")]
    pub coarse_slack_ms: f64,
    /// Recording latency of the `stim` log entry after onset. Does not
    /// affect reaction-time math, which uses the scheduled onset.
    #[serde(default = "EngineConfig::default_stim_record_delay")]
    pub stim_record_delay_ms: f64,
    /// Continuous-hold threshold after which the release gate shows its
    /// prompt and hides the stimulus target.
    #[serde(default = "EngineConfig::default_gate_hold_prompt")]
    pub gate_hold_prompt_ms: f64,
    /// Re-poll cadence while the release gate is waiting.
    #[serde(default = "EngineConfig::default_gate_repoll")]
    pub gate_repoll_ms: f64,
}

impl EngineConfig {
    fn default_game_duration() -> f64 {
        300_000.0 // 5 minutes
    }
    fn default_isi_window() -> (u64, u64) {
        (2000, 5000)
    }
    fn default_missed_timeout() -> f64 {
        10_000.0
    }
    fn default_coarse_slack() -> f64 {
        50.0
    }
    fn default_stim_record_delay() -> f64 {
        5.0
    }
    fn default_gate_hold_prompt() -> f64 {
        3000.0
    }
    fn default_gate_repoll() -> f64 {
        100.0
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            game_duration_ms: Self::default_game_duration(),
            isi_window_ms: Self::default_isi_window(),
            missed_timeout_ms: Self::default_missed_timeout(),
            coarse_slack_ms: Self::default_coarse_slack(),
            stim_record_delay_ms: Self::default_stim_record_delay(),
            gate_hold_prompt_ms: Self::default_gate_hold_prompt(),
            gate_repoll_ms: Self::default_gate_repoll(),
        }
    }
}
