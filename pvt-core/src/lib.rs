pub mod action;
pub mod session;
pub mod state;
pub mod trigger;

pub use action::{ActionEvent, ActionKind, ActionLog, ActionSink, NullSink};
pub use session::Session;
pub use state::TrialState;
pub use trigger::{
    self_test_pattern, trigger_code, NullTrigger, TriggerSink, SELF_TEST_STEPS, SELF_TEST_STEP_MS,
};
