pub mod config;
pub mod gate;
pub mod input;
pub mod machine;
pub mod scheduler;

pub use config::EngineConfig;
pub use gate::{GamepadReleaseGate, GateDecision};
pub use input::{Activation, GamepadPort, InputAggregator, InputSource, NoPad};
pub use machine::TrialStateMachine;
pub use scheduler::StimulusScheduler;
