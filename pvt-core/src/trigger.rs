use crate::action::ActionKind;

/// Number of steps in the operator self-test pattern.
pub const SELF_TEST_STEPS: usize = 16;
/// Interval between self-test writes, in milliseconds.
pub const SELF_TEST_STEP_MS: u64 = 100;

/// One-hot trigger byte for an event kind. Bit indices are fixed protocol:
/// recording equipment decodes channels by position, not by value.
pub fn trigger_code(kind: ActionKind) -> u8 {
    let bit = match kind {
        ActionKind::Start => 0,
        ActionKind::Stim => 1,
        ActionKind::Response => 2,
        ActionKind::Falsestart => 3,
        ActionKind::Missed => 4,
        ActionKind::End => 5,
    };
    1u8 << bit
}

/// Emits a one-byte hardware trigger per event kind. The connected-device
/// variant lives in pvt-io; absence of a device is a legal, silent
/// configuration.
pub trait TriggerSink {
    fn emit(&mut self, kind: ActionKind);
}

/// No device connected: every trigger is a no-op.
pub struct NullTrigger;

impl TriggerSink for NullTrigger {
    fn emit(&mut self, _kind: ActionKind) {}
}

/// Self-test byte sequence: a single set bit walked up bits 0..7 and back
/// down, one write per step, so the operator can visually confirm each
/// channel before a run.
pub fn self_test_pattern() -> [u8; SELF_TEST_STEPS] {
    let mut pattern = [0u8; SELF_TEST_STEPS];
    for (step, byte) in pattern.iter_mut().enumerate() {
        let bit = if step < 8 { step } else { 15 - step };
        *byte = 1u8 << bit;
    }
    pattern
}
