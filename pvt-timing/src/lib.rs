pub mod clock;
pub mod sleep;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use sleep::precise_sleep;
