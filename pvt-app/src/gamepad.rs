use anyhow::{anyhow, Result};
use gilrs::{Button, Gilrs};
use pvt_engine::GamepadPort;

/// The "primary" cluster: any of the four face buttons counts.
const PRIMARY: [Button; 4] = [Button::South, Button::East, Button::West, Button::North];

/// gilrs-backed gamepad handle. Owned by the app and lent to the engine as
/// a `GamepadPort`; reads are cheap enough for millisecond-scale polling.
pub struct GilrsPort {
    gilrs: Gilrs,
}

impl GilrsPort {
    pub fn new() -> Result<Self> {
        let gilrs = Gilrs::new().map_err(|err| anyhow!("initializing gamepad support: {err}"))?;
        Ok(Self { gilrs })
    }

    /// Drains the event queue so cached button state is current. Hotplug
    /// arrives through the same queue, so this also tracks disconnects.
    fn pump(&mut self) {
        while self.gilrs.next_event().is_some() {}
    }
}

impl GamepadPort for GilrsPort {
    fn connected(&mut self) -> bool {
        self.pump();
        self.gilrs.gamepads().next().is_some()
    }

    fn any_primary_pressed(&mut self) -> bool {
        self.pump();
        self.gilrs
            .gamepads()
            .any(|(_, pad)| PRIMARY.iter().any(|b| pad.is_pressed(*b)))
    }
}
