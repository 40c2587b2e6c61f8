use anyhow::{Context, Result};
use pvt_core::{self_test_pattern, trigger_code, ActionKind, TriggerSink, SELF_TEST_STEP_MS};
use pvt_timing::precise_sleep;
use serialport::SerialPort;
use std::io::Write;
use std::time::Duration;
use tracing::{info, warn};

const BAUD: u32 = 9600;

/// Connected trigger device: one byte per event on a serial-like output.
/// Writes are best-effort; a device hiccup is logged and the trial goes on.
pub struct SerialTrigger {
    port: Box<dyn SerialPort>,
}

impl SerialTrigger {
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, BAUD)
            .timeout(Duration::from_millis(50))
            .open()
            .with_context(|| format!("failed to open trigger port {path} @ {BAUD}"))?;
        info!(port = path, baud = BAUD, "trigger device connected");
        Ok(Self { port })
    }

    /// Walks one set bit up and back down the byte, one write per 100ms
    /// step, so the operator can confirm every channel before a run.
    pub fn self_test(&mut self) -> Result<()> {
        info!("trigger self-test");
        for byte in self_test_pattern() {
            self.port
                .write_all(&[byte])
                .context("self-test write failed")?;
            self.port.flush().ok();
            precise_sleep(Duration::from_millis(SELF_TEST_STEP_MS));
        }
        Ok(())
    }
}

impl TriggerSink for SerialTrigger {
    fn emit(&mut self, kind: ActionKind) {
        let code = trigger_code(kind);
        if let Err(err) = self.port.write_all(&[code]).and_then(|_| self.port.flush()) {
            warn!(%err, code, "trigger write failed");
        }
    }
}
