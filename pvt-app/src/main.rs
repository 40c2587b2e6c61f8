mod app;
mod config;
mod gamepad;
mod render;

use anyhow::{bail, Context, Result};
use app::App;
use config::AppConfig;
use gamepad::GilrsPort;
use pvt_core::{ActionSink, NullSink, NullTrigger, Session, TriggerSink};
use pvt_engine::{GamepadPort, NoPad, TrialStateMachine};
use pvt_io::{HttpApi, SerialTrigger};
use pvt_timing::MonotonicClock;
use std::path::PathBuf;
use tracing::warn;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let subject_id = match args.next() {
        Some(id) if !id.is_empty() => id,
        _ => bail!("usage: pvt <subject_id> [config.json]"),
    };
    let config_path = args.next().map(PathBuf::from);

    let config = AppConfig::load(config_path.as_deref())?;
    let clock = MonotonicClock::new();

    // Registration must succeed before the run can start; a refusal is
    // surfaced here and the operator retries by rerunning. A null api_url
    // skips the backend entirely (rig checks, offline demos).
    let (sink, session): (Box<dyn ActionSink>, Session) = match config.api_url.as_deref() {
        Some(url) => {
            let api = HttpApi::register(url, &subject_id).context("registration failed")?;
            let session = api.session().clone();
            (Box::new(api), session)
        }
        None => {
            warn!("no backend configured, running offline");
            let session = Session {
                subject_id: subject_id.clone(),
                token: String::new(),
                session_id: 0,
            };
            (Box::new(NullSink), session)
        }
    };

    let trigger: Box<dyn TriggerSink> = match config.trigger_port.as_deref() {
        Some(path) => match SerialTrigger::open(path) {
            Ok(mut device) => {
                if config.trigger_self_test {
                    device.self_test().context("trigger self-test failed")?;
                }
                Box::new(device)
            }
            Err(err) => {
                warn!(%err, "continuing without trigger device");
                Box::new(NullTrigger)
            }
        },
        None => Box::new(NullTrigger),
    };

    let pad: Box<dyn GamepadPort> = match GilrsPort::new() {
        Ok(port) => Box::new(port),
        Err(err) => {
            warn!(%err, "continuing without gamepad support");
            Box::new(NoPad)
        }
    };

    let mut machine =
        TrialStateMachine::new(config.engine.clone(), clock, rand::rng(), sink, trigger);
    machine.session_started(session);

    App::new(machine, clock, pad).run()
}
