use anyhow::{bail, Context, Result};
use pvt_core::{ActionEvent, ActionSink, Session};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Serialize)]
struct StartRequest<'a> {
    subject_id: &'a str,
}

#[derive(Deserialize)]
struct StartResponse {
    token: String,
    session_id: i64,
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    session_id: i64,
    token: &'a str,
    time: f64,
    action: &'a str,
}

#[derive(Serialize)]
struct EndRequest<'a> {
    session_id: i64,
    token: &'a str,
}

enum Outbound {
    Action(ActionEvent),
    End,
}

/// Client for the session backend. Registration is the one blocking call
/// (`Ready` must not be reachable without a token); everything after it is
/// fire-and-forget through a channel drained by a background thread, so a
/// slow or failed write never stalls trial progression. A single sender
/// thread keeps the mirrored events in recording order.
pub struct HttpApi {
    tx: mpsc::Sender<Outbound>,
    session: Session,
}

fn make_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(4))
        .build()
        .context("building http client")
}

impl HttpApi {
    /// `POST /start`. A non-200 answer aborts registration; the caller
    /// surfaces the error to the operator, who may retry by rerunning.
    pub fn register(base_url: &str, subject_id: &str) -> Result<Self> {
        let client = make_client()?;
        let base = base_url.trim_end_matches('/').to_string();

        let resp = client
            .post(format!("{base}/start"))
            .json(&StartRequest { subject_id })
            .send()
            .with_context(|| format!("registering against {base}/start"))?;
        if !resp.status().is_success() {
            bail!("registration rejected: {}", resp.status());
        }
        let start: StartResponse = resp.json().context("parsing registration response")?;

        let session = Session {
            subject_id: subject_id.to_string(),
            token: start.token,
            session_id: start.session_id,
        };
        info!(session_id = session.session_id, "registered");

        let (tx, rx) = mpsc::channel();
        spawn_sender(client, base, session.clone(), rx);

        Ok(Self { tx, session })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

fn spawn_sender(client: Client, base: String, session: Session, rx: mpsc::Receiver<Outbound>) {
    thread::spawn(move || {
        for msg in rx {
            let result = match msg {
                Outbound::Action(event) => client
                    .post(format!("{base}/action"))
                    .json(&ActionRequest {
                        session_id: session.session_id,
                        token: &session.token,
                        time: event.time_ms,
                        action: event.kind.as_str(),
                    })
                    .send(),
                Outbound::End => client
                    .post(format!("{base}/end"))
                    .json(&EndRequest {
                        session_id: session.session_id,
                        token: &session.token,
                    })
                    .send(),
            };
            // A rejected or dropped action stays in the local log; durability
            // here is best-effort by contract.
            if let Err(err) = result {
                warn!(%err, "backend write failed");
            }
        }
    });
}

impl ActionSink for HttpApi {
    fn record(&self, event: &ActionEvent) {
        if self.tx.send(Outbound::Action(event.clone())).is_err() {
            warn!("backend sender gone, dropping event");
        }
    }

    fn session_end(&self) {
        if self.tx.send(Outbound::End).is_err() {
            warn!("backend sender gone, dropping end notice");
        }
    }
}
