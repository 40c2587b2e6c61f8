use serde::{Deserialize, Serialize};

/// One subject's run, as issued by the backend at registration.
/// Held for the run's lifetime; never persisted locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub subject_id: String,
    /// Opaque authorization token echoed back on every backend call.
    pub token: String,
    pub session_id: i64,
}
