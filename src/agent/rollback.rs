//! Rollback over a session's checkpoint lineage.
//!
//! The lineage is an append-only log addressed from its tail. Rolling back `k`
//! steps makes the checkpoint `k` entries behind the head the new head and
//! discards everything newer; the newest `k` turn records go with it.

use serde::Serialize;

use crate::error::ChatError;
use crate::session::Session;
use crate::storage::SessionStore;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub status: String,
    pub message: String,
    pub session_id: String,
    pub remaining_history: usize,
}

pub async fn rollback(store: &SessionStore, session_id: &str, steps: usize) -> Result<RollbackOutcome, ChatError> {
    let mut session = store
        .lock(session_id)
        .await
        .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;
    let outcome = rollback_locked(&mut session, steps)?;
    metrics::counter!("rollbacks_total", "kind" => "explicit").increment(1);
    tracing::info!(session_id, steps, head = session.head().index, "rolled back session");
    Ok(outcome)
}

/// Rollback on a session the caller already holds.
pub fn rollback_locked(session: &mut Session, steps: usize) -> Result<RollbackOutcome, ChatError> {
    if steps == 0 {
        return Err(ChatError::InvalidSteps);
    }
    let available = session.checkpoint_count();
    if !session.truncate_checkpoints(steps) {
        return Err(ChatError::InsufficientHistory { requested: steps, available: available - 1 });
    }
    if session.turns.len() >= steps {
        let keep = session.turns.len() - steps;
        session.turns.truncate(keep);
    }
    Ok(RollbackOutcome {
        status: "success".into(),
        message: format!("Rolled back {steps} step(s)"),
        session_id: session.id.clone(),
        remaining_history: session.turns.len(),
    })
}

/// Single-step recovery after a failed turn.
///
/// A turn writes nothing until it commits and holds the session lock
/// throughout, so the head is still the checkpoint the run started from.
/// Dropping the in-flight run is the whole rollback; this records it.
pub fn recover_failed_turn(session: &Session) {
    metrics::counter!("rollbacks_total", "kind" => "automatic").increment(1);
    tracing::info!(session_id = %session.id, head = session.head().index, "rolled back failed turn to last checkpoint");
}
