use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the model inside an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    /// Raw JSON argument text as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self { tool_calls, ..Self::plain(Role::Assistant, content) }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { tool_call_id: Some(tool_call_id.into()), ..Self::plain(Role::Tool, content) }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// Caller-supplied history entry, `{role, content}` with role `user` or `assistant`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HistoryEntry {
    pub fn to_message(&self) -> Option<Message> {
        match self.role.as_str() {
            "user" => Some(Message::user(self.content.clone())),
            "assistant" => Some(Message::assistant(self.content.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub language: String,
    pub user_location: Option<String>,
    pub current_crop: Option<String>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self { messages: Vec::new(), language: "en".into(), user_location: None, current_crop: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Agent,
    Tools,
}

/// One state-machine transition: the node that ran and the message count it left behind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub node: Node,
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub index: usize,
    pub state: AgentState,
    pub transitions: Vec<Transition>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    pub query: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub turns: Vec<TurnRecord>,
    checkpoints: Vec<Checkpoint>,
    /// Set by the first commit and never cleared, rollback included.
    #[serde(default)]
    committed: bool,
}

impl Session {
    /// New session holding only the genesis checkpoint.
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        let genesis = Checkpoint { index: 0, state: AgentState::default(), transitions: Vec::new(), created_at: now };
        Self { id, created_at: now, turns: Vec::new(), checkpoints: vec![genesis], committed: false }
    }

    pub fn head(&self) -> &Checkpoint {
        // the lineage always holds the genesis checkpoint
        &self.checkpoints[self.checkpoints.len() - 1]
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// True until a turn has been committed.
    pub fn is_fresh(&self) -> bool {
        !self.committed
    }

    /// Append one checkpoint and one turn record together.
    pub fn commit_turn(&mut self, state: AgentState, transitions: Vec<Transition>, turn: TurnRecord) -> usize {
        let index = self.checkpoints.len();
        self.checkpoints.push(Checkpoint { index, state, transitions, created_at: turn.timestamp });
        self.turns.push(turn);
        self.committed = true;
        index
    }

    /// Drop the newest `steps` checkpoints, keeping at least the first one.
    /// Returns false and leaves the lineage untouched when that is not possible.
    pub fn truncate_checkpoints(&mut self, steps: usize) -> bool {
        if steps == 0 || steps >= self.checkpoints.len() {
            return false;
        }
        let keep = self.checkpoints.len() - steps;
        self.checkpoints.truncate(keep);
        true
    }
}

/// Returns the provided id, or a fresh `session_<timestamp>_<hex>` id.
pub fn resolve_session_id(provided: Option<&str>) -> String {
    match provided.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => id.to_string(),
        None => {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("session_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(q: &str) -> TurnRecord {
        TurnRecord { query: q.into(), response: format!("re: {q}"), timestamp: Utc::now() }
    }

    #[test]
    fn new_session_has_only_genesis() {
        let s = Session::new("s1".into());
        assert_eq!(s.checkpoint_count(), 1);
        assert!(s.turns.is_empty());
        assert!(s.head().state.messages.is_empty());
        assert_eq!(s.head().state.language, "en");
    }

    #[test]
    fn commit_and_truncate_keep_counts_aligned() {
        let mut s = Session::new("s1".into());
        for q in ["a", "b", "c"] {
            let state = AgentState { messages: vec![Message::user(q)], ..AgentState::default() };
            s.commit_turn(state, Vec::new(), turn(q));
        }
        assert_eq!(s.checkpoint_count(), 4);
        assert_eq!(s.turns.len(), 3);
        assert_eq!(s.head().index, 3);

        assert!(!s.truncate_checkpoints(4));
        assert!(!s.truncate_checkpoints(0));
        assert_eq!(s.checkpoint_count(), 4);

        assert!(s.truncate_checkpoints(2));
        assert_eq!(s.checkpoint_count(), 2);
        assert_eq!(s.head().state.messages[0].content, "a");
    }

    #[test]
    fn rolled_back_session_is_not_fresh() {
        let mut s = Session::new("s1".into());
        assert!(s.is_fresh());
        s.commit_turn(AgentState::default(), Vec::new(), turn("a"));
        assert!(s.truncate_checkpoints(1));
        s.turns.clear();
        assert_eq!(s.checkpoint_count(), 1);
        assert!(!s.is_fresh());
    }

    #[test]
    fn generated_session_ids_are_prefixed_and_unique() {
        let a = resolve_session_id(None);
        let b = resolve_session_id(Some("  "));
        assert!(a.starts_with("session_"));
        assert_eq!(a.rsplit('_').next().unwrap().len(), 8);
        assert_ne!(a, b);
        assert_eq!(resolve_session_id(Some("farmer-7")), "farmer-7");
    }

    #[test]
    fn history_entries_map_known_roles_only() {
        let user = HistoryEntry { role: "user".into(), content: "hi".into(), timestamp: None };
        let other = HistoryEntry { role: "system".into(), content: "x".into(), timestamp: None };
        assert_eq!(user.to_message(), Some(Message::user("hi")));
        assert_eq!(other.to_message(), None);
    }
}
