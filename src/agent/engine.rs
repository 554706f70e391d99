use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::agent::prompts::{self, CHAT_FALLBACK_ANSWER, SPEECH_FALLBACK_ANSWER, SPEECH_SYSTEM_PROMPT};
use crate::agent::rollback::{self, RollbackOutcome};
use crate::agent::tools::{BackendClient, ToolContext, ToolKind, ToolRegistry};
use crate::error::ChatError;
use crate::models::{LanguageModel, ModelRequest};
use crate::session::{
    AgentState, HistoryEntry, Message, Node, Role, Session, ToolInvocation, Transition, TurnRecord,
    resolve_session_id,
};
use crate::settings::{EffectiveSettings, ModelParams};
use crate::storage::SessionStore;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub crop: Option<String>,
    #[serde(default)]
    pub chat_history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    pub answer: String,
    pub session_id: String,
    pub tools_used: Vec<String>,
    pub has_context: bool,
}

#[derive(Debug, Clone)]
pub struct EngineLimits {
    pub max_iterations: u32,
    pub request_timeout: Duration,
}

/// The model/tool loop's position.
enum Phase {
    Agent,
    Tools(Vec<ToolInvocation>),
    Done,
}

/// State of a turn that has not been committed yet.
struct InFlight {
    state: AgentState,
    /// Index of the first message produced by this turn.
    turn_start: usize,
    transitions: Vec<Transition>,
}

pub struct ConversationEngine {
    model: Arc<dyn LanguageModel>,
    model_name: String,
    params: ModelParams,
    tools: ToolRegistry,
    backend: BackendClient,
    store: SessionStore,
    limits: EngineLimits,
}

impl ConversationEngine {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        model_name: impl Into<String>,
        params: ModelParams,
        tools: ToolRegistry,
        backend: BackendClient,
        store: SessionStore,
        limits: EngineLimits,
    ) -> Self {
        Self { model, model_name: model_name.into(), params, tools, backend, store, limits }
    }

    pub fn from_settings(
        model: Arc<dyn LanguageModel>,
        settings: &EffectiveSettings,
        store: SessionStore,
    ) -> anyhow::Result<Self> {
        let backend = BackendClient::new(settings.backends.clone(), settings.tool_timeout)?;
        let limits = EngineLimits { max_iterations: settings.max_iterations, request_timeout: settings.request_timeout };
        Ok(Self::new(
            model,
            settings.model.clone(),
            settings.model_params.clone(),
            ToolRegistry::with_default_tools(),
            backend,
            store,
            limits,
        ))
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn process_chat(&self, req: ChatRequest) -> Result<ChatReply, ChatError> {
        let query = req.query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }
        let session_id = resolve_session_id(req.session_id.as_deref());
        let mut session = self.store.lock_or_create(&session_id).await;
        let started_at = session.head().index;
        let mut run = initial_run(&session, &req, query);
        tracing::info!(%session_id, checkpoint = started_at, "chat turn started");

        let outcome = tokio::time::timeout(self.limits.request_timeout, self.run_loop(&session_id, &mut run))
            .await
            .unwrap_or(Err(ChatError::Timeout(self.limits.request_timeout)));
        if let Err(e) = outcome {
            metrics::counter!("chat_errors_total", "kind" => "chat").increment(1);
            tracing::error!(%session_id, error = %e, "chat error");
            rollback::recover_failed_turn(&session);
            self.store.discard_if_fresh(session).await;
            return Err(e);
        }

        let new_messages = &run.state.messages[run.turn_start..];
        let answer = final_answer(new_messages).unwrap_or_else(|| CHAT_FALLBACK_ANSWER.to_string());
        let tools_used = tools_used(new_messages);
        let turn = TurnRecord { query: query.to_string(), response: answer.clone(), timestamp: Utc::now() };
        let index = session.commit_turn(run.state, run.transitions, turn);
        metrics::counter!("chat_turns_total", "kind" => "chat").increment(1);
        tracing::info!(%session_id, checkpoint = index, tools = ?tools_used, "chat turn committed");

        Ok(ChatReply { answer, session_id, has_context: !tools_used.is_empty(), tools_used })
    }

    /// One direct model call with the speech prompt; no tools, no loop.
    pub async fn process_speech_chat(&self, query: &str, session_id: Option<&str>) -> Result<ChatReply, ChatError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChatError::EmptyQuery);
        }
        let session_id = resolve_session_id(session_id);
        let mut session = self.store.lock_or_create(&session_id).await;

        let req = ModelRequest {
            model: self.model_name.clone(),
            messages: vec![Message::system(SPEECH_SYSTEM_PROMPT), Message::user(query)],
            tools: Vec::new(),
            params: self.params.clone(),
        };
        let generated = tokio::time::timeout(self.limits.request_timeout, self.model.generate(req))
            .await
            .map_err(|_| ChatError::Timeout(self.limits.request_timeout))
            .and_then(|res| res.map_err(ChatError::Model));
        let resp = match generated {
            Ok(resp) => resp,
            Err(e) => {
                metrics::counter!("chat_errors_total", "kind" => "speech").increment(1);
                tracing::error!(%session_id, error = %e, "speech chat error");
                self.store.discard_if_fresh(session).await;
                return Err(e);
            }
        };
        let answer = Some(clean_answer(&resp.message.content))
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| SPEECH_FALLBACK_ANSWER.to_string());

        // speech turns only add a record; the agent's messages stay as they were
        let state = session.head().state.clone();
        let turn = TurnRecord { query: query.to_string(), response: answer.clone(), timestamp: Utc::now() };
        session.commit_turn(state, Vec::new(), turn);
        metrics::counter!("chat_turns_total", "kind" => "speech").increment(1);

        Ok(ChatReply { answer, session_id, tools_used: Vec::new(), has_context: false })
    }

    pub async fn rollback(&self, session_id: &str, steps: usize) -> Result<RollbackOutcome, ChatError> {
        rollback::rollback(&self.store, session_id, steps).await
    }

    pub async fn history(&self, session_id: &str) -> Vec<TurnRecord> {
        self.store.history(session_id).await
    }

    pub async fn clear(&self, session_id: &str) -> bool {
        self.store.clear(session_id).await
    }

    async fn run_loop(&self, session_id: &str, run: &mut InFlight) -> Result<(), ChatError> {
        let schemas = self.tools.schemas();
        let mut iterations = 0u32;
        let mut phase = Phase::Agent;
        loop {
            phase = match phase {
                Phase::Agent => {
                    if iterations >= self.limits.max_iterations {
                        return Err(ChatError::IterationLimit(self.limits.max_iterations));
                    }
                    iterations += 1;
                    let req = ModelRequest {
                        model: self.model_name.clone(),
                        messages: with_system_prompt(&run.state),
                        tools: schemas.clone(),
                        params: self.params.clone(),
                    };
                    let resp = self.model.generate(req).await.map_err(ChatError::Model)?;
                    let next = if resp.message.requests_tools() {
                        Phase::Tools(resp.message.tool_calls.clone())
                    } else {
                        Phase::Done
                    };
                    tracing::debug!(session_id, iteration = iterations, tool_calls = resp.message.tool_calls.len(), "agent node done");
                    run.state.messages.push(resp.message);
                    run.transitions.push(Transition { node: Node::Agent, message_count: run.state.messages.len() });
                    next
                }
                Phase::Tools(calls) => {
                    for call in &calls {
                        metrics::counter!("tool_calls_total", "tool" => tool_label(&call.name)).increment(1);
                        let ctx = ToolContext { backend: &self.backend, session_id };
                        let content = self.tools.dispatch(ctx, call).await;
                        run.state.messages.push(Message::tool_result(call.id.clone(), content));
                    }
                    run.transitions.push(Transition { node: Node::Tools, message_count: run.state.messages.len() });
                    Phase::Agent
                }
                Phase::Done => return Ok(()),
            };
        }
    }
}

fn initial_run(session: &Session, req: &ChatRequest, query: &str) -> InFlight {
    let head = &session.head().state;
    let mut messages: Vec<Message> = match &req.chat_history {
        Some(history) if !history.is_empty() => history.iter().filter_map(HistoryEntry::to_message).collect(),
        _ => head.messages.clone(),
    };
    messages.push(Message::user(query));
    let turn_start = messages.len();
    InFlight {
        state: AgentState {
            messages,
            language: req.language.clone().filter(|l| !l.trim().is_empty()).unwrap_or_else(|| "en".into()),
            user_location: req.location.clone().or_else(|| head.user_location.clone()),
            current_crop: req.crop.clone().or_else(|| head.current_crop.clone()),
        },
        turn_start,
        transitions: Vec::new(),
    }
}

/// Message list sent to the model; the prompt is added only when the history lacks one.
fn with_system_prompt(state: &AgentState) -> Vec<Message> {
    match state.messages.first() {
        Some(m) if m.role == Role::System => state.messages.clone(),
        _ => {
            let mut out = Vec::with_capacity(state.messages.len() + 1);
            out.push(Message::system(prompts::agent_prompt(state)));
            out.extend(state.messages.iter().cloned());
            out
        }
    }
}

fn final_answer(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| clean_answer(&m.content))
        .find(|c| !c.is_empty())
}

/// Metric label for a requested tool; names outside the registry share one series.
fn tool_label(name: &str) -> &'static str {
    ToolKind::from_name(name).map(ToolKind::name).unwrap_or("unknown")
}

fn tools_used(messages: &[Message]) -> Vec<String> {
    let mut used: Vec<String> = Vec::new();
    for call in messages.iter().flat_map(|m| m.tool_calls.iter()) {
        if !used.contains(&call.name) {
            used.push(call.name.clone());
        }
    }
    used
}

static CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s?\[\d+(?:\s*,\s*\d+)*\]").expect("citation pattern compiles")
});

/// Strip search-citation markers such as `[1]` or `[2, 3]` from model text.
fn clean_answer(text: &str) -> String {
    CITATION.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted replies and records every request.
    #[derive(Default)]
    struct ScriptedModel {
        replies: Mutex<VecDeque<anyhow::Result<Message>>>,
        requests: Mutex<Vec<ModelRequest>>,
        delay: Option<Duration>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<anyhow::Result<Message>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), ..Self::default() })
        }

        fn requests(&self) -> Vec<ModelRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse> {
            self.requests.lock().unwrap().push(req);
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            let next = self.replies.lock().unwrap().pop_front();
            let message = next.unwrap_or_else(|| Ok(Message::assistant("default answer")))?;
            Ok(ModelResponse { message, model: "scripted".into() })
        }
    }

    /// Model that asks for the crop calendar forever.
    struct LoopingModel;

    #[async_trait]
    impl LanguageModel for LoopingModel {
        async fn generate(&self, _req: ModelRequest) -> anyhow::Result<ModelResponse> {
            Ok(ModelResponse { message: calls(&[("get_crop_calendar", r#"{"crop":"rice"}"#)]), model: "loop".into() })
        }
    }

    fn calls(specs: &[(&str, &str)]) -> Message {
        let invocations = specs
            .iter()
            .enumerate()
            .map(|(i, (name, args))| ToolInvocation { id: format!("call_{i}"), name: (*name).into(), arguments: (*args).into() })
            .collect();
        Message::assistant_with_calls("", invocations)
    }

    fn engine(model: Arc<dyn LanguageModel>, max_iterations: u32, timeout: Duration) -> ConversationEngine {
        ConversationEngine::new(
            model,
            "test-model",
            ModelParams::default(),
            ToolRegistry::with_default_tools(),
            BackendClient::unreachable(),
            SessionStore::new(),
            EngineLimits { max_iterations, request_timeout: timeout },
        )
    }

    fn ask(query: &str, session_id: Option<&str>) -> ChatRequest {
        ChatRequest { query: query.into(), session_id: session_id.map(Into::into), ..ChatRequest::default() }
    }

    #[tokio::test]
    async fn plain_answer_ends_after_one_agent_transition() {
        let model = ScriptedModel::new(vec![Ok(Message::assistant("Sow wheat in November."))]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        let reply = eng.process_chat(ask("When to sow wheat?", Some("s1"))).await.unwrap();

        assert_eq!(reply.answer, "Sow wheat in November.");
        assert!(reply.tools_used.is_empty());
        assert!(!reply.has_context);
        assert_eq!(model.requests().len(), 1);

        let s = eng.store().lock("s1").await.unwrap();
        let head = s.head();
        assert_eq!(head.transitions, vec![Transition { node: Node::Agent, message_count: 2 }]);
        assert_eq!(s.turns.len(), 1);
        assert_eq!(s.checkpoint_count(), 2);
    }

    #[tokio::test]
    async fn tool_results_follow_calls_in_request_order() {
        let model = ScriptedModel::new(vec![
            Ok(calls(&[
                ("get_fertilizer_recommendation", r#"{"crop":"rice"}"#),
                ("get_crop_calendar", r#"{"crop":"rice"}"#),
            ])),
            Ok(Message::assistant("Use NPK 120:60:60 and transplant in June [1].")),
        ]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        let reply = eng.process_chat(ask("rice plan", Some("s1"))).await.unwrap();

        assert_eq!(reply.answer, "Use NPK 120:60:60 and transplant in June.");
        assert_eq!(reply.tools_used, vec!["get_fertilizer_recommendation", "get_crop_calendar"]);
        assert!(reply.has_context);

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(!requests[0].tools.is_empty());
        let second = &requests[1].messages;
        // system, user, assistant(calls), tool, tool
        assert_eq!(second.len(), 5);
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_0"));
        assert!(second[3].content.contains("NPK 120:60:60"));
        assert_eq!(second[4].tool_call_id.as_deref(), Some("call_1"));
        assert!(second[4].content.contains("Kharif"));

        let s = eng.store().lock("s1").await.unwrap();
        let nodes: Vec<Node> = s.head().transitions.iter().map(|t| t.node).collect();
        assert_eq!(nodes, vec![Node::Agent, Node::Tools, Node::Agent]);
    }

    #[tokio::test]
    async fn session_continuity_carries_previous_exchange() {
        let model = ScriptedModel::new(vec![Ok(Message::assistant("Hello farmer")), Ok(Message::assistant("Still here"))]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        eng.process_chat(ask("first question", Some("s1"))).await.unwrap();
        eng.process_chat(ask("second question", Some("s1"))).await.unwrap();

        let second = &model.requests()[1].messages;
        let contents: Vec<&str> = second.iter().map(|m| m.content.as_str()).collect();
        assert!(contents.contains(&"first question"));
        assert!(contents.contains(&"Hello farmer"));
        assert_eq!(second.last().unwrap().content, "second question");
        assert_eq!(second.iter().filter(|m| m.role == Role::System).count(), 1);

        let history = eng.history("s1").await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|t| !t.query.contains("KrishiVaani")));
    }

    #[tokio::test]
    async fn caller_history_replaces_session_prefix_and_keeps_own_system_prompt() {
        let model = ScriptedModel::new(vec![Ok(Message::assistant("ok"))]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        let req = ChatRequest {
            chat_history: Some(vec![
                HistoryEntry { role: "user".into(), content: "earlier q".into(), timestamp: None },
                HistoryEntry { role: "assistant".into(), content: "earlier a".into(), timestamp: None },
            ]),
            location: Some("Indore".into()),
            ..ask("now what?", None)
        };
        let reply = eng.process_chat(req).await.unwrap();
        assert!(reply.session_id.starts_with("session_"));

        let sent = &model.requests()[0].messages;
        assert_eq!(sent.len(), 4);
        assert!(sent[0].content.contains("- Location: Indore"));
        assert_eq!(sent[1].content, "earlier q");
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_back_and_loop_continues() {
        let model = ScriptedModel::new(vec![
            Ok(calls(&[("sell_tractor", "{}")])),
            Ok(Message::assistant("I can't do that.")),
        ]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        let reply = eng.process_chat(ask("sell my tractor", Some("s1"))).await.unwrap();
        assert_eq!(reply.answer, "I can't do that.");
        let tool_msg = &model.requests()[1].messages[3];
        assert!(tool_msg.content.starts_with("Error: unknown tool 'sell_tractor'"));
    }

    #[tokio::test]
    async fn empty_assistant_content_uses_fallback() {
        let model = ScriptedModel::new(vec![Ok(Message::assistant("   "))]);
        let eng = engine(model, 5, Duration::from_secs(5));
        let reply = eng.process_chat(ask("hello", None)).await.unwrap();
        assert_eq!(reply.answer, CHAT_FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn model_failure_leaves_session_at_last_checkpoint() {
        let model = ScriptedModel::new(vec![
            Ok(Message::assistant("first")),
            Ok(calls(&[("get_crop_calendar", r#"{"crop":"wheat"}"#)])),
            Err(anyhow::anyhow!("upstream 502")),
        ]);
        let eng = engine(model, 5, Duration::from_secs(5));
        eng.process_chat(ask("one", Some("s1"))).await.unwrap();
        let err = eng.process_chat(ask("two", Some("s1"))).await.unwrap_err();
        assert!(matches!(err, ChatError::Model(_)));

        let s = eng.store().lock("s1").await.unwrap();
        assert_eq!(s.checkpoint_count(), 2);
        assert_eq!(s.turns.len(), 1);
        assert_eq!(s.head().state.messages.last().unwrap().content, "first");
    }

    #[tokio::test]
    async fn iteration_cap_is_a_terminal_error() {
        let eng = engine(Arc::new(LoopingModel), 3, Duration::from_secs(5));
        let err = eng.process_chat(ask("loop", Some("s1"))).await.unwrap_err();
        assert!(matches!(err, ChatError::IterationLimit(3)));
        assert!(eng.store().lock("s1").await.is_none());
    }

    #[tokio::test]
    async fn failed_first_turn_leaves_no_session_behind() {
        let model = ScriptedModel::new(vec![
            Err(anyhow::anyhow!("upstream 502")),
            Err(anyhow::anyhow!("upstream 502")),
            Err(anyhow::anyhow!("upstream 502")),
        ]);
        let eng = engine(model, 5, Duration::from_secs(5));
        assert!(eng.process_chat(ask("q", Some("ghost"))).await.is_err());
        assert!(eng.process_chat(ask("q", None)).await.is_err());
        assert!(eng.process_speech_chat("q", None).await.is_err());

        assert_eq!(eng.store().len().await, 0);
        assert!(!eng.clear("ghost").await);
        assert!(matches!(eng.rollback("ghost", 1).await, Err(ChatError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn failed_turn_keeps_a_session_rolled_back_to_genesis() {
        let model = ScriptedModel::new(vec![Ok(Message::assistant("a1")), Err(anyhow::anyhow!("upstream 502"))]);
        let eng = engine(model, 5, Duration::from_secs(5));
        eng.process_chat(ask("q1", Some("s1"))).await.unwrap();
        eng.rollback("s1", 1).await.unwrap();
        assert!(eng.process_chat(ask("q2", Some("s1"))).await.is_err());

        let s = eng.store().lock("s1").await.unwrap();
        assert_eq!(s.checkpoint_count(), 1);
        assert!(s.turns.is_empty());
    }

    #[tokio::test]
    async fn timeout_is_a_terminal_error_and_writes_nothing() {
        let model = Arc::new(ScriptedModel { delay: Some(Duration::from_millis(200)), ..ScriptedModel::default() });
        let eng = engine(model, 5, Duration::from_millis(20));
        let err = eng.process_chat(ask("slow", Some("s1"))).await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
        assert!(eng.history("s1").await.is_empty());
    }

    #[tokio::test]
    async fn speech_chat_skips_tools() {
        let model = ScriptedModel::new(vec![Ok(calls(&[("get_weather_advisory", r#"{"location":"Pune"}"#)]))]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        let reply = eng.process_speech_chat("What is the weather today?", None).await.unwrap();

        assert_eq!(reply.answer, SPEECH_FALLBACK_ANSWER);
        assert!(reply.tools_used.is_empty());
        assert!(!reply.has_context);
        let req = &model.requests()[0];
        assert!(req.tools.is_empty());
        assert_eq!(req.messages[0].content, SPEECH_SYSTEM_PROMPT);

        let history = eng.history(&reply.session_id).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].query, "What is the weather today?");
    }

    #[tokio::test]
    async fn speech_turn_stays_out_of_the_agent_conversation() {
        let model = ScriptedModel::new(vec![Ok(Message::assistant("spoken answer")), Ok(Message::assistant("typed answer"))]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        eng.process_speech_chat("spoken question", Some("s1")).await.unwrap();
        eng.process_chat(ask("typed question", Some("s1"))).await.unwrap();

        let requests = model.requests();
        let sent: Vec<&str> = requests[1].messages.iter().skip(1).map(|m| m.content.as_str()).collect();
        assert_eq!(sent, vec!["typed question"]);

        let s = eng.store().lock("s1").await.unwrap();
        assert_eq!(s.turns.len(), 2);
        assert_eq!(s.checkpoint_count(), 3);
        drop(s);
        eng.rollback("s1", 1).await.unwrap();
        let s = eng.store().lock("s1").await.unwrap();
        assert!(s.head().state.messages.is_empty());
        assert_eq!(s.turns[0].query, "spoken question");
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let eng = engine(ScriptedModel::new(Vec::new()), 5, Duration::from_secs(5));
        assert!(matches!(eng.process_chat(ask("  ", None)).await, Err(ChatError::EmptyQuery)));
        assert!(matches!(eng.process_speech_chat("", None).await, Err(ChatError::EmptyQuery)));
        assert_eq!(eng.store().len().await, 0);
    }

    #[tokio::test]
    async fn rollback_after_turns_restores_previous_context() {
        let model = ScriptedModel::new(vec![Ok(Message::assistant("a1")), Ok(Message::assistant("a2")), Ok(Message::assistant("a3"))]);
        let eng = engine(model.clone(), 5, Duration::from_secs(5));
        eng.process_chat(ask("q1", Some("s1"))).await.unwrap();
        eng.process_chat(ask("q2", Some("s1"))).await.unwrap();

        let out = eng.rollback("s1", 1).await.unwrap();
        assert_eq!(out.remaining_history, 1);

        eng.process_chat(ask("q3", Some("s1"))).await.unwrap();
        let third = &model.requests()[2].messages;
        let contents: Vec<&str> = third.iter().map(|m| m.content.as_str()).collect();
        assert!(contents.contains(&"q1"));
        assert!(!contents.contains(&"q2"));
    }

    #[test]
    fn tool_metric_labels_are_bounded_to_known_tools() {
        assert_eq!(tool_label("get_crop_calendar"), "get_crop_calendar");
        assert_eq!(tool_label("sell_tractor"), "unknown");
        assert_eq!(tool_label(""), "unknown");
    }

    #[test]
    fn citation_markers_are_removed() {
        assert_eq!(clean_answer("Spray neem oil [1][2]. Repeat weekly [3, 4]."), "Spray neem oil. Repeat weekly.");
        assert_eq!(clean_answer("Keep [crop] rows apart"), "Keep [crop] rows apart");
    }
}
