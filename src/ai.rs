use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Result, SdkError};
use crate::events::{EventBus, SdkEvent};
use crate::transport::{unwrap_field, RequestOptions, Transport};
use crate::types::{
    new_session_id, AiResponse, AiSession, AiStatus, AiTemplate, ChatOptions, ChatRole, ChatTurn,
    ConfigUpdate, SdkConfig,
};

/// Client for the AI assistant, keeping conversation sessions in memory.
///
/// Each session holds at most `max_history_turns` turns; the oldest are
/// dropped first. A bound of zero keeps everything.
#[derive(Debug, Clone)]
pub struct AiClient {
    transport: Transport,
    events: EventBus,
    sessions: Arc<Mutex<HashMap<String, AiSession>>>,
    max_history_turns: usize,
}

fn push_turn(session: &mut AiSession, turn: ChatTurn, max_turns: usize) {
    session.conversation_history.push(turn);
    let len = session.conversation_history.len();
    if max_turns > 0 && len > max_turns {
        session.conversation_history.drain(..len - max_turns);
    }
    session.updated_at = Utc::now();
}

impl AiClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self::with_transport(Transport::new(config), config)
    }

    pub fn with_transport(transport: Transport, config: &SdkConfig) -> Self {
        Self {
            transport,
            events: EventBus::new(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            max_history_turns: config.max_history_turns,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn update_config(&self, update: &ConfigUpdate) {
        self.transport.apply_update(update);
    }

    fn with_sessions<R>(&self, f: impl FnOnce(&mut HashMap<String, AiSession>) -> R) -> R {
        match self.sessions.lock() {
            Ok(mut sessions) => f(&mut sessions),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn create_session(&self, context: Option<&str>) -> String {
        let session_id = new_session_id("ai");
        let now = Utc::now();
        let session = AiSession {
            session_id: session_id.clone(),
            conversation_history: Vec::new(),
            code_context: context.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.with_sessions(|sessions| sessions.insert(session_id.clone(), session));
        tracing::debug!("Created AI session {}", session_id);
        session_id
    }

    pub fn get_session(&self, session_id: &str) -> Option<AiSession> {
        self.with_sessions(|sessions| sessions.get(session_id).cloned())
    }

    pub fn list_sessions(&self) -> Vec<String> {
        let mut ids = self.with_sessions(|sessions| sessions.keys().cloned().collect::<Vec<_>>());
        ids.sort();
        ids
    }

    pub fn clear_session(&self, session_id: &str) {
        self.with_sessions(|sessions| {
            if let Some(session) = sessions.get_mut(session_id) {
                session.conversation_history.clear();
                session.updated_at = Utc::now();
            }
        });
    }

    pub fn delete_session(&self, session_id: &str) {
        self.with_sessions(|sessions| sessions.remove(session_id));
    }

    pub fn update_session_context(&self, session_id: &str, context: &str) {
        self.with_sessions(|sessions| {
            if let Some(session) = sessions.get_mut(session_id) {
                session.code_context = Some(context.to_string());
                session.updated_at = Utc::now();
            }
        });
    }

    /// Send `message` within a session, creating one when no id is given.
    ///
    /// The user turn is recorded before the request; the assistant turn only
    /// when the backend reports success.
    pub async fn chat(&self, message: &str, options: ChatOptions) -> Result<AiResponse> {
        if message.trim().is_empty() {
            return Err(SdkError::InvalidInput("Message cannot be empty".to_string()));
        }

        let session_id = match options.session_id {
            Some(id) => id,
            None => self.create_session(options.context.as_deref()),
        };

        let max_turns = self.max_history_turns;
        let (history, context) = self
            .with_sessions(|sessions| {
                let session = sessions.get_mut(&session_id)?;
                if let Some(context) = &options.context {
                    session.code_context = Some(context.clone());
                }
                push_turn(session, ChatTurn::new(ChatRole::User, message), max_turns);
                Some((session.conversation_history.clone(), session.code_context.clone()))
            })
            .ok_or_else(|| SdkError::SessionNotFound(session_id.clone()))?;

        let body = json!({
            "message": message,
            "sessionId": session_id,
            "conversationHistory": history,
            "context": context,
        });

        let mut response = match self.transport.post::<_, AiResponse>("/ai/chat", &body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("AI chat in {} failed: {}", session_id, e);
                self.events.emit(SdkEvent::error("ai", e.to_string()));
                return Err(e);
            }
        };
        response.session_id = Some(session_id.clone());

        if response.success {
            let reply = response.text().unwrap_or_default().to_string();
            self.with_sessions(|sessions| {
                if let Some(session) = sessions.get_mut(&session_id) {
                    push_turn(session, ChatTurn::new(ChatRole::Assistant, reply), max_turns);
                }
            });
            self.events.emit(SdkEvent::AiResponse {
                session_id: Some(session_id),
                operation: "chat".to_string(),
                response: response.clone(),
            });
        } else {
            let error = response
                .error
                .clone()
                .or_else(|| response.message.clone())
                .unwrap_or_else(|| "AI chat failed".to_string());
            tracing::warn!("AI chat in {} was rejected: {}", session_id, error);
            self.events.emit(SdkEvent::error("ai", error));
        }

        Ok(response)
    }

    async fn single_shot(&self, operation: &str, path: &str, body: Value) -> Result<AiResponse> {
        tracing::debug!("AI {} request", operation);
        match self.transport.post::<_, AiResponse>(path, &body).await {
            Ok(response) if response.success => {
                self.events.emit(SdkEvent::AiResponse {
                    session_id: None,
                    operation: operation.to_string(),
                    response: response.clone(),
                });
                Ok(response)
            }
            Ok(response) => {
                let error = response
                    .error
                    .clone()
                    .or_else(|| response.message.clone())
                    .unwrap_or_else(|| format!("AI {} failed", operation));
                tracing::warn!("AI {} was rejected: {}", operation, error);
                self.events.emit(SdkEvent::error("ai", error));
                Ok(response)
            }
            Err(e) => {
                tracing::error!("AI {} failed: {}", operation, e);
                self.events.emit(SdkEvent::error("ai", e.to_string()));
                Err(e)
            }
        }
    }

    fn require_code(code: &str) -> Result<()> {
        if code.trim().is_empty() {
            return Err(SdkError::InvalidInput("Code cannot be empty".to_string()));
        }
        Ok(())
    }

    pub async fn review_code(&self, code: &str, focus: Option<&str>) -> Result<AiResponse> {
        Self::require_code(code)?;
        self.single_shot("code-review", "/ai/code-review", json!({ "code": code, "focus": focus }))
            .await
    }

    pub async fn generate_contract(&self, description: &str, template: Option<&str>) -> Result<AiResponse> {
        if description.trim().is_empty() {
            return Err(SdkError::InvalidInput("Description cannot be empty".to_string()));
        }
        self.single_shot(
            "generate-contract",
            "/ai/generate-contract",
            json!({ "description": description, "template": template }),
        )
        .await
    }

    pub async fn optimize_code(&self, code: &str, goal: Option<&str>) -> Result<AiResponse> {
        Self::require_code(code)?;
        self.single_shot("optimize", "/ai/optimize", json!({ "code": code, "goal": goal }))
            .await
    }

    pub async fn explain_code(&self, code: &str, level: Option<&str>) -> Result<AiResponse> {
        Self::require_code(code)?;
        self.single_shot("explain", "/ai/explain", json!({ "code": code, "level": level }))
            .await
    }

    pub async fn debug_code(&self, code: &str, error_message: &str) -> Result<AiResponse> {
        Self::require_code(code)?;
        self.single_shot("debug", "/ai/debug", json!({ "code": code, "error": error_message }))
            .await
    }

    pub async fn get_templates(&self, category: Option<&str>) -> Result<Vec<AiTemplate>> {
        let mut options = RequestOptions::default();
        if let Some(category) = category {
            options = options.query("category", category);
        }
        let result = self
            .transport
            .get_with::<Value>("/ai/templates", options)
            .await
            .and_then(|value| unwrap_field(value, "templates"));
        if let Err(e) = &result {
            self.events.emit(SdkEvent::error("ai", e.to_string()));
        }
        result
    }

    pub async fn get_status(&self) -> Result<AiStatus> {
        let result = self
            .transport
            .get::<Value>("/ai/status")
            .await
            .and_then(|value| unwrap_field(value, "status"));
        if let Err(e) = &result {
            self.events.emit(SdkEvent::error("ai", e.to_string()));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockBackend;
    use reqwest::Method;

    fn client_with(config: SdkConfig) -> (Arc<MockBackend>, AiClient) {
        let mock = Arc::new(MockBackend::new());
        let transport = Transport::with_backend(&config, mock.clone());
        (mock, AiClient::with_transport(transport, &config))
    }

    fn client() -> (Arc<MockBackend>, AiClient) {
        client_with(SdkConfig::default())
    }

    fn history_len(client: &AiClient, session_id: &str) -> usize {
        client.get_session(session_id).unwrap().conversation_history.len()
    }

    #[tokio::test]
    async fn test_successful_chat_records_both_turns() {
        let (mock, client) = client();
        mock.on(
            Method::POST,
            "/ai/chat",
            200,
            json!({"success": true, "response": "Use a mapping.", "message": "Chat completed"}),
        );
        let session_id = client.create_session(Some("contract Token: pass"));
        let mut rx = client.events().subscribe();

        let response = client
            .chat(
                "How do I store balances?",
                ChatOptions {
                    session_id: Some(session_id.clone()),
                    context: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(response.response.as_deref(), Some("Use a mapping."));
        assert_eq!(response.session_id.as_deref(), Some(session_id.as_str()));

        let session = client.get_session(&session_id).unwrap();
        assert_eq!(session.conversation_history.len(), 2);
        assert_eq!(session.conversation_history[0].role, ChatRole::User);
        assert_eq!(session.conversation_history[1].role, ChatRole::Assistant);
        assert_eq!(session.conversation_history[1].content, "Use a mapping.");

        let body = mock.last_request().unwrap().body.unwrap();
        assert_eq!(body["sessionId"], session_id.as_str());
        assert_eq!(body["context"], "contract Token: pass");
        assert_eq!(body["conversationHistory"].as_array().unwrap().len(), 1);

        assert_eq!(rx.try_recv().unwrap().name(), "ai:response");
    }

    #[tokio::test]
    async fn test_rejected_chat_keeps_only_user_turn() {
        let (mock, client) = client();
        mock.on(
            Method::POST,
            "/ai/chat",
            200,
            json!({"success": false, "error": "model overloaded"}),
        );
        let session_id = client.create_session(None);
        let mut rx = client.events().subscribe();

        let response = client
            .chat(
                "hello",
                ChatOptions {
                    session_id: Some(session_id.clone()),
                    context: None,
                },
            )
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(history_len(&client, &session_id), 1);
        assert_eq!(rx.try_recv().unwrap().name(), "error");
    }

    #[tokio::test]
    async fn test_failed_request_keeps_only_user_turn() {
        let (mock, client) = client();
        mock.on(Method::POST, "/ai/chat", 429, json!({"message": "slow down"}));
        let session_id = client.create_session(None);

        let err = client
            .chat(
                "hello",
                ChatOptions {
                    session_id: Some(session_id.clone()),
                    context: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::RateLimited(_)));
        assert_eq!(history_len(&client, &session_id), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected_locally() {
        let (mock, client) = client();
        let err = client
            .chat(
                "hello",
                ChatOptions {
                    session_id: Some("ai_0_missing".into()),
                    context: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SdkError::SessionNotFound(id) if id == "ai_0_missing"));
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_chat_without_session_creates_one() {
        let (mock, client) = client();
        mock.on(Method::POST, "/ai/chat", 200, json!({"success": true, "message": "hi"}));

        let response = client.chat("hello", ChatOptions::default()).await.unwrap();
        let session_id = response.session_id.unwrap();

        assert!(session_id.starts_with("ai_"));
        assert_eq!(client.list_sessions(), vec![session_id.clone()]);
        assert_eq!(history_len(&client, &session_id), 2);
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let (mock, client) = client_with(SdkConfig {
            max_history_turns: 3,
            ..SdkConfig::default()
        });
        mock.on(Method::POST, "/ai/chat", 200, json!({"success": true, "response": "ok"}));
        let session_id = client.create_session(None);

        for i in 0..3 {
            client
                .chat(
                    &format!("question {}", i),
                    ChatOptions {
                        session_id: Some(session_id.clone()),
                        context: None,
                    },
                )
                .await
                .unwrap();
        }

        let history = client.get_session(&session_id).unwrap().conversation_history;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "ok");
        assert_eq!(history[1].content, "question 2");
    }

    #[tokio::test]
    async fn test_session_management() {
        let (_, client) = client();
        let id = client.create_session(None);

        client.update_session_context(&id, "def f(): pass");
        assert_eq!(
            client.get_session(&id).unwrap().code_context.as_deref(),
            Some("def f(): pass")
        );

        client.clear_session("ai_0_unknown");
        client.update_session_context("ai_0_unknown", "x");
        client.delete_session("ai_0_unknown");
        assert_eq!(client.list_sessions().len(), 1);

        client.delete_session(&id);
        assert!(client.get_session(&id).is_none());
    }

    #[tokio::test]
    async fn test_single_shot_operations() {
        let (mock, client) = client();
        mock.on(
            Method::POST,
            "/ai/code-review",
            200,
            json!({"success": true, "response": "Looks fine", "issues": [{"severity": "low"}]}),
        );
        mock.on(
            Method::GET,
            "/ai/templates",
            200,
            json!({"success": true, "templates": [{"id": "erc20", "name": "Token", "description": "Fungible token"}]}),
        );
        let mut rx = client.events().subscribe();

        let review = client.review_code("def f(): pass", Some("security")).await.unwrap();
        assert_eq!(review.extra["issues"][0]["severity"], "low");
        assert!(client.list_sessions().is_empty());
        match rx.try_recv().unwrap() {
            SdkEvent::AiResponse { session_id, operation, .. } => {
                assert!(session_id.is_none());
                assert_eq!(operation, "code-review");
            }
            other => panic!("unexpected {:?}", other),
        }

        let templates = client.get_templates(None).await.unwrap();
        assert_eq!(templates[0].id, "erc20");

        assert!(matches!(
            client.debug_code("", "boom").await,
            Err(SdkError::InvalidInput(_))
        ));
        assert_eq!(mock.request_count(), 2);
    }
}
