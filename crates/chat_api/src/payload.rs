use serde::{Deserialize, Serialize};

/// Placeholder that API explorers prefill into optional string fields.
const MODEL_PLACEHOLDER: &str = "string";

/// Request body shared by the streaming and non-streaming chat endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_name: Option<String>,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            model: None,
            character_id: None,
            character_name: None,
        }
    }

    /// Sets the per-turn model override; blank values and the `"string"`
    /// placeholder clear it.
    pub fn with_model(mut self, model: Option<&str>) -> Self {
        self.model = sanitize_model(model);
        self
    }

    pub fn with_character_id(mut self, character_id: i64) -> Self {
        self.character_id = Some(character_id);
        self
    }

    pub fn with_character_name(mut self, character_name: impl Into<String>) -> Self {
        self.character_name = Some(character_name.into());
        self
    }
}

pub fn sanitize_model(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(MODEL_PLACEHOLDER) {
        None
    } else {
        Some(value.to_owned())
    }
}

/// Body of the non-streaming chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// One row of the session list, most recently active first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    #[serde(default)]
    pub character_id: Option<i64>,
    #[serde(default)]
    pub character_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_active_at: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl SessionSummary {
    /// Title if set, otherwise the bound character, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .or(self.character_name.as_deref())
            .unwrap_or(&self.session_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

/// One persisted message of a session, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl HistoryMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub recommended: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub default: String,
    #[serde(default)]
    pub models: Vec<ModelOption>,
}

impl ModelCatalog {
    pub fn contains(&self, model_id: &str) -> bool {
        self.default == model_id || self.models.iter().any(|model| model.id == model_id)
    }
}
