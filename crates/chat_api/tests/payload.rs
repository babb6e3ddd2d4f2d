use chat_api::{
    sanitize_model, ChatRequest, HistoryMessage, MessageRole, ModelCatalog, SessionSummary,
};
use serde_json::{json, Value};

#[test]
fn chat_request_omits_unset_optional_fields() {
    let body = serde_json::to_value(ChatRequest::new("s-1", "hello")).expect("serialize");

    assert_eq!(body, json!({"session_id": "s-1", "message": "hello"}));
}

#[test]
fn chat_request_carries_model_and_character_when_set() {
    let request = ChatRequest::new("s-1", "hello")
        .with_model(Some(" deepseek-v3 "))
        .with_character_id(7)
        .with_character_name("Sherlock");
    let body = serde_json::to_value(&request).expect("serialize");

    assert_eq!(body["model"], Value::String("deepseek-v3".to_string()));
    assert_eq!(body["character_id"], json!(7));
    assert_eq!(body["character_name"], json!("Sherlock"));
}

#[test]
fn model_placeholders_are_dropped() {
    assert_eq!(sanitize_model(None), None);
    assert_eq!(sanitize_model(Some("   ")), None);
    assert_eq!(sanitize_model(Some("String")), None);
    assert_eq!(sanitize_model(Some("qwen-max")), Some("qwen-max".to_string()));
}

#[test]
fn session_summary_tolerates_missing_and_null_fields() {
    let rows: Vec<SessionSummary> = serde_json::from_value(json!([
        {
            "session_id": "abc",
            "character_id": null,
            "character_name": "Holmes",
            "created_at": "2024-05-01T10:00:00",
            "last_active_at": "2024-05-01T10:05:00",
            "title": null
        },
        {"session_id": "def"}
    ]))
    .expect("deserialize sessions");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].display_name(), "Holmes");
    assert_eq!(rows[1].display_name(), "def");
    assert_eq!(rows[1].last_active_at, None);
}

#[test]
fn history_roles_outside_the_transcript_are_preserved_as_other() {
    let rows: Vec<HistoryMessage> = serde_json::from_value(json!([
        {"role": "user", "content": "hi", "created_at": "2024-05-01T10:00:00"},
        {"role": "assistant", "content": "hello"},
        {"role": "tool", "content": "{}"}
    ]))
    .expect("deserialize history");

    assert_eq!(rows[0].role, MessageRole::User);
    assert_eq!(rows[1].role, MessageRole::Assistant);
    assert_eq!(rows[2].role, MessageRole::Other);
}

#[test]
fn model_catalog_lookup_includes_default() {
    let catalog: ModelCatalog = serde_json::from_value(json!({
        "default": "deepseek-v3",
        "models": [{"id": "qwen-max", "label": "qwen-max", "recommended": false}]
    }))
    .expect("deserialize catalog");

    assert!(catalog.contains("deepseek-v3"));
    assert!(catalog.contains("qwen-max"));
    assert!(!catalog.contains("gpt-x"));
}
