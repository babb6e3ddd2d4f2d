mod support;

use chat_api::ChatApiError;
use chat_client::{EngineError, LifecycleTag, Role, SendEvent, SendOutcome, SendState};
use pretty_assertions::assert_eq;

use support::{Harness, ScriptedTransport, StreamScript};

#[tokio::test]
async fn streamed_reply_becomes_durable_transcript() {
    let transport = ScriptedTransport::new(vec![StreamScript::lines(&[
        r#"{"content":"Hel"}"#,
        r#"{"content":"lo"}"#,
        "[DONE]",
    ])])
    .with_sessions(&["s-1", "s-0"]);
    let mut harness = Harness::new(transport);

    let outcome = harness
        .controller
        .send("s-1", "hi", Some("qwen-max"))
        .await
        .expect("send starts");

    assert!(matches!(
        &outcome,
        SendOutcome::Succeeded { attempts: 1, reply, .. } if reply == "Hello"
    ));
    assert_eq!(
        harness.snapshot(),
        vec![
            (Role::User, "hi".to_string(), LifecycleTag::None),
            (Role::Assistant, "Hello".to_string(), LifecycleTag::None),
        ]
    );

    let requests = harness.transport.stream_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].session_id, "s-1");
    assert_eq!(requests[0].model.as_deref(), Some("qwen-max"));
    assert!(harness.transport.complete_requests().is_empty());

    let send_id = outcome.send_id();
    assert_eq!(
        harness.drain_events(),
        vec![
            SendEvent::Started {
                send_id,
                session_id: "s-1".to_string()
            },
            SendEvent::Token {
                send_id,
                text: "Hel".to_string()
            },
            SendEvent::Token {
                send_id,
                text: "lo".to_string()
            },
            SendEvent::Completed {
                send_id,
                reply: "Hello".to_string()
            },
        ]
    );

    assert_eq!(harness.transport.list_sessions_calls(), 1);
    let directory = harness.controller.directory();
    let directory = support::lock_unpoisoned(&directory);
    assert_eq!(directory.sessions().len(), 2);
}

#[tokio::test]
async fn stream_without_sentinel_still_succeeds() {
    let transport = ScriptedTransport::new(vec![StreamScript::Chunks(vec![
        b"data: {\"content\":\"caf".to_vec(),
        "\u{e9}\"}\n".as_bytes()[..1].to_vec(),
        "\u{e9}\"}\n".as_bytes()[1..].to_vec(),
    ])]);
    let harness = Harness::new(transport);

    let outcome = harness
        .controller
        .send("s-1", "hi", None)
        .await
        .expect("send starts");

    assert!(matches!(&outcome, SendOutcome::Succeeded { reply, .. } if reply == "café"));
    assert_eq!(harness.snapshot()[1].1, "café");
}

#[tokio::test]
async fn empty_stream_falls_back_to_full_reply() {
    let transport = ScriptedTransport::new(vec![StreamScript::lines(&["[DONE]"])])
        .with_reply(Ok("whole reply".to_string()));
    let harness = Harness::new(transport);

    let outcome = harness
        .controller
        .send("s-1", "hi", None)
        .await
        .expect("send starts");

    assert!(matches!(&outcome, SendOutcome::Succeeded { reply, .. } if reply == "whole reply"));
    assert_eq!(harness.transport.complete_requests().len(), 1);
    assert_eq!(
        harness.snapshot(),
        vec![
            (Role::User, "hi".to_string(), LifecycleTag::None),
            (Role::Assistant, "whole reply".to_string(), LifecycleTag::None),
        ]
    );
}

#[tokio::test]
async fn empty_tokens_reuse_placeholder_for_fallback_text() {
    let transport = ScriptedTransport::new(vec![StreamScript::lines(&[
        r#"{"content":""}"#,
        r#"{"content":""}"#,
        "[DONE]",
    ])])
    .with_reply(Ok("from fallback".to_string()));
    let harness = Harness::new(transport);

    harness
        .controller
        .send("s-1", "hi", None)
        .await
        .expect("send starts");

    let snapshot = harness.snapshot();
    let assistants: Vec<_> = snapshot
        .iter()
        .filter(|(role, _, _)| *role == Role::Assistant)
        .collect();
    assert_eq!(assistants.len(), 1);
    assert_eq!(assistants[0].1, "from fallback");
    assert_eq!(assistants[0].2, LifecycleTag::None);
}

#[tokio::test]
async fn non_conflict_status_fails_without_retry() {
    let transport = ScriptedTransport::new(vec![
        StreamScript::Status(500, "boom"),
        StreamScript::lines(&[r#"{"content":"never"}"#]),
    ]);
    let mut harness = Harness::new(transport);

    let outcome = harness
        .controller
        .send("s-1", "hi", None)
        .await
        .expect("send starts");

    assert_eq!(outcome.state(), SendState::FailedTerminal);
    assert_eq!(outcome.attempts(), 1);
    assert!(harness.snapshot().is_empty());
    assert_eq!(harness.transport.stream_requests().len(), 1);
    assert_eq!(harness.transport.list_sessions_calls(), 1);

    let events = harness.drain_events();
    assert!(matches!(
        events.last(),
        Some(SendEvent::Failed { exhausted: false, attempts: 1, .. })
    ));
    assert!(!events
        .iter()
        .any(|event| matches!(event, SendEvent::Retrying { .. })));
}

#[tokio::test]
async fn in_band_error_rolls_back_partial_reply() {
    let transport = ScriptedTransport::new(vec![StreamScript::lines(&[
        r#"{"content":"partial "}"#,
        r#"{"error":"model overloaded"}"#,
    ])]);
    let harness = Harness::new(transport);

    let outcome = harness
        .controller
        .send("s-1", "hi", None)
        .await
        .expect("send starts");

    match outcome {
        SendOutcome::FailedTerminal {
            error: ChatApiError::StreamFailed { message },
            ..
        } => assert_eq!(message, "model overloaded"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(harness.snapshot().is_empty());
    assert!(harness.transport.complete_requests().is_empty());
}

#[tokio::test]
async fn fallback_failure_is_terminal() {
    let transport = ScriptedTransport::new(vec![StreamScript::lines(&["[DONE]"])]).with_reply(Err(
        ChatApiError::Status {
            status: chat_api::StatusCode::BAD_GATEWAY,
            message: "upstream".to_string(),
        },
    ));
    let harness = Harness::new(transport);

    let outcome = harness
        .controller
        .send("s-1", "hi", None)
        .await
        .expect("send starts");

    assert_eq!(outcome.state(), SendState::FailedTerminal);
    assert!(harness.snapshot().is_empty());
}

#[tokio::test]
async fn session_refresh_failure_does_not_change_outcome() {
    let transport = ScriptedTransport::new(vec![StreamScript::lines(&[r#"{"content":"ok"}"#])]);
    transport.fail_list_sessions();
    let harness = Harness::new(transport);

    let outcome = harness
        .controller
        .send("s-1", "hi", None)
        .await
        .expect("send starts");

    assert!(outcome.is_success());
    let directory = harness.controller.directory();
    let directory = support::lock_unpoisoned(&directory);
    assert!(directory.last_error().is_some());
    assert!(directory.sessions().is_empty());
}

#[tokio::test]
async fn sends_that_cannot_start_leave_transcript_untouched() {
    let harness = Harness::new(ScriptedTransport::new(Vec::new()));

    assert!(matches!(
        harness.controller.send("s-1", "   ", None).await,
        Err(EngineError::EmptyMessage)
    ));
    assert!(matches!(
        harness.controller.send("s-9", "hi", None).await,
        Err(EngineError::SessionNotActive { requested, active }) if requested == "s-9" && active == "s-1"
    ));
    assert!(harness.snapshot().is_empty());
    assert!(harness.transport.stream_requests().is_empty());
    assert_eq!(harness.transport.list_sessions_calls(), 0);
}
