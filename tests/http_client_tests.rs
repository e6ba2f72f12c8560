use futures::StreamExt;
use mygpt::api::{ApiClient, ChatBackend, StreamParser};
use mygpt::config::Config;
use mygpt::state::conversation::drive_turn;
use mygpt::state::{SessionEvent, StreamOutcome, TurnHandle};
use mygpt::types::{ChatRequest, ProposalDecision, Role, StreamRequest, ToolRunRequest};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ApiClient {
    let config = Config {
        backend_url: format!("{}/", server.uri()),
        ..Config::default()
    };
    ApiClient::new(&config).expect("client")
}

fn sse_body(frames: &[serde_json::Value]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect()
}

#[tokio::test]
async fn test_open_stream_posts_chat_body_and_streams_frames() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_json(json!({"content": "Hello", "conversation_id": 7})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&[json!({"token": "Hi"}), json!({"done": true})])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let request = StreamRequest::Chat(ChatRequest {
        content: "Hello".to_string(),
        conversation_id: 7,
    });
    let mut stream = client.open_stream(&request).await.expect("stream opens");
    let mut parser = StreamParser::new();
    let mut events = Vec::new();
    while let Some(chunk) = stream.next().await {
        events.extend(parser.process(&chunk.expect("chunk")));
    }
    events.extend(parser.finish());

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].token_text(), Some("Hi"));
    assert!(events[1].done);
}

#[tokio::test]
async fn test_http_error_surfaces_detail_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/preference-proposals/5/approve"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"detail": "Proposal is not pending"})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .decide_proposal(5, ProposalDecision::Approve)
        .await
        .expect_err("conflict is an error");
    let message = err.to_string();
    assert!(message.contains("409"), "{message}");
    assert!(message.contains("Proposal is not pending"), "{message}");
}

#[tokio::test]
async fn test_pending_proposals_query_and_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/preference-proposals"))
        .and(query_param("conversation_id", "7"))
        .and(query_param("status", "pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "proposals": [{
                "id": 3,
                "conversation_id": 7,
                "key": "tone",
                "value": "brief",
                "proposal_text": "Be brief?",
                "status": "pending",
                "created_at": "2024-01-01T00:00:00"
            }]
        })))
        .mount(&server)
        .await;

    let proposals = client_for(&server)
        .pending_proposals(7)
        .await
        .expect("proposals");
    assert_eq!(proposals.len(), 1);
    assert!(proposals[0].is_pending());
}

#[tokio::test]
async fn test_tool_catalog_accepts_bare_and_wrapped_lists() {
    let tool = json!({
        "tool_id": "run_command",
        "description": "Run an allowlisted command",
        "requires_confirmation": true,
        "requires_network": false
    });

    let bare = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([tool.clone()])))
        .mount(&bare)
        .await;
    let wrapped = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tools": [tool]})))
        .mount(&wrapped)
        .await;

    for server in [&bare, &wrapped] {
        let tools = client_for(server).list_tools().await.expect("tools");
        assert_eq!(tools.len(), 1);
        assert!(tools[0].requires_confirmation);
    }
}

#[tokio::test]
async fn test_tool_missing_network_flag_fails_catalog_load() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "tool_id": "fetch_url",
            "description": "Fetch a page",
            "requires_confirmation": false
        }])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    mygpt::state::tool_gate::load_tools(&client, &tx).await;

    match rx.try_recv().expect("one event") {
        SessionEvent::BackendError { context, .. } => assert_eq!(context, "tool catalog"),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn test_run_tool_sends_causality_and_confirmation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tools/run"))
        .and(body_json(json!({
            "tool_id": "run_command",
            "tool_input": {"command": "ls"},
            "conversation_id": 7,
            "causality_message_id": 11,
            "confirmed": true
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "output": {"stdout": "a\n"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .run_tool(&ToolRunRequest {
            tool_id: "run_command".to_string(),
            tool_input: json!({"command": "ls"}),
            conversation_id: 7,
            causality_message_id: 11,
            confirmed: true,
        })
        .await
        .expect("tool result");
    assert!(result.success);
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_create_conversation_returns_new_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "title": null})))
        .mount(&server)
        .await;

    let id = client_for(&server)
        .create_conversation(None)
        .await
        .expect("created");
    assert_eq!(id, 42);
}

#[tokio::test]
async fn test_turn_against_http_backend_reconciles_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
            json!({"token": "Hi"}),
            json!({"token": " there"}),
            json!({"done": true}),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/messages"))
        .and(query_param("conversation_id", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "role": "user", "content": "Hello", "timestamp": "t1"},
            {"id": 2, "role": "assistant", "content": "Hi there", "timestamp": "t2"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/preference-proposals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"proposals": []})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let turn = TurnHandle {
        turn_id: 1,
        request: StreamRequest::Chat(ChatRequest {
            content: "Hello".to_string(),
            conversation_id: 7,
        }),
    };
    let outcome = drive_turn(&client, turn, CancellationToken::new(), &tx).await;
    assert_eq!(outcome, StreamOutcome::Completed);
    drop(tx);

    let mut tokens = String::new();
    let mut reloaded = None;
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Token { text, .. } => tokens.push_str(&text),
            SessionEvent::MessagesLoaded { messages, .. } => reloaded = Some(messages),
            _ => {}
        }
    }
    assert_eq!(tokens, "Hi there");
    let messages = reloaded.expect("history reloaded after completion");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].id, Some(2));
}
