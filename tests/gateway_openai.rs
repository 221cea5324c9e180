use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chat_eval_harness::diagnostics::RecordingSink;
use chat_eval_harness::gateway::openai::{ChatProvider, OpenAiAdapter};
use chat_eval_harness::gateway::{
    BatchDispatcher, ChatRequest, DispatchConfig, FinishReason, GenerationParams, Message,
    ProviderError,
};
use chat_eval_harness::language_model::{LanguageModel, OpenAiChatModel};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn adapter(server: &MockServer) -> OpenAiAdapter {
    OpenAiAdapter::with_config("sk-test", server.uri(), Duration::from_secs(5), None).unwrap()
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
    })
}

#[tokio::test]
async fn openai_parses_content_and_usage() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello")))
        .mount(&server)
        .await;

    let req = ChatRequest::new("gpt-test", vec![Message::user("hi")]);
    let resp = adapter(&server).chat(&req).await.unwrap();

    assert_eq!(resp.content, "hello");
    assert_eq!(resp.finish_reason, FinishReason::Stop);
    assert_eq!(resp.input_tokens, 12);
    assert_eq!(resp.output_tokens, 3);
}

#[tokio::test]
async fn openai_treats_null_content_as_empty() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "tool_calls" }]
        })))
        .mount(&server)
        .await;

    let req = ChatRequest::new("gpt-test", vec![Message::user("hi")]);
    let resp = adapter(&server).chat(&req).await.unwrap();
    assert_eq!(resp.content, "");
    assert_eq!(resp.finish_reason, FinishReason::ToolCalls);
    assert_eq!(resp.input_tokens, 0);
}

#[tokio::test]
async fn openai_sends_normalized_options_in_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "messages": [
                { "role": "system", "content": "be brief" },
                { "role": "user", "content": "hi" }
            ],
            "stop": ["END"],
            "max_tokens": 32,
            "temperature": 0.0
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let options = GenerationParams::new()
        .stop_sequences(["END"])
        .max_new_tokens(32)
        .option("temperature", 0.0)
        .into_options()
        .unwrap();
    let req = ChatRequest::new(
        "gpt-test",
        vec![Message::system("be brief"), Message::user("hi")],
    )
    .with_options(options);

    let resp = adapter(&server).chat(&req).await.unwrap();
    assert_eq!(resp.content, "ok");
}

#[tokio::test]
async fn openai_classifies_rate_limit_with_context() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-request-id", "req_123")
                .set_body_json(json!({
                    "error": { "message": "Rate limit reached", "code": "rate_limit_exceeded" }
                })),
        )
        .mount(&server)
        .await;

    let req = ChatRequest::new("gpt-test", vec![Message::user("hi")]);
    let err = adapter(&server).chat(&req).await.unwrap_err();

    match &err {
        ProviderError::RateLimited { message, context } => {
            assert_eq!(message, "Rate limit reached");
            assert_eq!(context.http_status, Some(429));
            assert_eq!(context.provider_code.as_deref(), Some("rate_limit_exceeded"));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
    assert_eq!(err.request_id(), Some("req_123"));
    assert!(err.is_api_error());
}

#[tokio::test]
async fn openai_server_error_is_retryable_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let req = ChatRequest::new("gpt-test", vec![Message::user("hi")]);
    let err = adapter(&server).chat(&req).await.unwrap_err();

    assert!(matches!(err, ProviderError::Status { status: 503, .. }));
    assert!(err.is_api_error());
}

#[tokio::test]
async fn openai_rejects_response_without_choices() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let req = ChatRequest::new("gpt-test", vec![Message::user("hi")]);
    let err = adapter(&server).chat(&req).await.unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse { .. }));
}

struct FailThenSucceed {
    calls: Arc<AtomicUsize>,
}

impl Respond for FailThenSucceed {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            ResponseTemplate::new(500).set_body_json(json!({
                "error": { "message": "internal error" }
            }))
        } else {
            ResponseTemplate::new(200).set_body_json(completion("recovered"))
        }
    }
}

#[tokio::test]
async fn dispatcher_retries_server_errors_over_http() {
    let server = MockServer::start().await;
    let calls = Arc::new(AtomicUsize::new(0));

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(FailThenSucceed {
            calls: calls.clone(),
        })
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::new());
    let config = DispatchConfig {
        max_num_trials: 3,
        first_wait_time: Duration::from_millis(10),
    };
    let dispatcher = BatchDispatcher::with_config(Arc::new(adapter(&server)), config, sink.clone());

    let outputs = dispatcher
        .batch_chat(
            "gpt-test",
            vec![vec![Message::user("hi")]],
            GenerationParams::default(),
        )
        .await
        .unwrap();

    assert_eq!(outputs, vec!["recovered"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.retry_waits(), vec![Duration::from_millis(10)]);
}

#[tokio::test]
async fn openai_forwards_large_inputs_to_the_server() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("long read")))
        .expect(1)
        .mount(&server)
        .await;

    let big = "é".repeat(300_000);
    let req = ChatRequest::new("gpt-test", vec![Message::user(big)]);
    let resp = adapter(&server).chat(&req).await.unwrap();
    assert_eq!(resp.content, "long read");
}

struct EchoLastMessage;

impl Respond for EchoLastMessage {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let content = body["messages"][0]["content"].as_str().unwrap().to_string();
        ResponseTemplate::new(200).set_body_json(completion(&format!("re: {content}")))
    }
}

#[tokio::test]
async fn complete_text_sends_each_text_as_one_user_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(EchoLastMessage)
        .expect(3)
        .mount(&server)
        .await;

    let dispatcher = BatchDispatcher::with_config(
        Arc::new(adapter(&server)),
        DispatchConfig::default(),
        Arc::new(RecordingSink::new()),
    );
    let model = OpenAiChatModel::new("gpt-test", dispatcher);

    let texts = vec![
        "Once upon a time".to_string(),
        "The quick brown fox".to_string(),
        "1, 2, 3,".to_string(),
    ];
    let params = GenerationParams::new()
        .stop_sequences(["\n"])
        .max_new_tokens(5);
    let outputs = model.batch_complete_text(&texts, params).await.unwrap();

    assert_eq!(
        outputs,
        vec![
            "re: Once upon a time",
            "re: The quick brown fox",
            "re: 1, 2, 3,"
        ]
    );

    for request in server.received_requests().await.unwrap() {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["stop"], json!(["\n"]));
        assert_eq!(body["max_tokens"], 5);
        assert!(body.get("stop_sequences").is_none());
        assert!(body.get("max_new_tokens").is_none());
    }
}
