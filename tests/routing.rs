//! End-to-end routing pipeline tests
//!
//! Run the full classify → resolve → invoke → normalize chain over fake
//! language model and handler backends.

use std::sync::Arc;
use std::time::Duration;

use voxroute::routing::{BLANK_QUERY_RESPONSE, ClassificationSource, HandlerDescriptor};
use voxroute::{Category, HandlerRegistry, StreamEvent};

mod common;
use common::{FakeHandlers, ScriptedLlm, router};

const KITCHEN: &str = "Turn on the kitchen light";
const KONNICHIWA: &str = "How do you say konnichiwa?";
const MACHINE_LEARNING: &str = "What is machine learning?";
const THERMOSTAT: &str = "Set the thermostat to 72 degrees";

fn classifier() -> ScriptedLlm {
    ScriptedLlm::default()
        .classify(KITCHEN, "HOME_ASSISTANT", 0.95)
        .classify(THERMOSTAT, "HOME_ASSISTANT", 0.9)
        .classify(KONNICHIWA, "JAPANESE", 0.9)
        .classify(MACHINE_LEARNING, "GENERAL", 0.85)
}

const ML_UNCONFIGURED: &str = "I'm a specialized routing system. I can help with Japanese language learning or smart home control, but I don't have a general questions handler configured for 'What is machine learning?'. Please ask about Japanese language learning or smart home control.";

#[tokio::test]
async fn test_smart_home_result_mapping() {
    let handlers = Arc::new(FakeHandlers::default().returning(
        "home_assistant_agent",
        "{'success': True, 'final_response': 'Kitchen light is now on'}",
    ));
    let router = router(classifier(), handlers.clone(), HandlerRegistry::builtin());

    let outcome = router.process(KITCHEN).await;

    assert_eq!(outcome.category, Category::HomeAssistant);
    assert_eq!(outcome.classification.source, ClassificationSource::Structured);
    assert_eq!(outcome.response, "🏠 Smart Home Assistant: Kitchen light is now on");
    assert_eq!(
        handlers.calls(),
        vec![("home_assistant_agent".to_string(), KITCHEN.to_string())]
    );
}

#[tokio::test]
async fn test_unconfigured_general_query() {
    let handlers = Arc::new(FakeHandlers::default());
    let router = router(classifier(), handlers.clone(), HandlerRegistry::builtin());

    let outcome = router.process(MACHINE_LEARNING).await;

    assert_eq!(outcome.category, Category::General);
    assert_eq!(outcome.response, ML_UNCONFIGURED);
    assert!(handlers.calls().is_empty());
}

#[tokio::test]
async fn test_general_assistant_when_configured() {
    let handlers = Arc::new(FakeHandlers::default());
    let registry = HandlerRegistry::builtin().with(
        Category::General,
        HandlerDescriptor::assistant("general_assistant", "You are helpful."),
    );
    let router = router(classifier(), handlers, registry);

    let outcome = router.process(MACHINE_LEARNING).await;
    assert_eq!(outcome.response, "assistant answer to What is machine learning?");
}

#[tokio::test]
async fn test_classification_failure_routes_to_general() {
    let handlers = Arc::new(FakeHandlers::default());
    let router = router(ScriptedLlm::default(), handlers, HandlerRegistry::builtin());

    let outcome = router.process(MACHINE_LEARNING).await;

    assert_eq!(outcome.category, Category::General);
    assert_eq!(outcome.classification.source, ClassificationSource::Fallback);
    assert!(outcome.classification.confidence.abs() < f64::EPSILON);
    assert_eq!(outcome.response, ML_UNCONFIGURED);
}

#[tokio::test]
async fn test_classification_timeout_routes_to_general() {
    let llm = classifier().with_delay(Duration::from_secs(2));
    let router = router(llm, Arc::new(FakeHandlers::default()), HandlerRegistry::builtin());

    let outcome = router.process(KITCHEN).await;

    assert_eq!(outcome.category, Category::General);
    assert_eq!(outcome.classification.source, ClassificationSource::Fallback);
}

#[tokio::test]
async fn test_free_text_routing_marker() {
    let llm = ScriptedLlm::default().on(KONNICHIWA, "🤖 Router: Routing to JAPANESE agent");
    let handlers = Arc::new(
        FakeHandlers::default().returning("streaming_japanese_agent", "It means hello."),
    );
    let router = router(llm, handlers, HandlerRegistry::builtin());

    let outcome = router.process(KONNICHIWA).await;

    assert_eq!(outcome.category, Category::Japanese);
    assert_eq!(outcome.classification.source, ClassificationSource::FreeText);
    assert_eq!(outcome.response, "It means hello.");
}

#[tokio::test]
async fn test_handler_timeout_is_reported() {
    let handlers = Arc::new(
        FakeHandlers::default()
            .returning("home_assistant_agent", "too late")
            .with_delay(Duration::from_millis(500)),
    );
    let registry = HandlerRegistry::builtin().with(
        Category::HomeAssistant,
        HandlerDescriptor::workflow("home_assistant_agent").with_timeout(Duration::from_millis(50)),
    );
    let router = router(classifier(), handlers, registry);

    let outcome = router.process(KITCHEN).await;

    assert_eq!(
        outcome.response,
        "🏠 Smart Home Assistant: Sorry, I encountered an error: timed out after 50ms"
    );
}

#[tokio::test]
async fn test_handler_error_for_plain_category() {
    let handlers =
        Arc::new(FakeHandlers::default().failing("streaming_japanese_agent", "workflow crashed"));
    let router = router(classifier(), handlers, HandlerRegistry::builtin());

    let outcome = router.process(KONNICHIWA).await;

    assert_eq!(
        outcome.response,
        "The JAPANESE handler encountered an error: handler error: workflow crashed"
    );
}

#[tokio::test]
async fn test_gateway_error_page() {
    let page = "<!DOCTYPE html><html><head><title>Error 502: Bad gateway</title></head><body>Error 502</body></html>";
    let handlers = Arc::new(FakeHandlers::default().returning("home_assistant_agent", page));
    let router = router(classifier(), handlers, HandlerRegistry::builtin());

    let outcome = router.process(THERMOSTAT).await;

    assert_eq!(
        outcome.response,
        "🏠 Smart Home Assistant: Sorry, your home automation system is currently unavailable. Please try again in a few minutes."
    );
}

#[tokio::test]
async fn test_upstream_api_error() {
    let handlers = Arc::new(FakeHandlers::default().returning(
        "home_assistant_agent",
        "response: Home Assistant API error: 403 Forbidden",
    ));
    let router = router(classifier(), handlers, HandlerRegistry::builtin());

    let outcome = router.process(KITCHEN).await;

    assert_eq!(
        outcome.response,
        "🏠 Smart Home Assistant: I don't have permission to access your home automation system. Please check the API credentials."
    );
}

#[tokio::test]
async fn test_blank_query_short_circuits() {
    let handlers = Arc::new(FakeHandlers::default());
    let router = router(classifier(), handlers.clone(), HandlerRegistry::builtin());

    let outcome = router.process("   \n").await;

    assert_eq!(outcome.category, Category::General);
    assert_eq!(outcome.response, BLANK_QUERY_RESPONSE);
    assert!(handlers.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_queries_stay_independent() {
    let handlers = Arc::new(
        FakeHandlers::default()
            .returning("home_assistant_agent", "Thermostat set to 72")
            .returning("streaming_japanese_agent", "response: It means hello.")
            .with_delay(Duration::from_millis(20)),
    );
    let router = router(classifier(), handlers.clone(), HandlerRegistry::builtin());

    let queries = [THERMOSTAT, KONNICHIWA, MACHINE_LEARNING];
    let outcomes = futures::future::join_all(queries.iter().map(|q| router.process(q))).await;

    assert_eq!(outcomes[0].category, Category::HomeAssistant);
    assert_eq!(outcomes[0].response, "🏠 Smart Home Assistant: Thermostat set to 72");
    assert_eq!(outcomes[1].category, Category::Japanese);
    assert_eq!(outcomes[1].response, "It means hello.");
    assert_eq!(outcomes[2].category, Category::General);
    assert_eq!(outcomes[2].response, ML_UNCONFIGURED);
    assert_eq!(handlers.calls().len(), 2);
}

#[tokio::test]
async fn test_stream_delivers_assistant_chunks() {
    let handlers = Arc::new(FakeHandlers::default());
    let registry = HandlerRegistry::builtin().with(
        Category::General,
        HandlerDescriptor::assistant("general_assistant", "You are helpful."),
    );
    let router = router(classifier(), handlers, registry);

    let mut classified = None;
    let mut chunks = Vec::new();
    let outcome = router
        .process_stream(MACHINE_LEARNING, |event| match event {
            StreamEvent::Classified(c) => classified = Some(c.category),
            StreamEvent::Chunk(chunk) => chunks.push(chunk.to_string()),
        })
        .await;

    assert_eq!(classified, Some(Category::General));
    assert_eq!(chunks, vec!["assistant ", "answer to ", MACHINE_LEARNING]);
    assert!(outcome.streamed);
    assert_eq!(outcome.response, "assistant answer to What is machine learning?");
}

#[tokio::test]
async fn test_stream_falls_back_for_workflows() {
    let handlers = Arc::new(FakeHandlers::default().returning(
        "home_assistant_agent",
        "{'success': True, 'final_response': 'Kitchen light is now on'}",
    ));
    let router = router(classifier(), handlers, HandlerRegistry::builtin());

    let mut events = 0;
    let outcome = router
        .process_stream(KITCHEN, |event| {
            assert!(matches!(event, StreamEvent::Classified(_)));
            events += 1;
        })
        .await;

    assert_eq!(events, 1);
    assert!(!outcome.streamed);
    assert_eq!(outcome.response, "🏠 Smart Home Assistant: Kitchen light is now on");
}

#[tokio::test]
async fn test_stream_failure_is_not_streamed() {
    let handlers = Arc::new(FakeHandlers::default().failing("general_assistant", "model crashed"));
    let registry = HandlerRegistry::builtin().with(
        Category::General,
        HandlerDescriptor::assistant("general_assistant", "You are helpful."),
    );
    let router = router(classifier(), handlers, registry);

    let mut chunks = 0;
    let outcome = router
        .process_stream(MACHINE_LEARNING, |event| {
            if matches!(event, StreamEvent::Chunk(_)) {
                chunks += 1;
            }
        })
        .await;

    assert_eq!(chunks, 0);
    assert!(!outcome.streamed);
    assert_eq!(
        outcome.response,
        "The GENERAL handler encountered an error: handler error: model crashed"
    );
}

#[tokio::test]
async fn test_stream_blank_query_emits_nothing() {
    let router = router(classifier(), Arc::new(FakeHandlers::default()), HandlerRegistry::builtin());

    let mut events = 0;
    let outcome = router.process_stream("  ", |_| events += 1).await;

    assert_eq!(events, 0);
    assert!(!outcome.streamed);
    assert_eq!(outcome.response, BLANK_QUERY_RESPONSE);
}
