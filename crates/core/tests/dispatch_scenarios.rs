use std::sync::Arc;
use std::time::Duration;

use folio_chat_core::{
    Dispatcher, OFFLINE_TEXT, ReplyOutcome, RetrySchedule, SessionManager,
    TRANSMISSION_FAILURE_TEXT,
};
use folio_chat_model::{ErrorKind, ModelMessage};
use folio_chat_test_model::{PresetResponse, TestModelProvider};
use tokio::time::Instant;

const SYSTEM_PROMPT: &str = "You are CORE, a studio assistant.";

fn dispatcher_with(provider: &TestModelProvider) -> Dispatcher {
    let provider = provider.clone();
    let sessions =
        SessionManager::new(SYSTEM_PROMPT, move || Ok(provider.clone()));
    Dispatcher::new(Arc::new(sessions))
}

#[tokio::test(start_paused = true)]
async fn test_first_attempt_succeeds() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::with_text("We design and build."));
    let dispatcher = dispatcher_with(&provider);

    let started = Instant::now();
    let reply = dispatcher.send("What do you do?").await.unwrap();
    assert_eq!(reply.text, "We design and build.");
    assert!(!reply.is_fallback);
    assert_eq!(reply.outcome, ReplyOutcome::Delivered);
    assert_eq!(reply.attempts, 1);
    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recovers_after_one_failure() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(
        PresetResponse::with_text("Back online.")
            .with_failures(1)
            .with_failure_kind(ErrorKind::RateLimitExceeded),
    );
    let dispatcher = dispatcher_with(&provider);

    let started = Instant::now();
    let reply = dispatcher.send("Are you there?").await.unwrap();
    let elapsed = started.elapsed();
    assert_eq!(reply.text, "Back online.");
    assert!(!reply.is_fallback);
    assert_eq!(reply.attempts, 2);
    assert!(elapsed >= Duration::from_millis(800), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "{elapsed:?}");
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_the_schedule() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::with_text("never").with_failures(0));
    let dispatcher = dispatcher_with(&provider);

    let started = Instant::now();
    let reply = dispatcher.send("Hello?").await.unwrap();
    let elapsed = started.elapsed();
    assert_eq!(reply.text, OFFLINE_TEXT);
    assert!(reply.is_fallback);
    assert_eq!(reply.outcome, ReplyOutcome::Offline);
    assert_eq!(reply.attempts, 3);
    assert!(elapsed >= Duration::from_millis(2400), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(2500), "{elapsed:?}");
    assert_eq!(provider.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_empty_reply_is_not_retried() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::empty());
    let dispatcher = dispatcher_with(&provider);

    let reply = dispatcher.send("Say nothing").await.unwrap();
    assert_eq!(reply.text, TRANSMISSION_FAILURE_TEXT);
    assert!(!reply.is_fallback);
    assert_eq!(reply.outcome, ReplyOutcome::EmptyReply);
    assert_eq!(reply.attempts, 1);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_is_not_retried() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(
        PresetResponse::with_text("never")
            .with_failures(0)
            .with_failure_kind(ErrorKind::Unauthenticated),
    );
    let dispatcher = dispatcher_with(&provider);

    let started = Instant::now();
    let reply = dispatcher.send("Hello?").await.unwrap();
    assert_eq!(reply.text, OFFLINE_TEXT);
    assert!(reply.is_fallback);
    assert_eq!(reply.outcome, ReplyOutcome::Unavailable);
    assert_eq!(reply.attempts, 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_custom_schedule() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::with_text("never").with_failures(0));
    let dispatcher = dispatcher_with(&provider).with_retry_schedule(
        RetrySchedule::new([Duration::from_millis(100); 4]),
    );
    assert_eq!(dispatcher.retry_schedule().max_attempts(), 5);

    let started = Instant::now();
    let reply = dispatcher.send("Hello?").await.unwrap();
    assert_eq!(reply.attempts, 5);
    assert_eq!(reply.outcome, ReplyOutcome::Offline);
    assert!(started.elapsed() >= Duration::from_millis(400));

    let dispatcher = dispatcher.with_retry_schedule(RetrySchedule::none());
    let started = Instant::now();
    let reply = dispatcher.send("Hello?").await.unwrap();
    assert_eq!(reply.attempts, 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_session_survives_a_failed_dispatch() {
    let mut provider = TestModelProvider::default();
    // Nothing is scripted past the first exchange, so every later request
    // fails.
    provider.add_exchange(PresetResponse::with_text("Welcome back."));
    let dispatcher = dispatcher_with(&provider).with_retry_schedule(
        RetrySchedule::new([Duration::from_millis(10)]),
    );

    let first = dispatcher.send("Hi").await.unwrap();
    assert_eq!(first.text, "Welcome back.");

    let second = dispatcher.send("Still there?").await.unwrap();
    assert!(second.is_fallback);
    assert_eq!(second.attempts, 2);

    let session =
        dispatcher.sessions().get_or_create_session().await.unwrap();
    let conversation = session.conversation();
    assert_eq!(conversation.exchanges().len(), 1);
    assert_eq!(conversation.exchanges()[0].user(), "Hi");
    assert_eq!(conversation.exchanges()[0].model(), "Welcome back.");
}

#[tokio::test]
async fn test_system_prompt_and_history_are_sent() {
    let mut provider = TestModelProvider::default();
    provider.add_exchange(PresetResponse::with_text("Hello."));
    provider.add_exchange(PresetResponse::with_text("Rust, mostly."));
    let dispatcher = dispatcher_with(&provider);

    dispatcher.send("Hi").await.unwrap();
    let reply = dispatcher.send("Which stack?").await.unwrap();
    assert_eq!(reply.text, "Rust, mostly.");

    let requests = provider.requests();
    assert!(
        requests
            .iter()
            .all(|req| req.system.as_deref() == Some(SYSTEM_PROMPT))
    );
    assert_eq!(
        requests[1].messages,
        vec![
            ModelMessage::User("Hi".to_owned()),
            ModelMessage::Model("Hello.".to_owned()),
            ModelMessage::User("Which stack?".to_owned()),
        ]
    );
}
