mod support;

use std::sync::Arc;
use std::time::Duration;

use mxln_chat::{
    ConversationEvent, GenerationController, GenerationEnd, GenerationState, SendOutcome,
    SendRejection,
};
use pretty_assertions::assert_eq;
use session_api::HistoryRole;
use support::{
    delta_frame, done_frame, texts, wait_for_event, RecordingHistory, Reply, ScriptedTransport,
};
use tokio::sync::mpsc;
use tokio::time::timeout;

struct LiveGeneration {
    controller: GenerationController,
    history: Arc<RecordingHistory>,
    body: mpsc::UnboundedSender<Vec<u8>>,
    send: tokio::task::JoinHandle<SendOutcome>,
    events: tokio::sync::broadcast::Receiver<ConversationEvent>,
}

async fn start_live_generation(content: &'static str) -> LiveGeneration {
    let (body, receiver) = mpsc::unbounded_channel();
    let transport = Arc::new(ScriptedTransport::new(vec![Reply::Live(receiver)]));
    let history = Arc::new(RecordingHistory::default());
    let controller = GenerationController::builder(transport)
        .history(history.clone())
        .build();
    let mut events = controller.subscribe();

    let send = tokio::spawn({
        let controller = controller.clone();
        async move { controller.send(content, Some("m1")).await }
    });
    wait_for_event(&mut events, |event| {
        matches!(event, ConversationEvent::GenerationStarted { .. })
    })
    .await;

    LiveGeneration {
        controller,
        history,
        body,
        send,
        events,
    }
}

#[tokio::test]
async fn stop_returns_to_idle_immediately_and_keeps_partial_text() {
    let mut live = start_live_generation("Tell me a story").await;

    live.body.send(delta_frame("Once")).expect("body receiver alive");
    wait_for_event(&mut live.events, |event| {
        matches!(event, ConversationEvent::DeltaApplied { .. })
    })
    .await;

    assert!(live.controller.stop());
    assert_eq!(live.controller.state(), GenerationState::Idle);
    assert!(!live.controller.is_sending());

    // Arrives after cancellation and must never be applied.
    let _ = live.body.send(delta_frame(" upon a time"));

    let outcome = timeout(Duration::from_secs(1), live.send)
        .await
        .expect("send should finish promptly after stop")
        .expect("send task should not panic");

    assert_eq!(outcome, SendOutcome::Cancelled);
    assert_eq!(
        texts(&live.controller),
        vec!["Tell me a story".to_string(), "Once".to_string()]
    );
    assert_eq!(live.controller.error(), None);
    assert_eq!(
        live.history.saved(),
        vec![(HistoryRole::User, "Tell me a story".to_string())]
    );
}

#[tokio::test]
async fn stop_unblocks_a_silent_stream() {
    let live = start_live_generation("Hello").await;

    assert!(live.controller.stop());

    let outcome = timeout(Duration::from_secs(1), live.send)
        .await
        .expect("send should finish without further body data")
        .expect("send task should not panic");

    assert_eq!(outcome, SendOutcome::Cancelled);
    assert_eq!(
        texts(&live.controller),
        vec!["Hello".to_string(), String::new()]
    );
    drop(live.body);
}

#[tokio::test]
async fn cancelled_generation_reports_cancelled_end() {
    let mut live = start_live_generation("Hello").await;
    let generation = match live.controller.state() {
        GenerationState::Sending { generation, .. } => generation,
        GenerationState::Idle => panic!("generation should be active"),
    };

    live.controller.stop();

    let ended = wait_for_event(&mut live.events, |event| {
        matches!(event, ConversationEvent::GenerationEnded { .. })
    })
    .await;
    assert_eq!(
        ended,
        ConversationEvent::GenerationEnded {
            generation,
            end: GenerationEnd::Cancelled
        }
    );
    let _ = live.send.await;
}

#[tokio::test]
async fn send_while_generating_is_rejected_and_changes_nothing() {
    let live = start_live_generation("first").await;
    let before = live.controller.messages();

    let outcome = live.controller.send("second", None).await;

    assert_eq!(outcome, SendOutcome::Rejected(SendRejection::Busy));
    assert_eq!(live.controller.messages(), before);

    live.body.send(delta_frame("done")).expect("body receiver alive");
    live.body.send(done_frame()).expect("body receiver alive");
    let outcome = timeout(Duration::from_secs(1), live.send)
        .await
        .expect("send should finish")
        .expect("send task should not panic");
    assert!(matches!(outcome, SendOutcome::Completed { .. }));
    assert_eq!(
        texts(&live.controller),
        vec!["first".to_string(), "done".to_string()]
    );
}

#[tokio::test]
async fn stop_without_generation_is_a_no_op() {
    let transport = Arc::new(ScriptedTransport::new(Vec::new()));
    let controller = GenerationController::new(transport);

    assert!(!controller.stop());
    assert_eq!(controller.state(), GenerationState::Idle);
}

#[tokio::test]
async fn clearing_during_generation_stops_it() {
    let live = start_live_generation("Hello").await;

    live.controller.clear_messages();
    assert_eq!(live.controller.state(), GenerationState::Idle);

    let _ = live.body.send(delta_frame("late"));
    let outcome = timeout(Duration::from_secs(1), live.send)
        .await
        .expect("send should finish")
        .expect("send task should not panic");

    assert_eq!(outcome, SendOutcome::Cancelled);
    assert!(live.controller.messages().is_empty());
}
