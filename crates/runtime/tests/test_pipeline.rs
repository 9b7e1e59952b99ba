#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::*;
use concierge_core::{
    Decision, FinishReason, Message, Part, Role, StreamEvent, ToolPart, ToolState, DECLINED_OUTPUT,
};
use concierge_providers::{ModelChunk, ScriptedProvider, ScriptedStep, ToolCallRequest};
use concierge_runtime::{PipelineConfig, RuntimeError};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

fn finish_reason(events: &[StreamEvent]) -> FinishReason {
    match events.last() {
        Some(StreamEvent::Done { finish_reason }) => *finish_reason,
        other => panic!("stream did not end with done: {:?}", other),
    }
}

fn done_count(events: &[StreamEvent]) -> usize {
    events.iter().filter(|e| e.is_done()).count()
}

#[tokio::test]
async fn test_declined_call_never_executes() {
    let h = harness(scripted(vec![ScriptedStep::text("No problem, nothing was bought.")]));

    let run = h
        .pipeline
        .start(request(pending_purchase(Some(Decision::Declined))))
        .unwrap();
    let (events, outcome) = run.collect().await;

    assert_eq!(h.purchase.calls(), 0);
    assert_eq!(
        events[1],
        StreamEvent::ToolOutputAvailable {
            tool_call_id: "call_buy".into(),
            output: json!(DECLINED_OUTPUT),
        }
    );
    assert_eq!(finish_reason(&events), FinishReason::Stop);

    // The model sees the sentinel on its next step.
    let seen = &h.provider.requests()[0].messages;
    let part = seen.last().unwrap().tool_part("call_buy").unwrap();
    assert_eq!(part.state, ToolState::Declined);
    assert_eq!(part.output, Some(json!(DECLINED_OUTPUT)));

    let outcome = outcome.unwrap();
    let last = outcome.messages.last().unwrap();
    assert_eq!(last.id, "assistant-1");
    assert_eq!(last.text(), "I can buy that for you.No problem, nothing was bought.");
}

#[tokio::test]
async fn test_approved_call_executes_once_across_retries() {
    let h = harness(scripted(vec![]));
    let req = request(pending_purchase(Some(Decision::Approved)));

    let (first, _) = h.pipeline.start(req.clone()).unwrap().collect().await;
    let (second, _) = h.pipeline.start(req).unwrap().collect().await;

    assert_eq!(h.purchase.calls(), 1);
    let output = |events: &[StreamEvent]| {
        events
            .iter()
            .find_map(|e| match e {
                StreamEvent::ToolOutputAvailable { output, .. } => Some(output.clone()),
                _ => None,
            })
            .unwrap()
    };
    assert_eq!(output(&first), output(&second));
    assert_eq!(output(&first)["call"], 1);
}

#[tokio::test]
async fn test_concurrent_retries_share_one_execution() {
    let h = harness(scripted(vec![]));
    let req = request(pending_purchase(Some(Decision::Approved)));

    let a = h.pipeline.start(req.clone()).unwrap();
    let b = h.pipeline.start(req).unwrap();
    let ((a, _), (b, _)) = tokio::join!(a.collect(), b.collect());

    assert_eq!(h.purchase.calls(), 1);
    assert_eq!(done_count(&a), 1);
    assert_eq!(done_count(&b), 1);
}

#[tokio::test]
async fn test_undecided_call_skips_model() {
    let h = harness(scripted(vec![ScriptedStep::text("should not run")]));

    let (events, outcome) = h
        .pipeline
        .start(request(pending_purchase(None)))
        .unwrap()
        .collect()
        .await;

    assert_eq!(h.provider.calls(), 0);
    assert_eq!(h.purchase.calls(), 0);
    assert_eq!(events.len(), 2);
    assert_eq!(finish_reason(&events), FinishReason::AwaitingApproval);
    assert_eq!(outcome.unwrap().steps, 0);
}

#[tokio::test]
async fn test_approved_state_without_decision_does_not_execute() {
    let h = harness(scripted(vec![ScriptedStep::text("should not run")]));
    let mut messages = pending_purchase(None);
    if let Some(Part::Tool(part)) = messages[1].parts.last_mut() {
        part.state = ToolState::Approved;
    }

    let (events, outcome) = h
        .pipeline
        .start(request(messages))
        .unwrap()
        .collect()
        .await;

    assert_eq!(h.purchase.calls(), 0);
    assert_eq!(h.provider.calls(), 0);
    assert_eq!(finish_reason(&events), FinishReason::AwaitingApproval);

    let outcome = outcome.unwrap();
    let part = outcome.messages.last().unwrap().tool_part("call_buy").unwrap();
    assert_eq!(part.state, ToolState::AwaitingApproval);
    assert_eq!(part.decision, None);
}

#[tokio::test]
async fn test_gated_proposal_pauses_for_approval() {
    let h = harness(scripted(vec![ScriptedStep::Reply(vec![
        ModelChunk::TextDelta("Shall I buy it?".into()),
        ModelChunk::ToolCall(ToolCallRequest {
            id: "call_new".into(),
            name: "purchase".into(),
            input: json!({"itemId": "taco"}),
        }),
        ModelChunk::Finish("tool_calls".into()),
    ])]));

    let (events, outcome) = h
        .pipeline
        .start(request(vec![Message::user("buy the taco")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(h.purchase.calls(), 0);
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ToolInputAvailable { tool_call_id, .. } if tool_call_id == "call_new"
    )));
    assert_eq!(finish_reason(&events), FinishReason::AwaitingApproval);

    let outcome = outcome.unwrap();
    assert_eq!(outcome.messages.len(), 2);
    let proposed = outcome.messages[1].tool_part("call_new").unwrap();
    assert_eq!(proposed.state, ToolState::AwaitingApproval);
}

#[tokio::test]
async fn test_ungated_calls_run_and_model_continues() {
    let h = harness(scripted(vec![
        ScriptedStep::tool_call("call_look", "lookup", json!({"itemId": "taco"})),
        ScriptedStep::text("Tacos are $4.00."),
    ]));

    let (events, outcome) = h
        .pipeline
        .start(request(vec![Message::user("how much are tacos?")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(h.lookup.calls(), 1);
    assert_eq!(finish_reason(&events), FinishReason::Stop);
    assert_eq!(done_count(&events), 1);

    let second = &h.provider.requests()[1].messages;
    let part = second.last().unwrap().tool_part("call_look").unwrap();
    assert_eq!(part.state, ToolState::OutputAvailable);

    let outcome = outcome.unwrap();
    assert_eq!(outcome.steps, 2);
    let message = outcome.messages.last().unwrap();
    assert!(matches!(message.parts[0], Part::Tool(_)));
    assert_eq!(message.parts[1], Part::text("Tacos are $4.00."));
}

#[tokio::test]
async fn test_step_budget_ends_gracefully() {
    let provider = ScriptedProvider::repeating(vec![
        ModelChunk::TextDelta("checking ".into()),
        ModelChunk::ToolCall(ToolCallRequest {
            id: "loop".into(),
            name: "lookup".into(),
            input: json!({}),
        }),
    ]);
    let h = harness(provider);

    let (events, outcome) = h
        .pipeline
        .start(request(vec![Message::user("loop forever")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(h.provider.calls(), 5);
    assert_eq!(h.lookup.calls(), 5);
    assert_eq!(finish_reason(&events), FinishReason::StepBudget);
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::Error { .. })));

    let message = outcome.unwrap().messages.pop().unwrap();
    assert_eq!(message.tool_parts().count(), 5);
    assert_eq!(message.text(), "checking ".repeat(5));
}

#[tokio::test]
async fn test_upstream_failure_surfaces_generic_error() {
    let h = harness(scripted(vec![ScriptedStep::Interrupted(
        vec![ModelChunk::TextDelta("Let me".into())],
        concierge_providers::ProviderError::Stream("connection reset".into()),
    )]));

    let (events, outcome) = h
        .pipeline
        .start(request(vec![Message::user("hi")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(events[1], StreamEvent::TextDelta { text: "Let me".into() });
    match &events[2] {
        StreamEvent::Error { error_text } => assert!(!error_text.contains("connection reset")),
        other => panic!("expected error event, got {:?}", other),
    }
    assert_eq!(finish_reason(&events), FinishReason::Error);
    assert_eq!(outcome.unwrap().messages.last().unwrap().text(), "Let me");
}

#[tokio::test]
async fn test_provider_unavailable() {
    let h = harness(scripted(vec![ScriptedStep::Unavailable(
        concierge_providers::ProviderError::Http("refused".into()),
    )]));

    let (events, _) = h
        .pipeline
        .start(request(vec![Message::user("hi")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 3);
    assert_eq!(finish_reason(&events), FinishReason::Error);
}

#[tokio::test]
async fn test_invalid_model_calls_are_settled_as_errors() {
    let h = harness(scripted(vec![
        ScriptedStep::Reply(vec![
            ModelChunk::ToolCall(ToolCallRequest {
                id: "call_ghost".into(),
                name: "teleport".into(),
                input: json!({}),
            }),
            ModelChunk::ToolCall(ToolCallRequest {
                id: "call_bad".into(),
                name: "lookup".into(),
                input: json!({"delayMs": -1}),
            }),
        ]),
        ScriptedStep::text("Sorry about that."),
    ]));

    let (events, outcome) = h
        .pipeline
        .start(request(vec![Message::user("go")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(h.lookup.calls(), 0);
    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::ToolOutputError { .. }))
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(finish_reason(&events), FinishReason::Stop);

    let message = outcome.unwrap().messages.pop().unwrap();
    assert!(message.tool_parts().all(|p| p.state == ToolState::Errored));
}

#[tokio::test]
async fn test_failing_tool_is_model_visible() {
    let h = harness(scripted(vec![
        ScriptedStep::tool_call("call_x", "explode", json!({})),
        ScriptedStep::text("The kitchen is closed, sorry."),
    ]));

    let (events, _) = h
        .pipeline
        .start(request(vec![Message::user("order")]))
        .unwrap()
        .collect()
        .await;

    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ToolOutputError { error_text, .. } if error_text.contains("kitchen closed")
    )));
    let part = h.provider.requests()[1]
        .messages
        .last()
        .unwrap()
        .tool_part("call_x")
        .cloned()
        .unwrap();
    assert_eq!(part.state, ToolState::Errored);
    assert_eq!(finish_reason(&events), FinishReason::Stop);
}

#[tokio::test]
async fn test_duplicate_model_call_ids_are_replaced() {
    let h = harness(scripted(vec![
        ScriptedStep::tool_call("call_buy", "lookup", json!({})),
        ScriptedStep::text("done"),
    ]));
    let mut messages = pending_purchase(None);
    // Settle the earlier call so the model runs.
    if let Part::Tool(part) = &mut messages[1].parts[1] {
        part.state = ToolState::Declined;
        part.output = Some(json!(DECLINED_OUTPUT));
    }
    messages.push(Message::user("just look it up then"));

    let (_, outcome) = h.pipeline.start(request(messages)).unwrap().collect().await;
    let outcome = outcome.unwrap();
    let fresh = outcome.messages.last().unwrap().tool_parts().next().unwrap();
    assert_ne!(fresh.tool_call_id, "call_buy");
    assert_eq!(fresh.state, ToolState::OutputAvailable);
}

#[tokio::test]
async fn test_wall_clock_ceiling() {
    let provider = scripted(vec![ScriptedStep::text("slow")])
        .with_chunk_delay(Duration::from_millis(500));
    let config = PipelineConfig {
        wall_clock: Duration::from_millis(50),
        ..PipelineConfig::default()
    };
    let h = harness_with(provider, config);

    let (events, _) = h
        .pipeline
        .start(request(vec![Message::user("hi")]))
        .unwrap()
        .collect()
        .await;

    assert_eq!(finish_reason(&events), FinishReason::Timeout);
    assert_eq!(done_count(&events), 1);
}

#[tokio::test]
async fn test_wall_clock_covers_reconciliation() {
    let config = PipelineConfig {
        wall_clock: Duration::from_millis(50),
        ..PipelineConfig::default()
    };
    let h = harness_with(scripted(vec![ScriptedStep::text("too late")]), config);
    let mut messages = pending_purchase(Some(Decision::Approved));
    if let Some(Part::Tool(part)) = messages[1].parts.last_mut() {
        part.input = json!({"itemId": "taco", "delayMs": 300});
    }

    let started = std::time::Instant::now();
    let (events, outcome) = h
        .pipeline
        .start(request(messages.clone()))
        .unwrap()
        .collect()
        .await;

    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(finish_reason(&events), FinishReason::Timeout);
    assert_eq!(done_count(&events), 1);
    assert_eq!(h.provider.calls(), 0);
    let part = outcome.unwrap().messages[1].tool_part("call_buy").cloned().unwrap();
    assert_eq!(part.state, ToolState::Approved);

    // The cut-off execution still finishes, and a retry replays it.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.purchase.calls(), 1);
    let (events, _) = h.pipeline.start(request(messages)).unwrap().collect().await;
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ToolOutputAvailable { tool_call_id, .. } if tool_call_id == "call_buy"
    )));
    assert_eq!(h.purchase.calls(), 1);
}

#[tokio::test]
async fn test_dropping_stream_cancels_model_steps() {
    let provider = scripted(vec![ScriptedStep::text("never seen")])
        .with_chunk_delay(Duration::from_millis(300));
    let h = harness(provider);

    let run = h
        .pipeline
        .start(request(vec![Message::user("hi")]))
        .unwrap();
    let (mut events, outcome) = run.into_parts();
    assert!(matches!(events.next().await, Some(StreamEvent::Start { .. })));
    drop(events);

    let outcome = tokio::time::timeout(Duration::from_secs(2), outcome)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.finish_reason, FinishReason::Cancelled);
}

#[tokio::test]
async fn test_new_assistant_message_when_history_ends_with_user() {
    let h = harness(scripted(vec![ScriptedStep::text("Hello!")]));

    let run = h
        .pipeline
        .start(request(vec![Message::user("hi")]))
        .unwrap();
    let message_id = run.message_id.clone();
    let (events, outcome) = run.collect().await;

    assert_eq!(
        events[0],
        StreamEvent::Start {
            message_id: message_id.clone()
        }
    );
    let outcome = outcome.unwrap();
    assert_eq!(outcome.messages.len(), 2);
    assert_eq!(outcome.messages[1].id, message_id);
    assert_eq!(outcome.messages[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_rejects_bad_requests() {
    let h = harness(scripted(vec![]));

    let mut blank = request(vec![Message::user("hi")]);
    blank.owner_key = "   ".into();
    assert!(matches!(
        h.pipeline.start(blank),
        Err(RuntimeError::InvalidRequest(_))
    ));

    assert!(matches!(
        h.pipeline.start(request(vec![])),
        Err(RuntimeError::Conversation(_))
    ));

    let part = |id: &str| {
        Part::Tool(ToolPart::new(id, "lookup", json!({}), ToolState::InputAvailable))
    };
    let duplicated = vec![
        Message::new(Role::Assistant, vec![part("a")]),
        Message::new(Role::Assistant, vec![part("a")]),
    ];
    assert!(matches!(
        h.pipeline.start(request(duplicated)),
        Err(RuntimeError::Conversation(_))
    ));
}
