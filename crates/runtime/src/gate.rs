//! Approval gate: the tool-part state machine.
//!
//! `input-available` proceeds straight to execution unless the tool is gated,
//! in which case it parks at `awaiting-approval` until the client attaches a
//! decision. A declined part is terminal and never reaches `execute()`.

use concierge_core::{Decision, ToolPart, ToolState, DECLINED_OUTPUT};
use serde_json::Value;

/// What reconciliation should do with one tool part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Leave the part exactly as submitted.
    Untouched,
    /// Park the part until the client decides.
    AwaitApproval,
    /// Record the decline sentinel without executing.
    Decline,
    /// Run the tool and settle the part with its outcome.
    Execute,
}

/// Decide what to do with `part`. `recorded` says whether the ledger already
/// holds an execution for this call.
pub fn evaluate(part: &ToolPart, requires_approval: bool, recorded: bool) -> GateAction {
    match (part.state, part.decision) {
        (ToolState::AwaitingApproval, Some(Decision::Declined)) => GateAction::Decline,
        (ToolState::AwaitingApproval, Some(Decision::Approved)) => GateAction::Execute,
        (ToolState::AwaitingApproval, None) => GateAction::Untouched,
        // An `approved` state is not a decision. It only replays an execution
        // this owner already started; otherwise the call goes back for approval.
        (ToolState::Approved, _) if recorded || !requires_approval => GateAction::Execute,
        (ToolState::Approved, _) => GateAction::AwaitApproval,
        (ToolState::InputAvailable, _) if requires_approval => GateAction::AwaitApproval,
        (ToolState::InputAvailable, _) => GateAction::Execute,
        _ => GateAction::Untouched,
    }
}

/// Park `part` for a fresh decision. Any decision it carried is dropped.
pub fn await_approval(part: &mut ToolPart) {
    part.state = ToolState::AwaitingApproval;
    part.decision = None;
}

pub fn approve(part: &mut ToolPart) {
    part.state = ToolState::Approved;
}

pub fn decline(part: &mut ToolPart) {
    part.state = ToolState::Declined;
    part.output = Some(Value::String(DECLINED_OUTPUT.to_string()));
    part.error_text = None;
}

pub fn complete(part: &mut ToolPart, output: Value) {
    part.state = ToolState::OutputAvailable;
    part.output = Some(output);
    part.error_text = None;
}

pub fn fail(part: &mut ToolPart, error_text: impl Into<String>) {
    part.state = ToolState::Errored;
    part.output = None;
    part.error_text = Some(error_text.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn part(state: ToolState) -> ToolPart {
        ToolPart::new("call_1", "clear_cart", json!({}), state)
    }

    #[test]
    fn test_decisions_drive_awaiting_parts() {
        let waiting = part(ToolState::AwaitingApproval);
        assert_eq!(evaluate(&waiting, true, false), GateAction::Untouched);
        assert_eq!(
            evaluate(&waiting.clone().with_decision(Decision::Approved), true, false),
            GateAction::Execute
        );
        assert_eq!(
            evaluate(&waiting.with_decision(Decision::Declined), true, false),
            GateAction::Decline
        );
    }

    #[test]
    fn test_input_available_respects_gating() {
        let ready = part(ToolState::InputAvailable);
        assert_eq!(evaluate(&ready, true, false), GateAction::AwaitApproval);
        assert_eq!(evaluate(&ready, false, false), GateAction::Execute);
    }

    #[test]
    fn test_approved_state_alone_never_clears_gate() {
        let claimed = part(ToolState::Approved);
        assert_eq!(evaluate(&claimed, true, false), GateAction::AwaitApproval);
        assert_eq!(
            evaluate(&claimed.clone().with_decision(Decision::Approved), true, false),
            GateAction::AwaitApproval
        );
        assert_eq!(evaluate(&claimed, true, true), GateAction::Execute);
        assert_eq!(evaluate(&claimed, false, false), GateAction::Execute);
    }

    #[test]
    fn test_terminal_and_streaming_parts_untouched() {
        for state in [
            ToolState::InputStreaming,
            ToolState::OutputAvailable,
            ToolState::Errored,
            ToolState::Declined,
        ] {
            let settled = part(state).with_decision(Decision::Approved);
            assert_eq!(evaluate(&settled, false, true), GateAction::Untouched);
        }
    }

    #[test]
    fn test_decline_sets_sentinel() {
        let mut p = part(ToolState::AwaitingApproval).with_decision(Decision::Declined);
        decline(&mut p);
        assert_eq!(p.state, ToolState::Declined);
        assert_eq!(p.output, Some(json!(DECLINED_OUTPUT)));
        assert_eq!(evaluate(&p, true, false), GateAction::Untouched);
    }

    #[test]
    fn test_fail_clears_output() {
        let mut p = part(ToolState::Approved);
        complete(&mut p, json!({"ok": true}));
        fail(&mut p, "boom");
        assert_eq!(p.state, ToolState::Errored);
        assert!(p.output.is_none());
        assert_eq!(p.error_text.as_deref(), Some("boom"));
    }
}
