//! Capture commands: record host events and, unless queue-only, run the
//! session's pass to completion before exiting.
//!
//! Live capture goes through the [`EventBridge`], so a capture failure is
//! logged and reported in the output but never fails the command.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;

use recall_ai::{ObservationInput, SummaryInput};
use recall_core::runtime::{EventBridge, PassReport, ToolUseEvent};
use recall_core::{PendingMessage, RecallCore, WorkItem};

use crate::cli::{EndArgs, ObserveArgs, PromptArgs, SummarizeArgs};
use crate::output::{OutputFormat, json::print_json};

fn print_queued(
    session_id: &str,
    kind: &str,
    message: Option<&PendingMessage>,
    report: Option<&PassReport>,
    format: OutputFormat,
) -> Result<()> {
    if format.is_json() {
        return print_json(&json!({
            "message_id": message.map(|m| m.id.as_str()),
            "session_id": session_id,
            "type": kind,
            "pass": report,
        }));
    }

    match message {
        Some(message) => println!("Queued {kind} {} for session {session_id}", message.id),
        None => println!("Capture unavailable for session {session_id}; nothing queued"),
    }
    print_report(report);
    Ok(())
}

fn print_report(report: Option<&PassReport>) {
    if let Some(report) = report {
        println!(
            "Processed {} item(s) in {} turn(s) via {} ({} ms, {} new record(s))",
            report.items,
            report.turns,
            report.backend.as_deref().unwrap_or("-"),
            report.duration_ms,
            report.records_created
        );
    }
}

pub async fn observe(core: &RecallCore, args: ObserveArgs, format: OutputFormat) -> Result<()> {
    let input = ObservationInput {
        tool_name: args.tool,
        tool_input: args.input,
        tool_response: args.output,
        cwd: args.cwd,
        created_at_epoch: Utc::now().timestamp_millis(),
        prompt_number: args.prompt_number,
    };

    if args.queue_only {
        let message = core
            .storage
            .queue
            .enqueue(&args.session, WorkItem::Observation(input))?;
        return print_queued(&args.session, "observation", Some(&message), None, format);
    }

    let bridge = core.bridge();
    let event = ToolUseEvent {
        tool_name: input.tool_name,
        tool_input: input.tool_input,
        tool_response: input.tool_response,
        cwd: input.cwd,
        prompt_number: input.prompt_number,
    };
    let message = bridge.on_tool_use(&args.session, event).await;
    let report = settle(&bridge, &args.session, message.is_some()).await;
    print_queued(&args.session, "observation", message.as_ref(), report.as_ref(), format)
}

/// Wait for the pass a successful event started.
async fn settle(bridge: &EventBridge, session_id: &str, accepted: bool) -> Option<PassReport> {
    if accepted {
        bridge.settle(session_id).await
    } else {
        None
    }
}

pub async fn summarize(core: &RecallCore, args: SummarizeArgs, format: OutputFormat) -> Result<()> {
    let input = SummaryInput {
        last_assistant_message: args.last_message,
    };

    if args.queue_only {
        let message = core
            .storage
            .queue
            .enqueue(&args.session, WorkItem::Summarize(input))?;
        return print_queued(&args.session, "summarize", Some(&message), None, format);
    }

    let bridge = core.bridge();
    let message = bridge
        .on_stop(&args.session, input.last_assistant_message)
        .await;
    let report = settle(&bridge, &args.session, message.is_some()).await;
    print_queued(&args.session, "summarize", message.as_ref(), report.as_ref(), format)
}

pub async fn prompt(core: &RecallCore, args: PromptArgs, format: OutputFormat) -> Result<()> {
    let (recorded, report) = if args.queue_only {
        core.manager
            .record_turn(&args.session, &args.project, &args.text, args.prompt_number)
            .await?;
        (true, None)
    } else {
        let bridge = core.bridge();
        let recorded = bridge
            .on_user_prompt(&args.session, &args.project, &args.text, args.prompt_number)
            .await;
        (recorded, settle(&bridge, &args.session, recorded).await)
    };

    let snapshot = core.manager.snapshot(&args.session).await?;

    if format.is_json() {
        return print_json(&json!({
            "recorded": recorded,
            "session": snapshot,
            "pass": report,
        }));
    }

    if recorded {
        println!(
            "Recorded prompt #{} for session {}",
            args.prompt_number, args.session
        );
    } else {
        println!("Capture unavailable for session {}; prompt not recorded", args.session);
    }
    print_report(report.as_ref());
    Ok(())
}

pub async fn end(core: &RecallCore, args: EndArgs, format: OutputFormat) -> Result<()> {
    let completed = core.bridge().on_session_end(&args.session).await;

    if format.is_json() {
        return print_json(&json!({
            "session_id": args.session,
            "completed": completed,
        }));
    }

    if completed {
        println!("Completed session {}", args.session);
    } else {
        println!("No live session {}", args.session);
    }
    Ok(())
}
