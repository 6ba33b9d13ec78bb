use std::collections::BTreeMap;

use anyhow::Result;
use comfy_table::Cell;
use serde::Serialize;

use recall_core::{RecallCore, SessionSnapshot};

use crate::output::table::{new_table, print_table};
use crate::output::{OutputFormat, json::print_json};

#[derive(Debug, Serialize)]
struct BackendRow {
    kind: String,
    model: Option<String>,
    endpoint: Option<String>,
    has_api_key: bool,
    max_context_tokens: usize,
}

#[derive(Debug, Serialize)]
struct SessionRow {
    session_id: String,
    project: Option<String>,
    state: Option<String>,
    memory_session_id: Option<String>,
    prompt_number: Option<u32>,
    pending: usize,
    processing: usize,
    records: usize,
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    db_path: String,
    backends: Vec<BackendRow>,
    sessions: Vec<SessionRow>,
}

fn session_row(core: &RecallCore, session_id: &str, snapshot: Option<&SessionSnapshot>) -> Result<SessionRow> {
    let records = match snapshot.and_then(|s| s.memory_session_id.as_deref()) {
        Some(handle) => core.storage.records.count_by_session(handle)?,
        None => 0,
    };
    Ok(SessionRow {
        session_id: session_id.to_string(),
        project: snapshot.map(|s| s.project.clone()),
        state: snapshot.map(|s| s.state.as_str().to_string()),
        memory_session_id: snapshot.and_then(|s| s.memory_session_id.clone()),
        prompt_number: snapshot.map(|s| s.prompt_number),
        pending: core.storage.queue.pending_count(session_id)?,
        processing: core.storage.queue.processing_count(session_id)?,
        records,
        input_tokens: snapshot.map(|s| s.cumulative_input_tokens).unwrap_or(0),
        output_tokens: snapshot.map(|s| s.cumulative_output_tokens).unwrap_or(0),
    })
}

pub async fn run(core: &RecallCore, format: OutputFormat) -> Result<()> {
    let mut snapshots: BTreeMap<String, Option<SessionSnapshot>> = BTreeMap::new();
    for snapshot in core.storage.sessions.list_snapshots()? {
        snapshots.insert(snapshot.content_session_id.clone(), Some(snapshot));
    }
    for session_id in core.storage.queue.sessions_with_pending()? {
        snapshots.entry(session_id).or_insert(None);
    }

    let mut sessions = Vec::with_capacity(snapshots.len());
    for (session_id, snapshot) in &snapshots {
        sessions.push(session_row(core, session_id, snapshot.as_ref())?);
    }

    let backends = core
        .config
        .effective_backends()
        .iter()
        .map(|entry| {
            let config = entry.backend_config();
            BackendRow {
                kind: entry.kind.to_string(),
                model: config.model,
                endpoint: config.endpoint,
                has_api_key: config.api_key.is_some_and(|k| !k.trim().is_empty()),
                max_context_tokens: entry.truncation_policy().max_tokens,
            }
        })
        .collect();

    let report = StatusReport {
        db_path: core.config.db_path()?.display().to_string(),
        backends,
        sessions,
    };

    if format.is_json() {
        return print_json(&report);
    }

    println!("Database: {}", report.db_path);

    let mut table = new_table(&["Backend", "Model", "API key", "Context tokens"]);
    for backend in &report.backends {
        table.add_row(vec![
            Cell::new(&backend.kind),
            Cell::new(backend.model.as_deref().unwrap_or("-")),
            Cell::new(if backend.has_api_key { "set" } else { "missing" }),
            Cell::new(backend.max_context_tokens),
        ]);
    }
    print_table(table);

    if report.sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }

    let mut table = new_table(&[
        "Session", "Project", "State", "Prompt", "Pending", "Processing", "Records", "Tokens in/out",
    ]);
    for row in &report.sessions {
        table.add_row(vec![
            Cell::new(&row.session_id),
            Cell::new(row.project.as_deref().unwrap_or("-")),
            Cell::new(row.state.as_deref().unwrap_or("queued")),
            Cell::new(row.prompt_number.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(row.pending),
            Cell::new(row.processing),
            Cell::new(row.records),
            Cell::new(format!("{}/{}", row.input_tokens, row.output_tokens)),
        ]);
    }
    print_table(table);
    Ok(())
}
