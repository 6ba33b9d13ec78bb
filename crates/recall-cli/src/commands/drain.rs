use std::collections::BTreeSet;

use anyhow::{Result, bail};
use comfy_table::Cell;
use serde::Serialize;

use recall_core::{RecallCore, SessionState};

use crate::cli::DrainArgs;
use crate::output::table::{new_table, print_table};
use crate::output::{OutputFormat, json::print_json};

#[derive(Debug, Serialize)]
struct DrainRow {
    session_id: String,
    items: usize,
    turns: usize,
    skipped: usize,
    rejected: usize,
    records_created: usize,
    backend: Option<String>,
    duration_ms: u64,
    error: Option<String>,
}

impl DrainRow {
    fn failed(session_id: &str, error: String) -> Self {
        Self {
            session_id: session_id.to_string(),
            items: 0,
            turns: 0,
            skipped: 0,
            rejected: 0,
            records_created: 0,
            backend: None,
            duration_ms: 0,
            error: Some(error),
        }
    }
}

/// Sessions with queued work plus open sessions that may owe a turn prompt.
fn sessions_to_drain(core: &RecallCore) -> Result<BTreeSet<String>> {
    let mut sessions: BTreeSet<String> = core.storage.queue.sessions_with_pending()?.into_iter().collect();
    for snapshot in core.storage.sessions.list_snapshots()? {
        if snapshot.state != SessionState::Completed {
            sessions.insert(snapshot.content_session_id);
        }
    }
    Ok(sessions)
}

pub async fn run(core: &RecallCore, args: DrainArgs, format: OutputFormat) -> Result<()> {
    let sessions = match args.session {
        Some(session) => BTreeSet::from([session]),
        None => sessions_to_drain(core)?,
    };

    let mut rows = Vec::with_capacity(sessions.len());
    for session_id in &sessions {
        core.manager.ensure_running(session_id).await?;
        let row = match core.manager.wait_idle(session_id).await {
            Ok(report) => {
                let report = report.unwrap_or_default();
                DrainRow {
                    session_id: session_id.clone(),
                    items: report.items,
                    turns: report.turns,
                    skipped: report.skipped,
                    rejected: report.rejected,
                    records_created: report.records_created,
                    backend: report.backend,
                    duration_ms: report.duration_ms,
                    error: None,
                }
            }
            Err(err) => DrainRow::failed(session_id, err.to_string()),
        };
        rows.push(row);
    }

    let failed = rows.iter().filter(|r| r.error.is_some()).count();

    if format.is_json() {
        print_json(&rows)?;
    } else if rows.is_empty() {
        println!("Nothing to drain");
    } else {
        let mut table = new_table(&["Session", "Items", "Turns", "Records", "Backend", "Duration", "Error"]);
        for row in &rows {
            table.add_row(vec![
                Cell::new(&row.session_id),
                Cell::new(row.items),
                Cell::new(row.turns),
                Cell::new(row.records_created),
                Cell::new(row.backend.as_deref().unwrap_or("-")),
                Cell::new(format!("{} ms", row.duration_ms)),
                Cell::new(row.error.as_deref().unwrap_or("")),
            ]);
        }
        print_table(table);
    }

    if failed > 0 {
        bail!("{failed} session(s) failed to drain");
    }
    Ok(())
}
