//! CLI output - render session views to stdout.
//!
//! Two modes: an indented text tree (re-drawn in place on a terminal) and
//! one JSON object per view for scripting.

use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::projection::{EntryKind, TreeEntry};
use crate::session::SessionView;
use crate::store::StoreStats;

/// One JSON line per view
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewLine<'a> {
    updated_at: DateTime<Utc>,
    stats: &'a StoreStats,
    tree: &'a [TreeEntry],
}

/// Serialize a view as a single JSON line (without the trailing newline).
pub fn view_to_json_line(view: &SessionView) -> Result<String> {
    Ok(serde_json::to_string(&ViewLine {
        updated_at: view.updated_at,
        stats: &view.stats,
        tree: &view.tree,
    })?)
}

/// One-line summary of the store.
pub fn status_line(stats: &StoreStats, updated_at: DateTime<Utc>) -> String {
    format!(
        "{} groups | {}/{} nodes online | {}/{} devices online | {} metrics ({} stale) | {}",
        stats.groups,
        stats.nodes_online,
        stats.nodes,
        stats.devices_online,
        stats.devices,
        stats.metrics,
        stats.metrics_stale,
        updated_at.format("%H:%M:%S"),
    )
}

/// Render the tree as indented text, one entry per line.
///
/// ```text
///   G1
/// +   N1
/// +     7 temp = 21.5 (Double)
/// -     D1
/// ```
pub fn render_tree(tree: &[TreeEntry]) -> String {
    let mut out = String::new();
    for group in tree {
        render_entry(&mut out, group, 0);
    }
    out
}

fn render_entry(out: &mut String, entry: &TreeEntry, depth: usize) {
    let marker = match entry.online {
        Some(true) => '+',
        Some(false) => '-',
        None => ' ',
    };
    let indent = "  ".repeat(depth + 1);

    let _ = match (&entry.kind, &entry.metric) {
        (EntryKind::Metric, Some(metric)) => {
            let value = if metric.is_null {
                "null".to_string()
            } else {
                metric.value.to_string()
            };
            writeln!(
                out,
                "{}{}{} {} = {} ({:?})",
                marker, indent, entry.id, metric.name, value, metric.data_type
            )
        }
        _ => writeln!(
            out,
            "{}{}{}  [{}]",
            marker,
            indent,
            entry.id,
            entry.last_message_at.format("%Y-%m-%d %H:%M:%S")
        ),
    };

    for child in &entry.children {
        render_entry(out, child, depth + 1);
    }
}

/// Print one view to stdout.
pub fn print_view(view: &SessionView, json_mode: bool) -> Result<()> {
    let mut stdout = io::stdout().lock();
    if json_mode {
        writeln!(stdout, "{}", view_to_json_line(view)?)?;
    } else {
        if stdout.is_terminal() {
            // Clear screen and move the cursor home
            write!(stdout, "\x1b[2J\x1b[H")?;
        }
        write!(stdout, "{}", render_tree(&view.tree))?;
        writeln!(stdout, "{}", status_line(&view.stats, view.updated_at))?;
    }
    stdout.flush()?;
    Ok(())
}

/// Print every published view until the session goes away.
pub async fn run_view_loop(mut views: watch::Receiver<SessionView>, json_mode: bool) -> Result<()> {
    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        print_view(&view, json_mode)?;
    }
    Ok(())
}
