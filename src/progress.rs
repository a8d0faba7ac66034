//! Reindex progress reporting.
//!
//! Reports observable progress during `cardio reindex` so users see which
//! file is being processed, how many are left, and what happened to each.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::path::Path;

use cardio_rag_core::coordinator::{Drift, FileOutcome, FileReport, NoopObserver, ReindexObserver};

/// Human-friendly progress on stderr: "reindex  3 / 10  /docs/hf.pdf  indexed (412 chunks)".
pub struct StderrProgress;

fn write_stderr(line: &str) {
    let mut err = std::io::stderr().lock();
    let _ = err.write_all(line.as_bytes());
    let _ = err.flush();
}

fn outcome_detail(outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Indexed { chunk_count, .. } => {
            format!("indexed ({} chunks)", format_number(*chunk_count))
        }
        FileOutcome::Removed { deleted } => format!("removed ({} entities)", deleted),
        FileOutcome::Skipped(e) | FileOutcome::Failed(e) => format!("{}: {}", outcome.label(), e),
        FileOutcome::UpToDate => "up to date".to_string(),
    }
}

impl ReindexObserver for StderrProgress {
    fn batch_started(&self, total: usize, drift: Option<&Drift>) {
        if let Some(d) = drift {
            write_stderr(&format!(
                "reindex  drift: collection holds {} entities, metadata records {} chunks in {} files; rebuilding\n",
                format_number(d.live_entities),
                format_number(d.recorded_chunks),
                d.recorded_files
            ));
        }
        write_stderr(&format!("reindex  {} files\n", format_number(total as u64)));
    }

    fn file_started(&self, index: usize, total: usize, path: &Path) {
        write_stderr(&format!(
            "reindex  {} / {}  {}  ...\n",
            format_number(index as u64 + 1),
            format_number(total as u64),
            path.display()
        ));
    }

    fn file_finished(&self, index: usize, total: usize, report: &FileReport) {
        write_stderr(&format!(
            "reindex  {} / {}  {}  {}\n",
            format_number(index as u64 + 1),
            format_number(total as u64),
            report.path.display(),
            outcome_detail(&report.outcome)
        ));
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn emit(obj: serde_json::Value) {
        if let Ok(line) = serde_json::to_string(&obj) {
            write_stderr(&format!("{}\n", line));
        }
    }
}

impl ReindexObserver for JsonProgress {
    fn batch_started(&self, total: usize, drift: Option<&Drift>) {
        Self::emit(serde_json::json!({
            "event": "batch_started",
            "total": total,
            "drift": drift,
        }));
    }

    fn file_finished(&self, index: usize, total: usize, report: &FileReport) {
        let chunk_count = match &report.outcome {
            FileOutcome::Indexed { chunk_count, .. } => Some(*chunk_count),
            _ => None,
        };
        Self::emit(serde_json::json!({
            "event": "progress",
            "n": index + 1,
            "total": total,
            "path": report.path,
            "outcome": report.outcome.label(),
            "chunk_count": chunk_count,
            "error": report.outcome.error().map(|e| e.to_string()),
        }));
    }
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "off" | "none" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode '{}'. Use human, json, or off.", other),
        }
    }

    pub fn observer(&self) -> Box<dyn ReindexObserver> {
        match self {
            ProgressMode::Off => Box::new(NoopObserver),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
