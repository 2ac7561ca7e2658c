//! Shared output layer for pretty/text/JSON parity across all commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / `--json` flag
//! 2. `TALLY_FORMAT` env var: `"pretty"` | `"text"` | `"json"`
//! 3. `output` in config.toml
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.
//!
//! Command results go to stdout. Errors and sync status lines go to stderr
//! so `--json` output stays parseable.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};
use tally_core::error::{CacheError, ErrorCode, RemoteError, ValidationError};
use tally_core::sync::{SyncOutcome, SyncStatus};

pub const FORMAT_ENV: &str = "TALLY_FORMAT";

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// Two-decimal money formatting.
pub fn money(value: f64) -> String {
    format!("{value:.2}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned columns).
    Pretty,
    /// Plain tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    pub const fn is_pretty(self) -> bool {
        matches!(self, Self::Pretty)
    }

    fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    config_format: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }
    if json_flag {
        return OutputMode::Json;
    }
    // Unknown values fall through.
    if let Some(mode) = format_env.and_then(OutputMode::parse_loose) {
        return mode;
    }
    if let Some(mode) = config_format.and_then(OutputMode::parse_loose) {
        return mode;
    }
    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, config and TTY.
pub fn resolve_output_mode(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    config_format: Option<&str>,
) -> OutputMode {
    let env_val = std::env::var(FORMAT_ENV).ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(
        format_flag,
        json_flag,
        env_val.as_deref(),
        config_format,
        is_tty,
    )
}

/// Render a serializable value to stdout.
///
/// JSON mode serializes `value`; the other modes call `human_fn`, which can
/// branch on the mode it is given.
pub fn render<T: Serialize + ?Sized>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

/// A failure carrying a stable error code, raised by command handlers for
/// conditions the core library does not model (no session, bad flags).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodedError {
    pub code: ErrorCode,
    pub message: String,
}

impl CodedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A structured error as rendered to the user.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code.
    pub error_code: String,
}

impl CliError {
    pub fn coded(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: code.hint().map(str::to_string),
            error_code: code.code().to_string(),
        }
    }

    /// Classify an error bubbling out of a command handler.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let code = if let Some(e) = err.downcast_ref::<CodedError>() {
            e.code
        } else if let Some(e) = err.downcast_ref::<ValidationError>() {
            e.code()
        } else if let Some(e) = err.downcast_ref::<RemoteError>() {
            e.code()
        } else if let Some(e) = err.downcast_ref::<CacheError>() {
            e.code()
        } else if err.chain().any(|cause| cause.is::<toml::de::Error>()) {
            ErrorCode::ConfigParseError
        } else {
            ErrorCode::InternalUnexpected
        };
        Self::coded(code, message)
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error[{}]: {}", error.error_code, error.message)?;
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

/// One-line summary of a sync attempt.
pub fn outcome_line(outcome: &SyncOutcome, status: &SyncStatus) -> String {
    match outcome {
        SyncOutcome::Synced(report) => format!(
            "synced: pulled {} customers / {} items, pushed {} customers / {} items",
            report.pulled.customers, report.pulled.items, report.pushed.customers, report.pushed.items
        ),
        SyncOutcome::LocalOnly => "local only: cloud sync is not configured".to_string(),
        SyncOutcome::Coalesced => "sync already in progress".to_string(),
        SyncOutcome::Suspended => {
            "sync suspended after an authentication failure; run `tally sync` to retry".to_string()
        }
        SyncOutcome::SignedOut => {
            "this device was signed out from another device; run `tally login` to sign in again"
                .to_string()
        }
        SyncOutcome::Failed(kind) => format!(
            "sync failed ({kind}): {}; changes are saved locally",
            status.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Report a sync attempt on stderr. Used after mutating commands, where a
/// failed sync is not a command failure.
pub fn report_sync(mode: OutputMode, outcome: &SyncOutcome, status: &SyncStatus) {
    if mode.is_json() {
        let line = serde_json::json!({ "sync": status.label(), "detail": outcome_line(outcome, status) });
        eprintln!("{line}");
    } else {
        eprintln!("[{}] {}", status.label(), outcome_line(outcome, status));
    }
}
