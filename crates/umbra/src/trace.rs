//! Event trace files for `umbra replay`.
//!
//! One event per line, `#` starts a comment line:
//!
//! ```text
//! create 10 x64
//! load 10 C:\Windows\System32\ntdll.dll
//! bp 10
//! message
//! exit 10
//! ```

use std::fs;
use std::path::Path;

use thiserror::Error;
use umbra_core::events::{DebugEvent, EventKind};
use umbra_core::types::{PointerWidth, ProcessId};

/// Errors raised while reading a trace.
#[derive(Error, Debug)]
pub enum TraceError
{
    /// A line could not be parsed
    #[error("line {line}: {message}")]
    Parse
    {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },

    /// The trace file could not be read
    #[error("cannot read trace: {0}")]
    Io(#[from] std::io::Error),
}

/// Read and parse the trace at `path`.
pub fn load(path: &Path) -> Result<Vec<DebugEvent>, TraceError>
{
    parse(&fs::read_to_string(path)?)
}

/// Parse trace text into events, in file order.
pub fn parse(text: &str) -> Result<Vec<DebugEvent>, TraceError>
{
    let mut events = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = parse_line(line).map_err(|message| TraceError::Parse { line: index + 1, message })?;
        events.push(event);
    }
    Ok(events)
}

fn parse_line(line: &str) -> Result<DebugEvent, String>
{
    let mut parts = line.splitn(3, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let kind = EventKind::from_name(name).ok_or_else(|| format!("unknown event `{name}`"))?;
    let pid = parts.next().map(parse_pid).transpose()?;
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    let Some(pid) = pid else {
        return match kind {
            EventKind::Message => Ok(DebugEvent::host_message()),
            _ => Err(format!("`{name}` needs a process id")),
        };
    };

    let event = match kind {
        EventKind::ProcessCreated => DebugEvent::process_created(pid, rest.map(parse_width).transpose()?),
        EventKind::ModuleLoaded | EventKind::ModuleUnloaded => {
            let path = rest.ok_or_else(|| format!("`{name}` needs a module path"))?;
            if kind == EventKind::ModuleLoaded {
                DebugEvent::module_loaded(pid, path)
            } else {
                DebugEvent::module_unloaded(pid, path)
            }
        }
        _ if rest.is_some() => return Err(format!("unexpected text after `{name} {pid}`")),
        _ => DebugEvent::new(kind, pid),
    };
    Ok(event)
}

fn parse_pid(token: &str) -> Result<ProcessId, String>
{
    token
        .parse::<u32>()
        .map(ProcessId)
        .map_err(|_| format!("invalid process id `{token}`"))
}

fn parse_width(token: &str) -> Result<PointerWidth, String>
{
    match token.to_ascii_lowercase().as_str() {
        "x86" | "32" => Ok(PointerWidth::Bits32),
        "x64" | "64" => Ok(PointerWidth::Bits64),
        _ => Err(format!("invalid pointer width `{token}`")),
    }
}
