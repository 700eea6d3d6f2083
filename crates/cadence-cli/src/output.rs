//! Shared output layer for human/JSON parity across all CLI commands.

use serde::Serialize;
use std::io::{self, Write};

/// The two output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-optimized text.
    Human,
    /// Machine-readable JSON, one object per result.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render a payload to stdout: stable JSON in JSON mode, the provided
/// closure in human mode.
pub fn render<T: Serialize>(
    mode: OutputMode,
    payload: &T,
    human: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if mode.is_json() {
        serde_json::to_writer_pretty(&mut handle, payload)?;
        handle.write_all(b"\n")?;
    } else {
        human(payload, &mut handle)?;
    }
    handle.flush()?;
    Ok(())
}

/// Format a microsecond duration for human output (`2h 30m`, `45m`, `12s`).
pub fn format_duration_us(us: i64) -> String {
    let total_secs = us / 1_000_000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::format_duration_us;

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration_us(12_000_000), "12s");
        assert_eq!(format_duration_us(45 * 60 * 1_000_000), "45m");
        assert_eq!(format_duration_us(9_000_000_000), "2h 30m");
    }
}
