use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

/// Destination for rendered records, one line per record.
///
/// Implementations are called inline from the log call, after the
/// pipeline and the renderer are done. They should do nothing but write
/// bytes: a failure is reported by the pipeline on stderr and the record
/// is lost, it never reaches the caller.
pub trait LogSink: Send + Sync {
    /// Write a single rendered record. `line` carries no trailing newline.
    fn write_line(&self, line: &str) -> io::Result<()>;

    /// Flush any buffered output. Default implementation is a no-op.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes each record to the process stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl LogSink for StdoutSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(line.as_bytes())?;
        out.write_all(b"\n")
    }

    fn flush(&self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

/// Keeps every rendered line in memory.
///
/// Handy for tests and for services that want to inspect their own output.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn lines(&self) -> Vec<String> {
        self.guard().clone()
    }

    /// Lines parsed back as JSON. Lines that are not JSON are skipped.
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.guard()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.guard().push(line.to_string());
        Ok(())
    }
}
