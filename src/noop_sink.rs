use crate::sink::LogSink;
use std::io;

/// A sink that simply drops all rendered lines.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// output, and for tests that only look at the processed records.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Ok(())
    }
}
