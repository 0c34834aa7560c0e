use std::io::{self, Write};

use anyhow::Result;

use crate::cache::AccessRecord;

/// destination for the per-access cache log.
pub trait Sink {
    fn record(&mut self, rec: &AccessRecord) -> Result<()>;
}

/// writes each record as one line to stdout.
pub struct StdoutSink {
    out: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for StdoutSink {
    fn record(&mut self, rec: &AccessRecord) -> Result<()> {
        writeln!(self.out, "{rec}")?;
        Ok(())
    }
}

/// keeps records in memory, for tests and callers that post-process the log.
#[derive(Default)]
pub struct BufferSink {
    records: Vec<AccessRecord>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn records(&self) -> &[AccessRecord] {
        &self.records
    }
    pub fn into_inner(self) -> Vec<AccessRecord> {
        self.records
    }
}

impl Sink for BufferSink {
    fn record(&mut self, rec: &AccessRecord) -> Result<()> {
        self.records.push(rec.clone());
        Ok(())
    }
}

/// discards every record.
pub struct EmptySink {}

impl EmptySink {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for EmptySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink for EmptySink {
    fn record(&mut self, _: &AccessRecord) -> Result<()> {
        Ok(())
    }
}
