//! Where finished trials go.

use std::io::{self, Write};

use crate::error::SimResult;
use crate::simulation::{ModeCounter, TrialReport};

/// Receives each finished trial.
pub trait ReportSink {
    /// Take one trial's results.
    fn report(&mut self, report: &TrialReport) -> SimResult<()>;
}

/// Prints each trial as a short block of text.
///
/// ```text
/// With MESI
/// Final value of x = 1003
/// Time: 0.0012 seconds
/// Coherence messages (MESI): 1502
/// ----------------------------------------
/// ```
#[derive(Debug)]
pub struct ConsoleSink<W> {
    out: W,
}

impl ConsoleSink<io::Stdout> {
    /// A sink printing to standard output.
    pub fn stdout() -> Self {
        ConsoleSink { out: io::stdout() }
    }
}

impl<W: Write> ConsoleSink<W> {
    /// A sink printing to `out`.
    pub fn new(out: W) -> Self {
        ConsoleSink { out }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn report(&mut self, report: &TrialReport) -> SimResult<()> {
        writeln!(self.out, "{}", report.mode)?;
        writeln!(self.out, "Final value of x = {}", report.final_value)?;
        writeln!(self.out, "Time: {:.4} seconds", report.elapsed_secs())?;
        match report.counter {
            ModeCounter::Messages(n) => writeln!(self.out, "Coherence messages (MESI): {}", n)?,
            ModeCounter::Conflicts(n) => writeln!(self.out, "Conflicts: {}", n)?,
        }
        writeln!(self.out, "{}", "-".repeat(40))?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps every report it is given.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Reports in the order they arrived.
    pub reports: Vec<TrialReport>,
}

impl ReportSink for MemorySink {
    fn report(&mut self, report: &TrialReport) -> SimResult<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}
