//! Console and JSON reporting of search events

use std::io::Write;

use codefinder_core::prelude::*;

/// Process exit status for each way a run can end
pub fn exit_status(terminal: &TerminalState) -> u8 {
    match terminal {
        TerminalState::Found(_) => 0,
        TerminalState::Exhausted => 2,
        TerminalState::Failed(_) => 3,
        TerminalState::Cancelled { .. } => 4,
    }
}

/// Exit status for errors before the search starts
pub const STARTUP_FAILURE: u8 = 1;

/// One-line human summary of how a run ended
pub fn summary(outcome: &SearchOutcome) -> String {
    let secs = outcome.elapsed.as_secs_f64();
    match &outcome.terminal {
        TerminalState::Found(code) => format!(
            "Code found: {} ({} attempts in {:.1}s)",
            code,
            outcome.attempts(),
            secs
        ),
        TerminalState::Exhausted => format!(
            "No code accepted: range exhausted after {} attempts ({} rejected, {} without response)",
            outcome.attempts(),
            outcome.stats.rejected,
            outcome.stats.timeouts
        ),
        TerminalState::Failed(reason) => format!(
            "Search failed after {} attempts: {}",
            outcome.attempts(),
            reason
        ),
        TerminalState::Cancelled { resume_from } => format!(
            "Search cancelled after {} attempts; resume with --start {}",
            outcome.attempts(),
            resume_from.value()
        ),
    }
}

/// Observer writing each event to stdout
pub struct Reporter<W: Write> {
    out: W,
    json: bool,
}

impl<W: Write> Reporter<W> {
    /// Report to `out`, as JSON lines when `json` is set
    pub fn new(out: W, json: bool) -> Self {
        Self { out, json }
    }

    fn render(&self, event: &SearchEvent) -> Option<String> {
        if self.json {
            return match serde_json::to_string(event) {
                Ok(line) => Some(line),
                Err(e) => {
                    tracing::warn!("failed to serialize event: {}", e);
                    None
                }
            };
        }

        let time = event.timestamp.format("%H:%M:%S%.3f");
        match &event.kind {
            SearchEventKind::Attempt {
                attempt,
                candidate,
                outcome,
            } => Some(format!("{} #{:<5} {} {}", time, attempt, candidate, outcome)),
            // Terminal events are summarised once the run returns
            _ => None,
        }
    }

    /// Give back the writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> SearchObserver for Reporter<W> {
    fn on_event(&mut self, event: &SearchEvent) {
        if let Some(line) = self.render(event) {
            if let Err(e) = writeln!(self.out, "{}", line) {
                tracing::warn!("failed to write event: {}", e);
            }
        }
    }
}
