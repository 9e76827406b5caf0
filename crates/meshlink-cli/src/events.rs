use serde::Serialize;
use std::io::Write;

/// Emit one JSON line to stdout (flushed immediately for piped output).
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();
    }
}

/// Final line of a simulation run.
#[derive(Serialize)]
pub struct EventSummary<'a, S: Serialize> {
    pub event: &'static str,
    pub queries: usize,
    pub snapshot: &'a S,
}

impl<'a, S: Serialize> EventSummary<'a, S> {
    pub fn new(queries: usize, snapshot: &'a S) -> Self {
        Self {
            event: "summary",
            queries,
            snapshot,
        }
    }
}
