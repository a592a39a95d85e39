//! Session Journal
//!
//! Append-only JSONL files, one per session, under the sessions
//! directory. Appends are line-atomic; the reader is tolerant and skips
//! malformed lines with a WARN instead of failing the whole file.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::Utc;
use serde_json::{json, Value};

/// Append-only per-session journal
pub struct SessionJournal {
    dir: PathBuf,
}

impl SessionJournal {
    /// Create a journal rooted at `dir` (created on first append)
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        // File-name safety: anything outside [A-Za-z0-9._-] becomes '_'
        let safe: String = session_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.jsonl", safe))
    }

    /// Append one event, stamped with the write time
    pub fn append(&self, session_id: &str, event: &Value) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let line = json!({
            "ts": Utc::now().to_rfc3339(),
            "session_id": session_id,
            "event": event,
        });

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(session_id))?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Read a session's events; malformed lines are skipped with a WARN
    pub fn read(&self, session_id: &str) -> std::io::Result<Vec<Value>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(vec![]);
        }

        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(&line) {
                Ok(value) => events.push(value),
                Err(e) => tracing::warn!(session_id, "skipping malformed journal line: {}", e),
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let journal = SessionJournal::new(dir.path().join("sessions"));

        journal
            .append("s1", &json!({"event": "ghap_start", "ghap_id": "g1"}))
            .unwrap();
        journal
            .append("s1", &json!({"event": "ghap_resolve", "ghap_id": "g1"}))
            .unwrap();

        let events = journal.read("s1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"]["event"], "ghap_start");
        assert_eq!(events[1]["session_id"], "s1");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = SessionJournal::new(dir.path().join("sessions"));
        journal.append("s1", &json!({"ok": true})).unwrap();

        // Corrupt the file by hand
        let path = dir.path().join("sessions/s1.jsonl");
        let mut body = std::fs::read_to_string(&path).unwrap();
        body.push_str("not json at all\n");
        std::fs::write(&path, body).unwrap();
        journal.append("s1", &json!({"ok": false})).unwrap();

        let events = journal.read("s1").unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn unknown_session_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let journal = SessionJournal::new(dir.path().join("sessions"));
        assert!(journal.read("ghost").unwrap().is_empty());
    }

    #[test]
    fn hostile_session_ids_stay_inside_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let journal = SessionJournal::new(dir.path().join("sessions"));
        journal.append("../../etc/passwd", &json!({})).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("sessions"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
