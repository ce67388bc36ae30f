//! Best-effort JSON-lines persistence for the output streams.
//!
//! Grounded on the original source's repeated `append_jsonl` +
//! try/except-log pattern: a write failure is logged and swallowed, never
//! allowed to abort the engine (spec.md §7 `WriteFailure`).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

/// Append one JSON-serialized record as a line to `path`, creating the
/// file (and leaving prior contents intact) if needed. On any failure,
/// logs a structured error and returns without panicking.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) {
    let line = match serde_json::to_string(record) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(where_ = "persistence::append_jsonl", error = %e, "failed to serialize record");
            return;
        }
    };

    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{}", line));

    if let Err(e) = result {
        tracing::error!(
            where_ = "persistence::append_jsonl",
            path = %path.display(),
            error = %e,
            "write failure, continuing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::fs;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Dummy {
        a: i32,
    }

    #[test]
    fn append_jsonl_appends_without_truncating() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("neuralzone_test_persist_{}.jsonl", std::process::id()));
        fs::remove_file(&path).ok();

        append_jsonl(&path, &Dummy { a: 1 });
        append_jsonl(&path, &Dummy { a: 2 });

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Dummy = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, Dummy { a: 1 });

        fs::remove_file(&path).ok();
    }

    #[test]
    fn write_failure_does_not_panic() {
        // A directory path can never be opened as a file for append;
        // this must log and return, not panic.
        let dir = std::env::temp_dir();
        append_jsonl(&dir, &Dummy { a: 1 });
    }
}
