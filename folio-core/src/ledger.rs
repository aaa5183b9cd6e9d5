//! Reading-progress ledger for recently opened documents.
//!
//! Plain text, one record per line, `<display-name>:<last-page-number>` with
//! 1-based page numbers. The most recently touched record is first and the
//! list is capped; the file is rewritten whole through a temp file so a
//! crash mid-save never leaves a torn ledger.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub const MAX_RECENT: usize = 50;

#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    records: Vec<(String, usize)>,
}

impl ProgressLedger {
    /// Load the ledger at `path`. A missing or unreadable file means no
    /// saved progress; malformed lines are skipped.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(contents) => parse(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read progress ledger");
                Vec::new()
            }
        };
        debug!(path = %path.display(), records = records.len(), "loaded progress ledger");
        Self { path, records }
    }

    /// Saved 1-based page number for a document, by display name.
    pub fn last_page(&self, name: &str) -> Option<usize> {
        self.records
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|&(_, page)| page)
    }

    /// Record progress for `name`, promoting it to the front. The oldest
    /// record falls off once the cap is reached.
    pub fn record(&mut self, name: &str, page_number: usize) {
        self.records.retain(|(entry, _)| entry != name);
        self.records.insert(0, (name.to_string(), page_number));
        self.records.truncate(MAX_RECENT);
    }

    /// Rewrite the ledger atomically: write a sibling temp file, then rename
    /// it over the real one.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating ledger directory {}", parent.display()))?;
        }

        let mut contents = String::new();
        for (name, page) in &self.records {
            contents.push_str(name);
            contents.push(':');
            contents.push_str(&page.to_string());
            contents.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)
            .with_context(|| format!("writing ledger temp file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming ledger into place at {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse(contents: &str) -> Vec<(String, usize)> {
    contents
        .lines()
        .filter_map(|line| {
            // Display names may themselves contain colons; the page number
            // is everything after the last one.
            let (name, page) = line.rsplit_once(':')?;
            let page: usize = page.trim().parse().ok()?;
            if name.is_empty() || page == 0 {
                return None;
            }
            Some((name.to_string(), page))
        })
        .take(MAX_RECENT)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_means_no_progress() {
        let dir = tempdir().unwrap();
        let ledger = ProgressLedger::load(dir.path().join("recent"));
        assert_eq!(ledger.last_page("anything"), None);
    }

    #[test]
    fn record_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recent");

        let mut ledger = ProgressLedger::load(&path);
        ledger.record("paper", 12);
        ledger.record("novel", 340);
        ledger.save().unwrap();

        let reloaded = ProgressLedger::load(&path);
        assert_eq!(reloaded.last_page("paper"), Some(12));
        assert_eq!(reloaded.last_page("novel"), Some(340));
        assert_eq!(reloaded.last_page("unknown"), None);
    }

    #[test]
    fn recording_again_moves_entry_to_front_with_new_page() {
        let dir = tempdir().unwrap();
        let mut ledger = ProgressLedger::load(dir.path().join("recent"));
        ledger.record("paper", 2);
        ledger.record("novel", 5);
        ledger.record("paper", 9);
        assert_eq!(ledger.last_page("paper"), Some(9));
        assert_eq!(ledger.records[0].0, "paper");
        assert_eq!(ledger.records.len(), 2);
    }

    #[test]
    fn oldest_record_falls_off_past_the_cap() {
        let dir = tempdir().unwrap();
        let mut ledger = ProgressLedger::load(dir.path().join("recent"));
        for i in 0..(MAX_RECENT + 5) {
            ledger.record(&format!("doc-{i}"), i + 1);
        }
        assert_eq!(ledger.records.len(), MAX_RECENT);
        assert_eq!(ledger.last_page("doc-0"), None);
        assert_eq!(ledger.last_page(&format!("doc-{}", MAX_RECENT + 4)), Some(MAX_RECENT + 5));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recent");
        fs::write(
            &path,
            "good:7\nno-separator\nalso bad:\n:3\nnot-a-number:xyz\nzero:0\ncolon:in:name:11\n",
        )
        .unwrap();

        let ledger = ProgressLedger::load(&path);
        assert_eq!(ledger.last_page("good"), Some(7));
        assert_eq!(ledger.last_page("colon:in:name"), Some(11));
        assert_eq!(ledger.records.len(), 2);
    }

    #[test]
    fn save_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("recent");
        let mut ledger = ProgressLedger::load(&path);
        ledger.record("paper", 1);
        ledger.save().unwrap();
        assert!(path.exists());
    }
}
