//! Work queue storage and persistence.
//!
//! The queue file is the single source of truth for which products still need
//! to be acquired. Two layouts are supported:
//! - one identifier per line
//! - a JSON object mapping an acquisition date to a list of identifiers
//!
//! The layout found on load is kept when persisting. Every persist rewrites
//! the whole file through a temporary file and an atomic rename.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::models::WorkItem;

/// Trait for work queue storage operations.
pub trait QueueStore: Send + Sync {
    /// All pending items in stable order.
    fn items(&self) -> Vec<WorkItem>;

    /// Number of pending items.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove an identifier. Returns true if it was present.
    ///
    /// Only changes the in-memory state; call `persist` to make it durable.
    fn remove(&self, identifier: &str) -> bool;

    /// Atomically replace the durable queue with the current state.
    fn persist(&self) -> Result<()>;
}

/// On-disk layout of the queue file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueFileFormat {
    /// One identifier per line.
    Lines,
    /// `{ "<date>": ["<identifier>", ...], ... }`
    Grouped,
}

impl QueueFileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueFileFormat::Lines => "lines",
            QueueFileFormat::Grouped => "grouped",
        }
    }
}

struct QueueState {
    format: QueueFileFormat,
    /// Group keys seen on load, kept even when they become empty.
    groups: Vec<String>,
    items: Vec<WorkItem>,
}

/// Queue store backed by a plain file.
pub struct FileQueueStore {
    path: PathBuf,
    state: Mutex<QueueState>,
}

impl FileQueueStore {
    /// Load the queue file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read queue file: {:?}", path))?;
        let state = parse_queue(&content)
            .with_context(|| format!("Failed to parse queue file: {:?}", path))?;

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> QueueFileFormat {
        self.state().format
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueueStore for FileQueueStore {
    fn items(&self) -> Vec<WorkItem> {
        self.state().items.clone()
    }

    fn len(&self) -> usize {
        self.state().items.len()
    }

    fn remove(&self, identifier: &str) -> bool {
        let mut state = self.state();
        let before = state.items.len();
        state.items.retain(|i| i.identifier != identifier);
        before != state.items.len()
    }

    fn persist(&self) -> Result<()> {
        let content = {
            let state = self.state();
            render_queue(&state)?
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary queue file in {:?}", dir))?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write temporary queue file")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to sync temporary queue file")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace queue file: {:?}", self.path))?;

        debug!("Persisted queue file {:?}", self.path);
        Ok(())
    }
}

/// Strip the archive extension some queue files carry.
///
/// Identifiers name the staging file, so anything that is not a plain file
/// name is dropped.
fn normalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let id = trimmed.strip_suffix(".zip").unwrap_or(trimmed);
    if id.is_empty() {
        return None;
    }
    if id == "." || id == ".." || id.contains(|c: char| c == '/' || c == '\\') {
        warn!("Queue entry {:?} is not a product identifier, ignored", raw);
        return None;
    }
    Some(id.to_string())
}

fn parse_queue(content: &str) -> Result<QueueState> {
    if content.trim_start().starts_with('{') {
        parse_grouped(content)
    } else {
        Ok(parse_lines(content))
    }
}

fn parse_lines(content: &str) -> QueueState {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for id in content.lines().filter_map(normalize_identifier) {
        if seen.insert(id.clone()) {
            items.push(WorkItem::new(id));
        } else {
            warn!("Duplicate queue entry {} ignored", id);
        }
    }

    QueueState {
        format: QueueFileFormat::Lines,
        groups: Vec::new(),
        items,
    }
}

fn parse_grouped(content: &str) -> Result<QueueState> {
    let map: BTreeMap<String, Vec<String>> =
        serde_json::from_str(content).context("Invalid grouped queue file")?;

    let mut groups = Vec::with_capacity(map.len());
    let mut items = Vec::new();
    for (group, ids) in map {
        let mut seen = HashSet::new();
        for id in ids.iter().filter_map(|s| normalize_identifier(s)) {
            if seen.insert(id.clone()) {
                items.push(WorkItem::new(id).with_group(group.clone()));
            } else {
                warn!("Duplicate queue entry {} in group {} ignored", id, group);
            }
        }
        groups.push(group);
    }

    Ok(QueueState {
        format: QueueFileFormat::Grouped,
        groups,
        items,
    })
}

fn render_queue(state: &QueueState) -> Result<String> {
    match state.format {
        QueueFileFormat::Lines => Ok(state
            .items
            .iter()
            .map(|i| format!("{}\n", i.identifier))
            .collect()),
        QueueFileFormat::Grouped => {
            let mut map: BTreeMap<String, Vec<String>> = state
                .groups
                .iter()
                .map(|g| (g.clone(), Vec::new()))
                .collect();
            for item in &state.items {
                let group = item.group.clone().unwrap_or_default();
                map.entry(group).or_default().push(item.identifier.clone());
            }
            serde_json::to_string_pretty(&map).context("Failed to serialize grouped queue")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_lines_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        std::fs::write(&path, "A\nB.zip\n\n  C  \nA\n").unwrap();

        let store = FileQueueStore::open(&path).unwrap();

        assert_eq!(store.format(), QueueFileFormat::Lines);
        assert_eq!(store.path(), path.as_path());
        let ids: Vec<String> = store.items().into_iter().map(|i| i.identifier).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_open_grouped_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(
            &path,
            r#"{"2019-01-02": ["C"], "2019-01-01": ["A", "B", "A"], "2019-01-03": []}"#,
        )
        .unwrap();

        let store = FileQueueStore::open(&path).unwrap();

        assert_eq!(store.format(), QueueFileFormat::Grouped);
        let items = store.items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], WorkItem::new("A").with_group("2019-01-01"));
        assert_eq!(items[1], WorkItem::new("B").with_group("2019-01-01"));
        assert_eq!(items[2], WorkItem::new("C").with_group("2019-01-02"));
    }

    #[test]
    fn test_same_identifier_in_two_groups_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, r#"{"2019-01-01": ["A"], "2019-01-02": ["A"]}"#).unwrap();

        let store = FileQueueStore::open(&path).unwrap();
        assert_eq!(store.len(), 2);

        // identity is the identifier, so removal clears both
        assert!(store.remove("A"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let result = FileQueueStore::open(&dir.path().join("nope.txt"));
        assert!(result.is_err());
    }

    #[test]
    fn test_open_invalid_grouped_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = FileQueueStore::open(&path);
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        std::fs::write(&path, "A\nB\n").unwrap();
        let store = FileQueueStore::open(&path).unwrap();

        assert!(store.remove("A"));
        assert!(!store.remove("A"));
        let ids: Vec<String> = store.items().into_iter().map(|i| i.identifier).collect();
        assert_eq!(ids, vec!["B"]);
    }

    #[test]
    fn test_path_like_entries_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        std::fs::write(&path, "../escaped\n/etc/passwd.zip\nA\n..\nsub\\\\B\n").unwrap();

        let store = FileQueueStore::open(&path).unwrap();

        let ids: Vec<String> = store.items().into_iter().map(|i| i.identifier).collect();
        assert_eq!(ids, vec!["A"]);
    }

    #[test]
    fn test_persist_lines_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        std::fs::write(&path, "A\nB\nC\n").unwrap();
        let store = FileQueueStore::open(&path).unwrap();

        store.remove("B");
        store.persist().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\nC\n");
        let reopened = FileQueueStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    #[test]
    fn test_persist_grouped_keeps_empty_groups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        std::fs::write(&path, r#"{"2019-01-01": ["A"], "2019-01-02": ["B"]}"#).unwrap();
        let store = FileQueueStore::open(&path).unwrap();

        store.remove("A");
        store.persist().unwrap();

        let map: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(map.get("2019-01-01"), Some(&Vec::new()));
        assert_eq!(map.get("2019-01-02"), Some(&vec!["B".to_string()]));
    }

    #[test]
    fn test_persist_leaves_no_temporary_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.txt");
        std::fs::write(&path, "A\n").unwrap();
        let store = FileQueueStore::open(&path).unwrap();

        store.persist().unwrap();
        store.persist().unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
