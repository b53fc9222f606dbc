use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::warn;

use crate::history::{group_histories, PatientHistory, ScoreEvent};
use crate::store::{HistoryFilter, HistoryStore};
use crate::{CardioError, Result};

/// JSON Lines file store: one score event per line, append-only.
///
/// A line is written with a single `write_all` while holding the writer
/// mutex. Readers only trust newline-terminated lines, so an interrupted
/// append leaves a fragment that is skipped rather than half-read. Opening
/// for append cuts such a fragment off before the first new line lands.
pub struct JsonlHistoryStore {
    path: PathBuf,
    writer: Option<Mutex<File>>,
}

impl JsonlHistoryStore {
    /// Open (or create) the log at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| store_error(&path, err))?;
        truncate_torn_tail(&path, &file)?;
        Ok(Self {
            path,
            writer: Some(Mutex::new(file)),
        })
    }

    /// Reader over the log at `path`. Never creates the file; appends fail.
    pub fn open_read_only(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every complete event in the log, in append order.
    pub fn read_events(&self) -> Result<Vec<ScoreEvent>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(store_error(&self.path, err)),
        };
        // A torn tail may end inside a multi-byte character.
        Ok(parse_events(&String::from_utf8_lossy(&bytes), &self.path))
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn append(&self, event: ScoreEvent) -> Result<()> {
        let mut line = serde_json::to_string(&event)
            .map_err(|err| CardioError::Store(format!("cannot encode event: {err}")))?;
        line.push('\n');

        let writer = self.writer.as_ref().ok_or_else(|| {
            CardioError::Store(format!("{} is open read-only", self.path.display()))
        })?;
        let mut file = match writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(line.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|err| store_error(&self.path, err))
    }

    fn history(&self, subject_id: &str) -> Result<PatientHistory> {
        let events = self
            .read_events()?
            .into_iter()
            .filter(|event| event.subject_id() == Some(subject_id))
            .collect();
        Ok(PatientHistory::new(subject_id, events))
    }

    fn all_histories(&self, filter: &HistoryFilter) -> Result<Vec<PatientHistory>> {
        Ok(group_histories(self.read_events()?)
            .into_iter()
            .filter_map(|history| filter.apply(history))
            .collect())
    }

    fn anonymous_events(&self) -> Result<Vec<ScoreEvent>> {
        Ok(self
            .read_events()?
            .into_iter()
            .filter(|event| event.subject.is_none())
            .collect())
    }
}

// Drop bytes after the last newline left behind by an interrupted append,
// otherwise the next line would be glued onto the fragment.
fn truncate_torn_tail(path: &Path, file: &File) -> Result<()> {
    let contents = std::fs::read(path).map_err(|err| store_error(path, err))?;
    if contents.last().map_or(true, |byte| *byte == b'\n') {
        return Ok(());
    }

    let keep = contents
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |end| end + 1);
    warn!(
        "truncating {} bytes of incomplete event in {}",
        contents.len() - keep,
        path.display()
    );
    file.set_len(keep as u64)
        .map_err(|err| store_error(path, err))
}

fn parse_events(contents: &str, path: &Path) -> Vec<ScoreEvent> {
    let complete = match contents.rfind('\n') {
        Some(end) => &contents[..=end],
        None => "",
    };
    if complete.len() < contents.len() {
        warn!(
            "ignoring {} trailing bytes of incomplete event in {}",
            contents.len() - complete.len(),
            path.display()
        );
    }

    complete
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(index, line)| match serde_json::from_str(line) {
            Ok(event) => Some(event),
            Err(err) => {
                warn!("skipping {} line {}: {err}", path.display(), index + 1);
                None
            }
        })
        .collect()
}

fn store_error(path: &Path, err: std::io::Error) -> CardioError {
    CardioError::Store(format!("{}: {err}", path.display()))
}
