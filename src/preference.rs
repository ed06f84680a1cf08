//! Persisted user preferences.
//!
//! A [`PreferenceStore`] is a set of normalized free-text fragments ("pizza",
//! "filmes de terror") backed by a JSON document:
//!
//! ```json
//! {"preferences": ["filmes de terror", "pizza"]}
//! ```
//!
//! Every [`PreferenceStore::add`] re-reads the file, merges, and rewrites the
//! whole document through a temp file plus rename, so an interrupted write
//! never leaves a truncated file behind. `add` takes `&mut self`; a session
//! owns exactly one store, which serializes all writers in the process.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PreferenceError, PreferenceResult};

/// Phrases that introduce a preference; the preference is the text after them.
const TRIGGERS: &[&str] = &["gosto de", "eu amo", "prefiro", "i like", "i love"];

/// Keywords shorter than this never count as a mention.
const MIN_KEYWORD_LEN: usize = 3;

#[derive(Debug, Serialize, Deserialize)]
struct PreferenceDocument {
    preferences: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDocument {
    Current(PreferenceDocument),
    /// Older files stored `{"pizza": true, ...}`.
    Legacy(BTreeMap<String, serde_json::Value>),
}

/// Case-fold, trim, collapse whitespace and drop trailing punctuation.
///
/// Returns `None` when nothing is left.
pub fn normalize(text: &str) -> Option<String> {
    let folded = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let trimmed = folded
        .trim_end_matches(|c: char| c.is_ascii_punctuation() || c == '…')
        .trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

const NEGATIONS: &[&str] = &["não", "nao", "don't"];

/// Extract the preference a user revealed, if any.
///
/// `"Eu gosto de Pizza!"` yields `"pizza"`. A trigger whose preceding word is
/// a negation ("não gosto de ...") is ignored.
pub fn detect_preference(input: &str) -> Option<String> {
    let lower = input.to_lowercase();
    TRIGGERS.iter().find_map(|trigger| {
        let pos = lower.find(trigger)?;
        let negated = lower[..pos]
            .split_whitespace()
            .next_back()
            .is_some_and(|word| NEGATIONS.contains(&word));
        if negated {
            return None;
        }
        normalize(&lower[pos + trigger.len()..])
    })
}

fn keywords(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
}

/// Whether a store write created a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    AlreadyKnown(String),
}

impl AddOutcome {
    pub fn item(&self) -> &str {
        match self {
            Self::Added(item) | Self::AlreadyKnown(item) => item,
        }
    }
}

/// Set of remembered preferences bound to one file.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
    items: BTreeSet<String>,
}

impl PreferenceStore {
    /// Open the store at `path`, recovering from a missing or malformed file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = Self::load(&path);
        tracing::debug!(path = %path.display(), count = items.len(), "preferences loaded");
        Self { path, items }
    }

    /// Read the persisted set, falling back to empty on any failure.
    pub fn load(path: &Path) -> BTreeSet<String> {
        match Self::read_file(path) {
            Ok(items) => items,
            Err(PreferenceError::NotFound { .. }) => BTreeSet::new(),
            Err(e) => {
                tracing::warn!("{e}; starting with no remembered preferences");
                BTreeSet::new()
            }
        }
    }

    /// Read the persisted set, distinguishing missing from malformed files.
    pub fn read_file(path: &Path) -> PreferenceResult<BTreeSet<String>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PreferenceError::NotFound {
                    path: path.display().to_string(),
                });
            }
            Err(e) => {
                return Err(PreferenceError::Io {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        let doc: StoredDocument =
            serde_json::from_str(&content).map_err(|e| PreferenceError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let raw = match doc {
            StoredDocument::Current(doc) => doc.preferences,
            StoredDocument::Legacy(map) => map.into_keys().collect(),
        };
        Ok(raw.iter().filter_map(|item| normalize(item)).collect())
    }

    /// Remember `item`. Idempotent for texts that normalize to the same value.
    ///
    /// On a write failure the item stays in memory and the I/O error is
    /// returned.
    pub fn add(&mut self, item: &str) -> PreferenceResult<AddOutcome> {
        let item = normalize(item).ok_or(PreferenceError::Empty)?;

        // Pick up anything another session wrote since we loaded.
        self.items.extend(Self::load(&self.path));

        if self.items.contains(&item) {
            return Ok(AddOutcome::AlreadyKnown(item));
        }
        self.items.insert(item.clone());
        self.persist()?;
        tracing::info!(preference = %item, "preference remembered");
        Ok(AddOutcome::Added(item))
    }

    /// Forget everything, on disk as well.
    pub fn clear(&mut self) -> PreferenceResult<()> {
        self.items.clear();
        self.persist()
    }

    /// Rewrite the whole document atomically.
    pub fn persist(&self) -> PreferenceResult<()> {
        let io_err = |source| PreferenceError::Io {
            path: self.path.display().to_string(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let doc = PreferenceDocument {
            preferences: self.items.iter().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&doc)
            .map_err(|e| io_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Stored preferences mentioned in `text`, by substring or shared keyword.
    pub fn matching(&self, text: &str) -> Vec<&str> {
        let Some(text) = normalize(text) else {
            return Vec::new();
        };
        let words: BTreeSet<&str> = keywords(&text).collect();
        self.items
            .iter()
            .filter(|item| text.contains(item.as_str()) || keywords(item).any(|k| words.contains(k)))
            .map(String::as_str)
            .collect()
    }

    pub fn mentions(&self, text: &str) -> bool {
        !self.matching(text).is_empty()
    }

    /// Personal remark listing every known preference, when `input` touches one.
    pub fn remark_for(&self, input: &str) -> Option<String> {
        if !self.mentions(input) {
            return None;
        }
        let all: Vec<&str> = self.items.iter().map(String::as_str).collect();
        Some(format!(
            " Ah, e eu lembro que você gosta de {}! 😉",
            all.join(", ")
        ))
    }

    pub fn contains(&self, text: &str) -> bool {
        normalize(text).is_some_and(|item| self.items.contains(&item))
    }

    pub fn items(&self) -> &BTreeSet<String> {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
