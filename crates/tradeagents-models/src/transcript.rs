use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    System,
    Assistant,
    /// Annotation recorded when a stage fails.
    Error,
}

/// One audit record. Field order is part of the export format consumed by
/// report rendering and must not change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub content: String,
    pub sender: String,
}

impl TranscriptEntry {
    pub fn assistant(sender: &str, content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Assistant,
            content: content.into(),
            sender: sender.to_string(),
        }
    }

    pub fn system(sender: &str, content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::System,
            content: content.into(),
            sender: sender.to_string(),
        }
    }

    pub fn error(sender: &str, content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::Error,
            content: content.into(),
            sender: sender.to_string(),
        }
    }
}

/// Append-only sequence of transcript entries.
///
/// There is intentionally no way to remove or reorder entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sent by a given stage, in order.
    pub fn by_sender<'a>(&'a self, sender: &'a str) -> impl Iterator<Item = &'a TranscriptEntry> {
        self.entries.iter().filter(move |e| e.sender == sender)
    }
}
