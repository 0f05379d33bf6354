//! Conversation store
//!
//! Keeps every conversation in memory and mirrors the whole map to a single
//! JSON document after each mutation. Writers are serialized so that two
//! appends racing on the same file can never drop each other's message.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use uuid::Uuid;

use crate::error::ChatError;
use crate::storage::StorageError;
use crate::types::{
    Conversation, ConversationId, ConversationMap, ConversationSummary, Message, MessageId,
    Sender,
};

/// Default file name of the history document
pub const HISTORY_FILE_NAME: &str = "gemini_chat_history.json";

/// Read the history document at `path`.
///
/// A missing or unreadable document yields an empty map; the failure is
/// logged, never returned. A document that cannot be parsed is moved aside
/// first so the next save does not overwrite it.
pub fn load(path: &Path) -> ConversationMap {
    match load_internal(path) {
        Ok(conversations) => conversations,
        Err(e) => {
            tracing::warn!(
                "Failed to load chat history from {}, starting empty: {}",
                path.display(),
                e
            );
            if matches!(e, StorageError::Serialization(_)) {
                match back_up_unreadable(path) {
                    Ok(backup) => tracing::warn!(
                        "Moved unreadable chat history to {}",
                        backup.display()
                    ),
                    Err(e) => tracing::error!(
                        "Failed to back up unreadable chat history {}: {}",
                        path.display(),
                        e
                    ),
                }
            }
            ConversationMap::new()
        }
    }
}

/// Rename `path` to the first free `<name>.bak`, `<name>.1.bak`, ... sibling.
fn back_up_unreadable(path: &Path) -> Result<PathBuf, StorageError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| HISTORY_FILE_NAME.to_string());

    let mut backup = path.with_file_name(format!("{}.bak", file_name));
    let mut n = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{}.{}.bak", file_name, n));
        n += 1;
    }

    fs::rename(path, &backup)?;
    Ok(backup)
}

fn load_internal(path: &Path) -> Result<ConversationMap, StorageError> {
    if !path.exists() {
        tracing::info!("Chat history not found at {}, starting empty", path.display());
        return Ok(ConversationMap::new());
    }

    let json = fs::read_to_string(path)?;
    let conversations: ConversationMap = serde_json::from_str(&json)?;

    tracing::debug!("Loaded {} conversations from disk", conversations.len());
    Ok(conversations)
}

/// Serialize with the 4-space indentation the history file has always used.
fn to_json(conversations: &ConversationMap) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    conversations.serialize(&mut serializer)?;
    Ok(buf)
}

/// Replace the file at `path` with `contents` via a sibling temp file and rename.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| HISTORY_FILE_NAME.to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(contents)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    Ok(())
}

/// A message accepted into memory, with the outcome of writing it to disk.
///
/// A failed write does not undo the append: memory stays authoritative and
/// the next successful write brings the file up to date.
#[derive(Debug)]
pub struct Recorded {
    pub message_id: MessageId,
    pub saved: Result<(), StorageError>,
}

impl Recorded {
    /// Turn a failed write into an error, dropping the message id.
    pub fn into_result(self) -> Result<MessageId, ChatError> {
        self.saved?;
        Ok(self.message_id)
    }
}

/// Single authoritative store of all conversations.
///
/// Share it behind an `Arc`. Reads take the map's read lock only. Every
/// mutation holds `persist_lock` from the moment it touches the map until the
/// file has been replaced, so write-then-persist sequences never interleave.
pub struct ConversationStore {
    path: PathBuf,
    conversations: RwLock<ConversationMap>,
    persist_lock: Mutex<()>,
}

impl ConversationStore {
    /// Open the store backed by `path`, loading whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let conversations = load(&path);
        tracing::info!(
            "Opened conversation store at {} ({} conversations)",
            path.display(),
            conversations.len()
        );
        Self {
            path,
            conversations: RwLock::new(conversations),
            persist_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> RwLockReadGuard<'_, ConversationMap> {
        self.conversations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ConversationMap> {
        self.conversations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the map and persist the result before returning.
    ///
    /// If `f` fails nothing is written. If the write fails the in-memory
    /// change is kept and the error is returned.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ConversationMap) -> Result<T, ChatError>,
    ) -> Result<T, ChatError> {
        let (value, saved) = self.mutate_then_save(f)?;
        saved?;
        Ok(value)
    }

    /// Like [`Self::mutate`], but hands back the write outcome separately
    /// once `f` has succeeded.
    fn mutate_then_save<T>(
        &self,
        f: impl FnOnce(&mut ConversationMap) -> Result<T, ChatError>,
    ) -> Result<(T, Result<(), StorageError>), ChatError> {
        let _persist = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (value, snapshot) = {
            let mut conversations = self.write();
            let value = f(&mut *conversations)?;
            (value, to_json(&*conversations))
        };

        let saved = snapshot.and_then(|bytes| write_atomic(&self.path, &bytes));
        match &saved {
            Ok(()) => tracing::debug!("Saved chat history to {}", self.path.display()),
            Err(e) => tracing::error!(
                "Failed to save chat history to {}: {}",
                self.path.display(),
                e
            ),
        }
        Ok((value, saved))
    }

    /// Serialize the full store to disk, replacing the previous document.
    pub fn persist(&self) -> Result<(), StorageError> {
        let _persist = self.persist_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = to_json(&self.read())?;
        write_atomic(&self.path, &snapshot)?;
        tracing::debug!("Saved chat history to {}", self.path.display());
        Ok(())
    }

    /// Create an empty conversation and return its id.
    pub fn create_conversation(&self) -> Result<ConversationId, ChatError> {
        let id = Uuid::new_v4().to_string();
        self.mutate(|conversations| {
            conversations.insert(id.clone(), Conversation::new());
            Ok(())
        })?;
        tracing::info!("Created conversation {}", id);
        Ok(id)
    }

    /// Append a message to an existing conversation and refresh its title.
    ///
    /// Rejects blank text and unknown conversation ids with
    /// [`ChatError::InvalidInput`]; unknown ids are never created implicitly.
    pub fn append_message(
        &self,
        conversation_id: &str,
        text: &str,
        sender: Sender,
    ) -> Result<MessageId, ChatError> {
        self.record_message(conversation_id, text, sender)?
            .into_result()
    }

    /// Append a message, reporting a failed write in [`Recorded::saved`]
    /// instead of as an error.
    ///
    /// Only validation failures are returned as errors; once the message is
    /// in memory its id is always handed back.
    pub fn record_message(
        &self,
        conversation_id: &str,
        text: &str,
        sender: Sender,
    ) -> Result<Recorded, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::InvalidInput("message text is empty".into()));
        }

        let message_id = Uuid::new_v4().to_string();
        let ((), saved) = self.mutate_then_save(|conversations| {
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| unknown_conversation(conversation_id))?;
            conversation
                .messages
                .insert(message_id.clone(), Message::new(text, sender));
            conversation.refresh_title();
            Ok(())
        })?;

        tracing::debug!(
            "Appended message {} to conversation {}",
            message_id,
            conversation_id
        );
        Ok(Recorded { message_id, saved })
    }

    /// Give a conversation a user-chosen title.
    ///
    /// The next appended message recomputes the title from the first message.
    pub fn rename_conversation(&self, conversation_id: &str, title: &str) -> Result<(), ChatError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ChatError::InvalidInput("title is empty".into()));
        }

        self.mutate(|conversations| {
            let conversation = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| unknown_conversation(conversation_id))?;
            conversation.title = title.to_string();
            Ok(())
        })
    }

    /// Conversations ordered most recently created first.
    pub fn list_conversations(&self) -> Vec<ConversationSummary> {
        let conversations = self.read();
        let mut summaries: Vec<ConversationSummary> = conversations
            .iter()
            .rev()
            .map(|(id, conversation)| ConversationSummary {
                id: id.clone(),
                title: conversation.title.clone(),
                created_at: conversation.created_at,
                message_count: conversation.messages.len(),
            })
            .collect();
        // Stable sort keeps later insertions first among equal timestamps
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.read().contains_key(conversation_id)
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<Conversation> {
        self.read().get(conversation_id).cloned()
    }

    /// Messages of a conversation in display order.
    pub fn messages(&self, conversation_id: &str) -> Result<Vec<(MessageId, Message)>, ChatError> {
        let conversations = self.read();
        let conversation = conversations
            .get(conversation_id)
            .ok_or_else(|| unknown_conversation(conversation_id))?;
        Ok(conversation
            .messages
            .iter()
            .map(|(id, message)| (id.clone(), message.clone()))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of the whole in-memory map.
    pub fn snapshot(&self) -> ConversationMap {
        self.read().clone()
    }
}

fn unknown_conversation(conversation_id: &str) -> ChatError {
    ChatError::InvalidInput(format!("unknown conversation: {}", conversation_id))
}
