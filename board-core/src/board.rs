//! Saved boards - the persistence collaborator contract.
//!
//! A board is a finished canvas saved at a user-initiated save point. The
//! sync engine never touches this module; the surrounding application takes
//! a session's in-memory snapshot and hands it to a [`BoardStore`].
//!
//! Every operation is scoped by owner: an id belonging to someone else is
//! indistinguishable from a missing one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::current_timestamp_ms;
use crate::element::CanvasElement;
use crate::error::{CanvasError, CanvasResult};
use crate::session::DEFAULT_BACKGROUND;

/// Unique identifier for a saved board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(Uuid);

impl BoardId {
    /// Create a new unique board ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a board ID from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::BoardNotFound`] if `s` is not a UUID; a
    /// malformed id can never match a stored board.
    pub fn parse(s: &str) -> CanvasResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| CanvasError::BoardNotFound(s.to_string()))
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A saved board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    /// Board identifier.
    pub id: BoardId,
    /// Owning principal id from the identity collaborator.
    pub owner: String,
    /// Title, trimmed and non-empty.
    pub title: String,
    /// Saved element sequence.
    pub elements: Vec<CanvasElement>,
    /// Saved background color.
    pub background_color: String,
    /// Preview image (typically a data URL); may be empty.
    pub thumbnail: String,
    /// Creation time (Unix milliseconds).
    pub created_at: u64,
    /// Last update time (Unix milliseconds).
    pub updated_at: u64,
}

/// Board listing entry; omits the element payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSummary {
    /// Board identifier.
    pub id: BoardId,
    /// Title.
    pub title: String,
    /// Preview image.
    pub thumbnail: String,
    /// Creation time (Unix milliseconds).
    pub created_at: u64,
    /// Last update time (Unix milliseconds).
    pub updated_at: u64,
}

impl From<&Board> for BoardSummary {
    fn from(board: &Board) -> Self {
        Self {
            id: board.id,
            title: board.title.clone(),
            thumbnail: board.thumbnail.clone(),
            created_at: board.created_at,
            updated_at: board.updated_at,
        }
    }
}

fn default_background() -> String {
    DEFAULT_BACKGROUND.to_string()
}

/// Client-supplied board content for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDraft {
    /// Title; surrounding whitespace is trimmed.
    pub title: String,
    /// Element sequence to save.
    #[serde(default)]
    pub elements: Vec<CanvasElement>,
    /// Background color to save.
    #[serde(default = "default_background")]
    pub background_color: String,
    /// Preview image.
    #[serde(default)]
    pub thumbnail: String,
}

impl BoardDraft {
    /// Trim the title and reject empty ones.
    fn validated_title(&self) -> CanvasResult<String> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(CanvasError::InvalidBoard("title is required".to_string()));
        }
        Ok(title.to_string())
    }
}

/// Persistence contract for saved boards.
pub trait BoardStore: Send + Sync {
    /// Save a new board owned by `owner`.
    ///
    /// # Errors
    ///
    /// [`CanvasError::InvalidBoard`] for an empty title; storage errors from
    /// file-backed implementations.
    fn create(&self, owner: &str, draft: BoardDraft) -> CanvasResult<Board>;

    /// Fetch a board by id and owner.
    ///
    /// # Errors
    ///
    /// [`CanvasError::BoardNotFound`] if the id/owner pair does not match.
    fn get(&self, id: BoardId, owner: &str) -> CanvasResult<Board>;

    /// Overwrite a board's content.
    ///
    /// # Errors
    ///
    /// [`CanvasError::BoardNotFound`] if the id/owner pair does not match,
    /// [`CanvasError::InvalidBoard`] for an empty title.
    fn update(&self, id: BoardId, owner: &str, draft: BoardDraft) -> CanvasResult<Board>;

    /// Delete a board.
    ///
    /// # Errors
    ///
    /// [`CanvasError::BoardNotFound`] if the id/owner pair does not match.
    fn delete(&self, id: BoardId, owner: &str) -> CanvasResult<()>;

    /// All boards of `owner`, most recently updated first.
    ///
    /// # Errors
    ///
    /// Storage errors from file-backed implementations.
    fn list(&self, owner: &str) -> CanvasResult<Vec<BoardSummary>>;

    /// Verify the store can accept writes.
    ///
    /// # Errors
    ///
    /// The storage error that would make the next write fail.
    fn check(&self) -> CanvasResult<()> {
        Ok(())
    }
}

type BoardMap = HashMap<BoardId, Board>;

/// Shared in-memory board table used by both store implementations.
#[derive(Debug, Clone, Default)]
struct BoardTable {
    boards: Arc<RwLock<BoardMap>>,
}

impl BoardTable {
    fn read(&self) -> RwLockReadGuard<'_, BoardMap> {
        self.boards
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BoardMap> {
        self.boards
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert a new board once `persist` accepts it.
    fn create(
        &self,
        owner: &str,
        draft: BoardDraft,
        persist: impl FnOnce(&Board) -> CanvasResult<()>,
    ) -> CanvasResult<Board> {
        let title = draft.validated_title()?;
        let now = current_timestamp_ms();
        let board = Board {
            id: BoardId::new(),
            owner: owner.to_string(),
            title,
            elements: draft.elements,
            background_color: draft.background_color,
            thumbnail: draft.thumbnail,
            created_at: now,
            updated_at: now,
        };
        let mut boards = self.write();
        persist(&board)?;
        boards.insert(board.id, board.clone());
        Ok(board)
    }

    fn get(&self, id: BoardId, owner: &str) -> CanvasResult<Board> {
        self.read()
            .get(&id)
            .filter(|board| board.owner == owner)
            .cloned()
            .ok_or_else(|| CanvasError::BoardNotFound(id.to_string()))
    }

    /// Replace a board's contents once `persist` accepts the new version.
    fn update(
        &self,
        id: BoardId,
        owner: &str,
        draft: BoardDraft,
        persist: impl FnOnce(&Board) -> CanvasResult<()>,
    ) -> CanvasResult<Board> {
        let title = draft.validated_title()?;
        let mut boards = self.write();
        let board = boards
            .get_mut(&id)
            .filter(|board| board.owner == owner)
            .ok_or_else(|| CanvasError::BoardNotFound(id.to_string()))?;
        let updated = Board {
            title,
            elements: draft.elements,
            background_color: draft.background_color,
            thumbnail: draft.thumbnail,
            // Keep updated_at strictly increasing for ordering within one millisecond.
            updated_at: current_timestamp_ms().max(board.updated_at + 1),
            ..board.clone()
        };
        persist(&updated)?;
        *board = updated.clone();
        Ok(updated)
    }

    /// Remove a board once `unpersist` has dropped its stored copy.
    fn delete(
        &self,
        id: BoardId,
        owner: &str,
        unpersist: impl FnOnce(BoardId) -> CanvasResult<()>,
    ) -> CanvasResult<()> {
        let mut boards = self.write();
        if !boards.get(&id).is_some_and(|board| board.owner == owner) {
            return Err(CanvasError::BoardNotFound(id.to_string()));
        }
        unpersist(id)?;
        boards.remove(&id);
        Ok(())
    }

    fn list(&self, owner: &str) -> Vec<BoardSummary> {
        let boards = self.read();
        let mut summaries: Vec<BoardSummary> = boards
            .values()
            .filter(|board| board.owner == owner)
            .map(BoardSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }
}

/// Board store that lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBoardStore {
    table: BoardTable,
}

impl MemoryBoardStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BoardStore for MemoryBoardStore {
    fn create(&self, owner: &str, draft: BoardDraft) -> CanvasResult<Board> {
        self.table.create(owner, draft, |_| Ok(()))
    }

    fn get(&self, id: BoardId, owner: &str) -> CanvasResult<Board> {
        self.table.get(id, owner)
    }

    fn update(&self, id: BoardId, owner: &str, draft: BoardDraft) -> CanvasResult<Board> {
        self.table.update(id, owner, draft, |_| Ok(()))
    }

    fn delete(&self, id: BoardId, owner: &str) -> CanvasResult<()> {
        self.table.delete(id, owner, |_| Ok(()))
    }

    fn list(&self, owner: &str) -> CanvasResult<Vec<BoardSummary>> {
        Ok(self.table.list(owner))
    }
}

/// Board store that writes each board to `<data_dir>/<id>.json`.
///
/// All boards are loaded into memory when the store is opened. A write only
/// reaches the in-memory table after the file change succeeded, so a failed
/// write leaves both unchanged.
#[derive(Debug, Clone)]
pub struct FileBoardStore {
    table: BoardTable,
    data_dir: PathBuf,
}

impl FileBoardStore {
    /// Open (or create) a store rooted at `data_dir`.
    ///
    /// Files that fail to parse are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::Io`] if the directory cannot be created or read.
    pub fn open(data_dir: impl Into<PathBuf>) -> CanvasResult<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let table = BoardTable::default();
        {
            let mut boards = table.write();
            for entry in std::fs::read_dir(&data_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match Self::load_file(&path) {
                    Ok(board) => {
                        boards.insert(board.id, board);
                    }
                    Err(e) => {
                        tracing::warn!("Skipping unreadable board file {}: {e}", path.display());
                    }
                }
            }
            tracing::info!(
                "Loaded {} boards from {}",
                boards.len(),
                data_dir.display()
            );
        }

        Ok(Self { table, data_dir })
    }

    /// Directory the store writes to.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn load_file(path: &Path) -> CanvasResult<Board> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn path_for(&self, id: BoardId) -> PathBuf {
        self.data_dir.join(format!("{id}.json"))
    }

    fn persist(&self, board: &Board) -> CanvasResult<()> {
        let json = serde_json::to_string_pretty(board)?;
        std::fs::write(self.path_for(board.id), json)?;
        Ok(())
    }
}

impl BoardStore for FileBoardStore {
    fn create(&self, owner: &str, draft: BoardDraft) -> CanvasResult<Board> {
        self.table.create(owner, draft, |board| self.persist(board))
    }

    fn get(&self, id: BoardId, owner: &str) -> CanvasResult<Board> {
        self.table.get(id, owner)
    }

    fn update(&self, id: BoardId, owner: &str, draft: BoardDraft) -> CanvasResult<Board> {
        self.table.update(id, owner, draft, |board| self.persist(board))
    }

    fn delete(&self, id: BoardId, owner: &str) -> CanvasResult<()> {
        self.table
            .delete(id, owner, |id| match std::fs::remove_file(self.path_for(id)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            })
    }

    fn list(&self, owner: &str) -> CanvasResult<Vec<BoardSummary>> {
        Ok(self.table.list(owner))
    }

    fn check(&self) -> CanvasResult<()> {
        let metadata = std::fs::metadata(&self.data_dir)?;
        if !metadata.is_dir() {
            return Err(std::io::Error::other(format!(
                "{} is not a directory",
                self.data_dir.display()
            ))
            .into());
        }
        if metadata.permissions().readonly() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is read-only", self.data_dir.display()),
            )
            .into());
        }
        Ok(())
    }
}
