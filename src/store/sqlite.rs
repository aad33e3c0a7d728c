//! SQLite-backed chat store
//!
//! A single connection guarded by a mutex. Every query runs on the blocking
//! pool so async callers never stall a runtime worker on disk I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{ChatStore, StoreError, StoreResult};
use crate::types::{
    ConversationId, ConversationSummary, MessageId, MessageProjection, ReceiptProjection, UserId,
    UserPreview,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        avatar_url TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT,
        is_group INTEGER NOT NULL DEFAULT 0,
        owner_id INTEGER REFERENCES users(id),
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS conversation_members (
        conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        PRIMARY KEY (conversation_id, user_id)
    );

    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
        sender_id INTEGER NOT NULL REFERENCES users(id),
        content TEXT NOT NULL,
        is_system INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, id);

    CREATE TABLE IF NOT EXISTS message_receipts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
        user_id INTEGER NOT NULL REFERENCES users(id),
        read_at TEXT NOT NULL,
        UNIQUE (message_id, user_id)
    );
";

const MESSAGE_SELECT: &str = "
    SELECT m.id, m.content, m.is_system, m.created_at, u.id, u.username, u.avatar_url
    FROM messages m
    JOIN users u ON u.id = m.sender_id
";

/// Chat store persisted in a SQLite database file
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Create or open the database at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let store = Self::init(conn, Some(path.clone()))?;
        tracing::info!(path = %path.display(), "Chat store opened");
        Ok(store)
    }

    /// Open a private in-memory database (tests, demos)
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| StoreError::Lock(e.to_string()))?;
            f(&mut guard)
        })
        .await?
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageProjection> {
    Ok(MessageProjection {
        id: MessageId(row.get(0)?),
        content: row.get(1)?,
        is_system: row.get(2)?,
        created_at: row.get(3)?,
        sender: UserPreview {
            id: UserId(row.get(4)?),
            username: row.get(5)?,
            avatar_url: row.get(6)?,
        },
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserPreview> {
    Ok(UserPreview {
        id: UserId(row.get(0)?),
        username: row.get(1)?,
        avatar_url: row.get(2)?,
    })
}

fn load_conversation(conn: &Connection, id: ConversationId) -> StoreResult<ConversationSummary> {
    let header = conn
        .query_row(
            "SELECT title, is_group, owner_id, created_at FROM conversations WHERE id = ?1",
            params![id.0],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, DateTime<Utc>>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((title, is_group, owner_id, created_at)) = header else {
        return Err(StoreError::ConversationNotFound(id));
    };

    let mut stmt = conn.prepare_cached(
        "SELECT u.id, u.username, u.avatar_url
         FROM conversation_members cm
         JOIN users u ON u.id = cm.user_id
         WHERE cm.conversation_id = ?1
         ORDER BY u.id",
    )?;
    let participants = stmt
        .query_map(params![id.0], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConversationSummary {
        id,
        title,
        is_group,
        owner_id: owner_id.map(UserId),
        participants,
        created_at,
    })
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserPreview>> {
        let username = username.to_string();
        self.with_conn(move |conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, avatar_url FROM users WHERE username = ?1",
                    params![username],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn create_user(
        &self,
        username: &str,
        avatar_url: Option<&str>,
    ) -> StoreResult<UserPreview> {
        let username = username.trim().to_string();
        if username.is_empty() {
            return Err(StoreError::Invalid("username must not be empty".to_string()));
        }
        let avatar_url = avatar_url.map(str::to_string);

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (username, avatar_url, created_at) VALUES (?1, ?2, ?3)",
                params![username, avatar_url, Utc::now()],
            )?;
            Ok(UserPreview {
                id: UserId(conn.last_insert_rowid()),
                username,
                avatar_url,
            })
        })
        .await
    }

    async fn is_participant(
        &self,
        conversation: ConversationId,
        user: UserId,
    ) -> StoreResult<bool> {
        self.with_conn(move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM conversation_members WHERE conversation_id = ?1 AND user_id = ?2",
                    params![conversation.0, user.0],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn persist_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        content: &str,
    ) -> StoreResult<MessageProjection> {
        let content = content.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, sender_id, content, is_system, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![conversation.0, sender.0, content, Utc::now()],
            )?;
            let id = conn.last_insert_rowid();

            let message = conn.query_row(
                &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
                params![id],
                message_from_row,
            )?;
            Ok(message)
        })
        .await
    }

    async fn upsert_receipt(
        &self,
        conversation: ConversationId,
        message: MessageId,
        user: UserId,
    ) -> StoreResult<(ReceiptProjection, bool)> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let exists = tx
                .query_row(
                    "SELECT 1 FROM messages WHERE id = ?1 AND conversation_id = ?2",
                    params![message.0, conversation.0],
                    |_| Ok(()),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StoreError::MessageNotFound {
                    conversation_id: conversation,
                    message_id: message,
                });
            }

            let inserted = tx.execute(
                "INSERT INTO message_receipts (message_id, user_id, read_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (message_id, user_id) DO NOTHING",
                params![message.0, user.0, Utc::now()],
            )?;

            let read_at: DateTime<Utc> = tx.query_row(
                "SELECT read_at FROM message_receipts WHERE message_id = ?1 AND user_id = ?2",
                params![message.0, user.0],
                |row| row.get(0),
            )?;
            tx.commit()?;

            let receipt = ReceiptProjection {
                message_id: message,
                user_id: user,
                read_at,
            };
            Ok((receipt, inserted == 1))
        })
        .await
    }

    async fn list_messages(
        &self,
        conversation: ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<MessageProjection>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "{MESSAGE_SELECT} WHERE m.conversation_id = ?1 ORDER BY m.id DESC LIMIT ?2"
            ))?;
            let mut messages = stmt
                .query_map(params![conversation.0, limit], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }

    async fn list_conversations(&self, user: UserId) -> StoreResult<Vec<ConversationSummary>> {
        self.with_conn(move |conn| {
            let ids = {
                let mut stmt = conn.prepare_cached(
                    "SELECT c.id
                     FROM conversations c
                     JOIN conversation_members cm ON cm.conversation_id = c.id
                     WHERE cm.user_id = ?1
                     ORDER BY c.created_at DESC, c.id DESC",
                )?;
                let ids = stmt
                    .query_map(params![user.0], |row| row.get::<_, i64>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            };

            ids.into_iter()
                .map(|id| load_conversation(conn, ConversationId(id)))
                .collect()
        })
        .await
    }

    async fn create_conversation(
        &self,
        owner: UserId,
        participants: &[UserId],
        title: Option<&str>,
    ) -> StoreResult<ConversationSummary> {
        let mut requested: Vec<UserId> = participants.to_vec();
        requested.push(owner);
        requested.sort();
        requested.dedup();
        let title = title.map(str::to_string);

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let mut members = Vec::with_capacity(requested.len());
            for id in requested {
                let known = tx
                    .query_row("SELECT 1 FROM users WHERE id = ?1", params![id.0], |_| Ok(()))
                    .optional()?;
                if known.is_some() {
                    members.push(id);
                }
            }

            if members.len() < 2 {
                return Err(StoreError::Invalid(
                    "a conversation needs at least one other participant".to_string(),
                ));
            }

            tx.execute(
                "INSERT INTO conversations (title, is_group, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![title, members.len() > 2, owner.0, Utc::now()],
            )?;
            let id = ConversationId(tx.last_insert_rowid());

            for member in &members {
                tx.execute(
                    "INSERT INTO conversation_members (conversation_id, user_id) VALUES (?1, ?2)",
                    params![id.0, member.0],
                )?;
            }

            let summary = load_conversation(&tx, id)?;
            tx.commit()?;
            Ok(summary)
        })
        .await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}
