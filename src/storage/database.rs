//! SQLite persistence for documents and conversation messages

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{ConversationStore, DocumentRegistry};
use crate::types::{Document, DocumentStatus, Message, MessageRole};

/// SQLite-backed store for the document registry and message threads
pub struct ChatDb {
    conn: Arc<Mutex<Connection>>,
}

impl ChatDb {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL keeps reads cheap while the ingestion worker writes status updates
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            -- Document registry
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                storage_path TEXT,
                content_hash TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                page_count INTEGER,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);
            CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status);
            CREATE INDEX IF NOT EXISTS idx_documents_owner_hash ON documents(owner_id, content_hash);

            -- Conversation threads, one per document
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_messages_document ON messages(document_id, created_at);
        "#,
        )
        .map_err(|e| Error::Database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Database migrations complete");
        Ok(())
    }

    // ==================== Document Operations ====================

    fn insert_document(&self, document: &Document) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (
                id, owner_id, filename, storage_path, content_hash,
                file_size, page_count, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                document.id.to_string(),
                document.owner_id,
                document.filename,
                document.storage_path,
                document.content_hash,
                document.file_size as i64,
                document.page_count.map(|p| p as i64),
                document.status.as_str(),
                document.created_at.to_rfc3339(),
                document.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to insert document: {}", e)))?;

        Ok(())
    }

    fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents WHERE id = ?1",
                DOCUMENT_COLUMNS
            ))
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let document = stmt
            .query_row(params![id.to_string()], row_to_document)
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get document: {}", e)))?;

        Ok(document)
    }

    fn get_document_for_owner(&self, id: Uuid, owner_id: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents WHERE id = ?1 AND owner_id = ?2",
                DOCUMENT_COLUMNS
            ))
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let document = stmt
            .query_row(params![id.to_string(), owner_id], row_to_document)
            .optional()
            .map_err(|e| Error::Database(format!("Failed to get document: {}", e)))?;

        Ok(document)
    }

    fn list_documents_for_owner(&self, owner_id: &str) -> Result<Vec<Document>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents WHERE owner_id = ?1 ORDER BY created_at DESC",
                DOCUMENT_COLUMNS
            ))
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let documents = stmt
            .query_map(params![owner_id], row_to_document)
            .map_err(|e| Error::Database(format!("Failed to list documents: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(documents)
    }

    fn find_document_by_hash(
        &self,
        owner_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents WHERE owner_id = ?1 AND content_hash = ?2 \
                 ORDER BY created_at DESC LIMIT 1",
                DOCUMENT_COLUMNS
            ))
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let document = stmt
            .query_row(params![owner_id, content_hash], row_to_document)
            .optional()
            .map_err(|e| Error::Database(format!("Failed to find document: {}", e)))?;

        Ok(document)
    }

    fn update_document_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        let conn = self.conn.lock();

        let updated = conn
            .execute(
                "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), status.as_str(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::Database(format!("Failed to update status: {}", e)))?;

        if updated == 0 {
            return Err(Error::NotFound(format!("document {}", id)));
        }
        Ok(())
    }

    // ==================== Message Operations ====================

    fn insert_message(&self, message: &Message) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO messages (id, document_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                message.id.to_string(),
                message.document_id.to_string(),
                message.role.as_str(),
                message.text,
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to insert message: {}", e)))?;

        Ok(())
    }

    fn recent_messages(&self, document_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        let conn = self.conn.lock();

        // rowid breaks ties for messages created within the same instant
        let mut stmt = conn
            .prepare(
                "SELECT id, document_id, role, content, created_at FROM messages \
                 WHERE document_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let mut messages: Vec<Message> = stmt
            .query_map(params![document_id.to_string(), limit as i64], row_to_message)
            .map_err(|e| Error::Database(format!("Failed to list messages: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        messages.reverse();
        Ok(messages)
    }

    fn list_messages(&self, document_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT id, document_id, role, content, created_at FROM messages \
                 WHERE document_id = ?1 ORDER BY created_at ASC, rowid ASC",
            )
            .map_err(|e| Error::Database(format!("Failed to prepare query: {}", e)))?;

        let messages = stmt
            .query_map(params![document_id.to_string()], row_to_message)
            .map_err(|e| Error::Database(format!("Failed to list messages: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(messages)
    }
}

#[async_trait]
impl DocumentRegistry for ChatDb {
    async fn create(&self, document: &Document) -> Result<()> {
        self.insert_document(document)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        self.get_document(id)
    }

    async fn get_for_owner(&self, id: Uuid, owner_id: &str) -> Result<Option<Document>> {
        self.get_document_for_owner(id, owner_id)
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Document>> {
        self.list_documents_for_owner(owner_id)
    }

    async fn find_by_hash(
        &self,
        owner_id: &str,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        self.find_document_by_hash(owner_id, content_hash)
    }

    async fn set_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        self.update_document_status(id, status)
    }
}

#[async_trait]
impl ConversationStore for ChatDb {
    async fn append(&self, message: &Message) -> Result<()> {
        self.insert_message(message)
    }

    async fn recent(&self, document_id: Uuid, limit: usize) -> Result<Vec<Message>> {
        self.recent_messages(document_id, limit)
    }

    async fn list(&self, document_id: Uuid) -> Result<Vec<Message>> {
        self.list_messages(document_id)
    }
}

const DOCUMENT_COLUMNS: &str = "id, owner_id, filename, storage_path, content_hash, \
     file_size, page_count, status, created_at, updated_at";

// Helper functions

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let id_str: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let filename: String = row.get(2)?;
    let storage_path: Option<String> = row.get(3)?;
    let content_hash: String = row.get(4)?;
    let file_size: i64 = row.get(5)?;
    let page_count: Option<i64> = row.get(6)?;
    let status_str: String = row.get(7)?;
    let created_at_str: String = row.get(8)?;
    let updated_at_str: String = row.get(9)?;

    Ok(Document {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        owner_id,
        filename,
        storage_path,
        content_hash,
        file_size: file_size as u64,
        page_count: page_count.map(|p| p as u32),
        status: DocumentStatus::parse(&status_str),
        created_at: parse_timestamp(&created_at_str),
        updated_at: parse_timestamp(&updated_at_str),
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let document_id_str: String = row.get(1)?;
    let role_str: String = row.get(2)?;
    let text: String = row.get(3)?;
    let created_at_str: String = row.get(4)?;

    Ok(Message {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::new_v4()),
        document_id: Uuid::parse_str(&document_id_str).unwrap_or_else(|_| Uuid::new_v4()),
        role: MessageRole::parse(&role_str),
        text,
        created_at: parse_timestamp(&created_at_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_document(owner: &str) -> Document {
        Document::new(owner, "report.pdf", "abc123", 2048)
    }

    #[test]
    fn test_insert_and_get_document() {
        let db = ChatDb::in_memory().unwrap();
        let doc = sample_document("user-1");

        db.insert_document(&doc).unwrap();

        let loaded = db.get_document(doc.id).unwrap().unwrap();
        assert_eq!(loaded.filename, "report.pdf");
        assert_eq!(loaded.owner_id, "user-1");
        assert_eq!(loaded.status, DocumentStatus::Pending);
    }

    #[test]
    fn test_get_for_owner_scopes_by_owner() {
        let db = ChatDb::in_memory().unwrap();
        let doc = sample_document("alice");
        db.insert_document(&doc).unwrap();

        assert!(db.get_document_for_owner(doc.id, "alice").unwrap().is_some());
        assert!(db.get_document_for_owner(doc.id, "mallory").unwrap().is_none());
    }

    #[test]
    fn test_list_for_owner_newest_first() {
        let db = ChatDb::in_memory().unwrap();

        let mut old = sample_document("alice");
        old.created_at = Utc::now() - Duration::hours(2);
        let new = sample_document("alice");
        let other = sample_document("bob");

        db.insert_document(&old).unwrap();
        db.insert_document(&new).unwrap();
        db.insert_document(&other).unwrap();

        let docs = db.list_documents_for_owner("alice").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, new.id);
        assert_eq!(docs[1].id, old.id);
    }

    #[test]
    fn test_find_by_hash() {
        let db = ChatDb::in_memory().unwrap();
        let doc = sample_document("alice");
        db.insert_document(&doc).unwrap();

        let found = db.find_document_by_hash("alice", "abc123").unwrap();
        assert_eq!(found.unwrap().id, doc.id);

        assert!(db.find_document_by_hash("bob", "abc123").unwrap().is_none());
        assert!(db.find_document_by_hash("alice", "other").unwrap().is_none());
    }

    #[test]
    fn test_status_update_round_trips() {
        let db = ChatDb::in_memory().unwrap();
        let doc = sample_document("alice");
        db.insert_document(&doc).unwrap();

        db.update_document_status(doc.id, DocumentStatus::Processing)
            .unwrap();
        assert_eq!(
            db.get_document(doc.id).unwrap().unwrap().status,
            DocumentStatus::Processing
        );

        db.update_document_status(doc.id, DocumentStatus::Success)
            .unwrap();
        assert_eq!(
            db.get_document(doc.id).unwrap().unwrap().status,
            DocumentStatus::Success
        );
    }

    #[test]
    fn test_status_update_unknown_document_fails() {
        let db = ChatDb::in_memory().unwrap();
        let err = db
            .update_document_status(Uuid::new_v4(), DocumentStatus::Failed)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_recent_returns_last_n_oldest_first() {
        let db = ChatDb::in_memory().unwrap();
        let doc = sample_document("alice");
        db.insert_document(&doc).unwrap();

        let base = Utc::now();
        for i in 0..5 {
            let mut msg = Message::new(doc.id, MessageRole::User, format!("message {}", i));
            msg.created_at = base + Duration::seconds(i);
            db.insert_message(&msg).unwrap();
        }

        let recent = db.recent_messages(doc.id, 3).unwrap();
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
    }

    #[test]
    fn test_recent_preserves_insertion_order_on_timestamp_ties() {
        let db = ChatDb::in_memory().unwrap();
        let doc = sample_document("alice");
        db.insert_document(&doc).unwrap();

        let stamp = Utc::now();
        for text in ["first", "second", "third"] {
            let mut msg = Message::new(doc.id, MessageRole::User, text);
            msg.created_at = stamp;
            db.insert_message(&msg).unwrap();
        }

        let recent = db.recent_messages(doc.id, 2).unwrap();
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["second", "third"]);
    }

    #[test]
    fn test_threads_are_isolated_per_document() {
        let db = ChatDb::in_memory().unwrap();
        let doc_a = sample_document("alice");
        let doc_b = sample_document("alice");
        db.insert_document(&doc_a).unwrap();
        db.insert_document(&doc_b).unwrap();

        db.insert_message(&Message::new(doc_a.id, MessageRole::User, "for a"))
            .unwrap();
        db.insert_message(&Message::new(doc_b.id, MessageRole::User, "for b"))
            .unwrap();

        let thread = db.list_messages(doc_a.id).unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].text, "for a");
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let doc = sample_document("alice");

        {
            let db = ChatDb::new(&path).unwrap();
            db.insert_document(&doc).unwrap();
            db.insert_message(&Message::new(doc.id, MessageRole::Assistant, "persisted"))
                .unwrap();
        }

        let db = ChatDb::new(&path).unwrap();
        assert!(db.get_document(doc.id).unwrap().is_some());
        assert_eq!(db.list_messages(doc.id).unwrap().len(), 1);
    }
}
