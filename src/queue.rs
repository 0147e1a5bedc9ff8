//! FIFO task queue carrying asset ids from ingestion to processing workers.
//!
//! [`SqliteQueue`] persists items in the `task_queue` table, keyed by an
//! autoincrement sequence so that pop order equals push order. Several
//! logical queues can share the table; each is selected by name.
//! [`MemoryQueue`] is the in-process variant used by tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append an item. Safe for concurrent producers.
    async fn push(&self, item: &str) -> Result<()>;

    /// Remove and return the oldest item, if any. Used by workers.
    async fn pop(&self) -> Result<Option<String>>;

    async fn len(&self) -> Result<u64>;
}

pub struct SqliteQueue {
    pool: SqlitePool,
    name: String,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool, name: &str) -> Self {
        Self {
            pool,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl TaskQueue for SqliteQueue {
    async fn push(&self, item: &str) -> Result<()> {
        sqlx::query("INSERT INTO task_queue (queue, item, enqueued_at) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(item)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.pool)
            .await
            .with_context(|| format!("push onto queue {}", self.name))?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let head: Option<(i64, String)> = sqlx::query_as(
            "SELECT seq, item FROM task_queue WHERE queue = ? ORDER BY seq ASC LIMIT 1",
        )
        .bind(&self.name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((seq, item)) = head else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query("DELETE FROM task_queue WHERE seq = ?")
            .bind(seq)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(item))
    }

    async fn len(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_queue WHERE queue = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of queued items, oldest first.
    pub fn items(&self) -> Vec<String> {
        self.items.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, item: &str) -> Result<()> {
        self.items.lock().unwrap().push_back(item.to_string());
        Ok(())
    }

    async fn pop(&self) -> Result<Option<String>> {
        Ok(self.items.lock().unwrap().pop_front())
    }

    async fn len(&self) -> Result<u64> {
        Ok(self.items.lock().unwrap().len() as u64)
    }
}
