//! Lookup backends for the judge
//!
//! Language profiles come from the worker's TOML configuration; test cases
//! come from the broker, stored as a JSON list per problem. Both are
//! read-only for the lifetime of a job.

use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use gavel::{Config, JudgeStore, LanguageProfile, StoreError, TestCase};

pub struct WorkerStore {
    config: Arc<Config>,
    conn: ConnectionManager,
}

impl WorkerStore {
    pub fn new(config: Arc<Config>, conn: ConnectionManager) -> Self {
        Self { config, conn }
    }
}

#[async_trait]
impl JudgeStore for WorkerStore {
    async fn language(&self, name: &str) -> Result<LanguageProfile, StoreError> {
        self.config
            .languages
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::LanguageNotFound(name.to_string()))
    }

    async fn test_cases(&self, problem_id: Uuid) -> Result<Vec<TestCase>, StoreError> {
        let key = tests_key(&self.config.queue.tests_prefix, problem_id);
        let mut conn = self.conn.clone();

        // LRANGE preserves insertion order; that order defines which test is
        // reported as the first failing one
        let raw: Vec<String> = conn
            .lrange(&key, 0, -1)
            .await
            .map_err(|err| StoreError::Backend(err.to_string()))?;

        raw.iter()
            .map(|entry| {
                serde_json::from_str(entry).map_err(|err| {
                    StoreError::Backend(format!("malformed test case in {key}: {err}"))
                })
            })
            .collect()
    }
}

/// Broker list holding a problem's test cases
fn tests_key(prefix: &str, problem_id: Uuid) -> String {
    format!("{prefix}:{problem_id}")
}
