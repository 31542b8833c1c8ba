//! Read-only lookup interfaces for language profiles and test fixtures
//!
//! The worker owns the concrete backends (config file, redis); the judge only
//! sees this trait. Store failures are fatal to the job being graded, never
//! to the worker.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::LanguageProfile;

/// One test case of a problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: Uuid,
    pub problem_id: Uuid,
    pub input: String,
    pub output: String,
}

/// Errors from the lookup backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("language '{0}' not found")]
    LanguageNotFound(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Read-only queries the judge needs: a language profile by name and the
/// ordered test cases of a problem.
///
/// Test cases are returned in their stored order; the grading loop reports
/// the first failing test, so this order defines "first".
#[async_trait]
pub trait JudgeStore: Send + Sync {
    async fn language(&self, name: &str) -> Result<LanguageProfile, StoreError>;

    async fn test_cases(&self, problem_id: Uuid) -> Result<Vec<TestCase>, StoreError>;
}

/// In-memory store for tests and embedded use
#[derive(Debug, Default)]
pub struct MemoryStore {
    languages: HashMap<String, LanguageProfile>,
    test_cases: HashMap<Uuid, Vec<TestCase>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a language profile under a name
    pub fn add_language(&mut self, name: impl Into<String>, profile: LanguageProfile) {
        self.languages.insert(name.into(), profile);
    }

    /// Register the test cases of a problem, in grading order
    pub fn add_test_cases(&mut self, problem_id: Uuid, cases: Vec<TestCase>) {
        self.test_cases.insert(problem_id, cases);
    }
}

#[async_trait]
impl JudgeStore for MemoryStore {
    async fn language(&self, name: &str) -> Result<LanguageProfile, StoreError> {
        self.languages
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::LanguageNotFound(name.to_string()))
    }

    async fn test_cases(&self, problem_id: Uuid) -> Result<Vec<TestCase>, StoreError> {
        Ok(self.test_cases.get(&problem_id).cloned().unwrap_or_default())
    }
}
