//! Automatic-verification platform checkers
//!
//! Automatic-mode tasks name a platform (discord, twitter, github, ...);
//! the engine resolves the matching checker from the registry and asks it to
//! judge the submitted proof. A checker returns `Ok(false)` for an ordinary
//! negative result and reserves errors for transport or availability
//! failures, which the engine surfaces as retryable instead of recording a
//! failed attempt.

use dashmap::DashMap;
use std::sync::Arc;

use crate::db::schemas::UserDoc;
use crate::types::Result;

/// Pass/fail judgment for an automatic-mode task
#[async_trait::async_trait]
pub trait PlatformChecker: Send + Sync {
    /// Judge the proof. Must not error on an ordinary negative result.
    async fn verify(&self, user: &UserDoc, proof: &str) -> Result<bool>;
}

/// Concurrent registry of checkers keyed by platform name
#[derive(Default)]
pub struct CheckerRegistry {
    checkers: DashMap<String, Arc<dyn PlatformChecker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a checker for a platform, replacing any existing one
    pub fn register(&self, platform: impl Into<String>, checker: Arc<dyn PlatformChecker>) {
        self.checkers.insert(platform.into(), checker);
    }

    /// Resolve a checker by platform name
    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformChecker>> {
        self.checkers.get(platform).map(|entry| entry.value().clone())
    }

    pub fn platforms(&self) -> Vec<String> {
        self.checkers.iter().map(|e| e.key().clone()).collect()
    }
}

/// Checker with a fixed verdict, for tests and wiring smoke checks
pub struct StaticChecker {
    verdict: bool,
}

impl StaticChecker {
    pub fn passing() -> Self {
        Self { verdict: true }
    }

    pub fn failing() -> Self {
        Self { verdict: false }
    }
}

#[async_trait::async_trait]
impl PlatformChecker for StaticChecker {
    async fn verify(&self, _user: &UserDoc, _proof: &str) -> Result<bool> {
        Ok(self.verdict)
    }
}
