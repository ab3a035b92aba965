//! Per-category task behaviors.
//!
//! A [`TaskBehavior`] knows how to turn a [`TaskSpec`] into a prompt and how
//! to turn the model's text back into a structured value. The runner is
//! category-agnostic: it looks the behavior up in a [`BehaviorRegistry`] and
//! never inspects parameters itself.
//!
//! New task kinds are added by registering another behavior; nothing else
//! in the pipeline changes.

mod analyze;
mod extract;
mod locate;
mod synthesize;

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{TaskCategory, TaskSpec};
use crate::{Result, TalkWalkError};

pub use analyze::AnalyzeBehavior;
pub use extract::extract_json;
pub use locate::LocateBehavior;
pub use synthesize::SynthesizeBehavior;

/// Prompt rendering and response parsing for one task category.
pub trait TaskBehavior: Send + Sync {
    fn category(&self) -> TaskCategory;

    /// Build the full prompt for `spec`.
    ///
    /// Fails with [`TalkWalkError::InvalidInput`] when a required parameter
    /// is missing.
    fn render_prompt(&self, spec: &TaskSpec) -> Result<String>;

    /// Turn raw model text into the category's structured value.
    ///
    /// Fails with [`TalkWalkError::MalformedResponse`] when the text cannot
    /// be interpreted.
    fn parse(&self, spec: &TaskSpec, text: &str) -> Result<serde_json::Value>;
}

/// `TaskCategory → behavior` lookup.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    behaviors: HashMap<TaskCategory, Arc<dyn TaskBehavior>>,
}

impl BehaviorRegistry {
    /// A registry with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the locate, analyze and synthesize behaviors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocateBehavior));
        registry.register(Arc::new(AnalyzeBehavior));
        registry.register(Arc::new(SynthesizeBehavior));
        registry
    }

    /// Register (or replace) the behavior for its category.
    pub fn register(&mut self, behavior: Arc<dyn TaskBehavior>) {
        self.behaviors.insert(behavior.category(), behavior);
    }

    pub fn get(&self, category: TaskCategory) -> Result<Arc<dyn TaskBehavior>> {
        self.behaviors
            .get(&category)
            .cloned()
            .ok_or_else(|| TalkWalkError::UnknownCategory(category.to_string()))
    }

    pub fn contains(&self, category: TaskCategory) -> bool {
        self.behaviors.contains_key(&category)
    }
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut categories: Vec<_> = self.behaviors.keys().collect();
        categories.sort();
        f.debug_struct("BehaviorRegistry")
            .field("categories", &categories)
            .finish()
    }
}

/// Role, optional context and task joined the same way for every category.
pub(crate) fn compose_prompt(role: &str, context: &str, task: &str) -> String {
    let mut parts = vec![role.trim().to_string()];
    if !context.is_empty() {
        parts.push(format!("Context:\n{context}"));
    }
    parts.push(format!("Task:\n{}", task.trim()));
    parts.join("\n\n")
}

pub(crate) fn required_str<'a>(spec: &'a TaskSpec, name: &str) -> Result<&'a str> {
    spec.param_str(name)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            TalkWalkError::InvalidInput(format!(
                "{} task requires a non-empty `{name}` parameter",
                spec.category
            ))
        })
}

pub(crate) fn malformed(category: TaskCategory, reason: impl Into<String>) -> TalkWalkError {
    TalkWalkError::MalformedResponse {
        category: category.to_string(),
        reason: reason.into(),
    }
}
