//! Append-only learned-pattern records.
//!
//! External collaborators observe runs and distil patterns and retry
//! strategies; the core only persists what they hand over. Records are
//! never mutated or removed once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;

/// A learned pattern: something that worked (or didn't) in a past run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub name: String,
    pub description: String,
    pub learned_at: DateTime<Utc>,
    /// Free-form context supplied by the collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl PatternRecord {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            learned_at: Utc::now(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// A registered strategy: a trigger condition and the action to take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub name: String,
    pub trigger: String,
    pub action: String,
    pub registered_at: DateTime<Utc>,
}

impl StrategyRecord {
    pub fn new(name: &str, trigger: &str, action: &str) -> Self {
        Self {
            name: name.to_string(),
            trigger: trigger.to_string(),
            action: action.to_string(),
            registered_at: Utc::now(),
        }
    }
}

/// Append a learned pattern to the document.
pub fn learn_pattern(doc: &mut Document, record: PatternRecord) {
    doc.log(
        "knowledge",
        "pattern_learned",
        &format!("pattern '{}' recorded", record.name),
    );
    doc.patterns.push(record);
}

/// Append a registered strategy to the document.
pub fn register_strategy(doc: &mut Document, record: StrategyRecord) {
    doc.log(
        "knowledge",
        "strategy_registered",
        &format!("strategy '{}' registered", record.name),
    );
    doc.strategies.push(record);
}
