//! Closed taxonomies — memory types, confidence levels, context keys.
//!
//! Everything here is a fixed enum. Unknown names are rejected when parsed
//! from strings (the deserialization boundary), never deep in business logic.
//!
//! ```text
//! knowledge   fact · assumption · hypothesis · discovery · risk · unknown · lesson_learned
//! decision    decision · architectural_decision · implementation_decision · alternative · trade_off
//! convention  convention · coding_standard · architectural_convention · agent_rule · process_convention
//! error       error · bug · failure · incident · root_cause
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MemoryError;

// ---------------------------------------------------------------------------
// Memory types
// ---------------------------------------------------------------------------

/// The category a [`MemoryType`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// Facts and beliefs about the project or the world.
    Knowledge,
    /// Choices that were made and the options around them.
    Decision,
    /// Rules and standards to follow.
    Convention,
    /// Things that went wrong.
    Error,
}

impl MemoryCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 4] = [Self::Knowledge, Self::Decision, Self::Convention, Self::Error];

    /// The memory types that belong to this category.
    #[must_use]
    pub fn types(self) -> impl Iterator<Item = MemoryType> {
        MemoryType::ALL.into_iter().filter(move |t| t.category() == self)
    }
}

/// Long-term memory type. Fixed 22-variant taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Verified piece of knowledge.
    Fact,
    /// Believed but unverified.
    Assumption,
    /// Candidate explanation under test.
    Hypothesis,
    /// Something found while exploring.
    Discovery,
    /// Known hazard.
    Risk,
    /// Open question.
    Unknown,
    /// Lesson distilled from experience.
    LessonLearned,
    /// Generic decision.
    Decision,
    /// Decision about system structure.
    ArchitecturalDecision,
    /// Decision about how something is built.
    ImplementationDecision,
    /// Option that was considered.
    Alternative,
    /// Explicit trade-off.
    TradeOff,
    /// Generic convention.
    Convention,
    /// Coding standard.
    CodingStandard,
    /// Structural convention.
    ArchitecturalConvention,
    /// Rule the agent must follow.
    AgentRule,
    /// Workflow convention.
    ProcessConvention,
    /// Generic error.
    Error,
    /// Defect in code.
    Bug,
    /// Failed operation.
    Failure,
    /// Operational incident.
    Incident,
    /// Root cause of an error.
    RootCause,
}

impl MemoryType {
    /// All 22 memory types.
    pub const ALL: [Self; 22] = [
        Self::Fact,
        Self::Assumption,
        Self::Hypothesis,
        Self::Discovery,
        Self::Risk,
        Self::Unknown,
        Self::LessonLearned,
        Self::Decision,
        Self::ArchitecturalDecision,
        Self::ImplementationDecision,
        Self::Alternative,
        Self::TradeOff,
        Self::Convention,
        Self::CodingStandard,
        Self::ArchitecturalConvention,
        Self::AgentRule,
        Self::ProcessConvention,
        Self::Error,
        Self::Bug,
        Self::Failure,
        Self::Incident,
        Self::RootCause,
    ];

    /// Which category this type belongs to.
    #[must_use]
    pub fn category(self) -> MemoryCategory {
        match self {
            Self::Fact
            | Self::Assumption
            | Self::Hypothesis
            | Self::Discovery
            | Self::Risk
            | Self::Unknown
            | Self::LessonLearned => MemoryCategory::Knowledge,
            Self::Decision
            | Self::ArchitecturalDecision
            | Self::ImplementationDecision
            | Self::Alternative
            | Self::TradeOff => MemoryCategory::Decision,
            Self::Convention
            | Self::CodingStandard
            | Self::ArchitecturalConvention
            | Self::AgentRule
            | Self::ProcessConvention => MemoryCategory::Convention,
            Self::Error | Self::Bug | Self::Failure | Self::Incident | Self::RootCause => {
                MemoryCategory::Error
            }
        }
    }

    /// Knowledge-category predicate.
    #[must_use]
    pub fn is_knowledge(self) -> bool {
        self.category() == MemoryCategory::Knowledge
    }

    /// Decision-category predicate.
    #[must_use]
    pub fn is_decision(self) -> bool {
        self.category() == MemoryCategory::Decision
    }

    /// Convention-category predicate.
    #[must_use]
    pub fn is_convention(self) -> bool {
        self.category() == MemoryCategory::Convention
    }

    /// Error-category predicate.
    #[must_use]
    pub fn is_error(self) -> bool {
        self.category() == MemoryCategory::Error
    }

    /// Snake-case name, identical to the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Assumption => "assumption",
            Self::Hypothesis => "hypothesis",
            Self::Discovery => "discovery",
            Self::Risk => "risk",
            Self::Unknown => "unknown",
            Self::LessonLearned => "lesson_learned",
            Self::Decision => "decision",
            Self::ArchitecturalDecision => "architectural_decision",
            Self::ImplementationDecision => "implementation_decision",
            Self::Alternative => "alternative",
            Self::TradeOff => "trade_off",
            Self::Convention => "convention",
            Self::CodingStandard => "coding_standard",
            Self::ArchitecturalConvention => "architectural_convention",
            Self::AgentRule => "agent_rule",
            Self::ProcessConvention => "process_convention",
            Self::Error => "error",
            Self::Bug => "bug",
            Self::Failure => "failure",
            Self::Incident => "incident",
            Self::RootCause => "root_cause",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MemoryError::InvalidMemoryType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Confidence
// ---------------------------------------------------------------------------

/// Coarse confidence bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    /// Score ≥ 0.8.
    High,
    /// Score ≥ 0.5.
    Medium,
    /// Anything lower.
    Low,
}

impl ConfidenceLevel {
    /// Bucket a float confidence. Lossy: `from_score(level.score()) == level`
    /// holds, the reverse does not.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Representative float for this level.
    #[must_use]
    pub fn score(self) -> f32 {
        match self {
            Self::High => 0.9,
            Self::Medium => 0.6,
            Self::Low => 0.3,
        }
    }
}

// ---------------------------------------------------------------------------
// Working-context keys and provenance
// ---------------------------------------------------------------------------

/// Registered working-context key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKey {
    /// File the agent is currently focused on.
    ActiveFile,
    /// Root directory of the project.
    ProjectRoot,
    /// Main programming language.
    PrimaryLanguage,
    /// Framework in use.
    Framework,
    /// What the agent is working on.
    CurrentTask,
    /// What the user appears to want.
    UserIntent,
    /// Patterns noticed in the codebase.
    DiscoveredPatterns,
    /// Errors currently being dealt with.
    ActiveErrors,
    /// Questions awaiting answers.
    PendingQuestions,
    /// Known relationships between files.
    FileRelationships,
    /// Rolling summary of the conversation.
    ConversationSummary,
}

impl ContextKey {
    /// All registered keys.
    pub const ALL: [Self; 11] = [
        Self::ActiveFile,
        Self::ProjectRoot,
        Self::PrimaryLanguage,
        Self::Framework,
        Self::CurrentTask,
        Self::UserIntent,
        Self::DiscoveredPatterns,
        Self::ActiveErrors,
        Self::PendingQuestions,
        Self::FileRelationships,
        Self::ConversationSummary,
    ];

    /// Snake-case name, identical to the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActiveFile => "active_file",
            Self::ProjectRoot => "project_root",
            Self::PrimaryLanguage => "primary_language",
            Self::Framework => "framework",
            Self::CurrentTask => "current_task",
            Self::UserIntent => "user_intent",
            Self::DiscoveredPatterns => "discovered_patterns",
            Self::ActiveErrors => "active_errors",
            Self::PendingQuestions => "pending_questions",
            Self::FileRelationships => "file_relationships",
            Self::ConversationSummary => "conversation_summary",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKey {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MemoryError::InvalidContextKey(s.to_string()))
    }
}

/// Where a working-context value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    /// Derived by the agent from indirect evidence.
    Inferred,
    /// Stated directly by the user.
    #[default]
    Explicit,
    /// Reported by a tool.
    Tool,
}

/// Provenance of a staged or persisted memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Said by the user.
    User,
    /// Produced by the agent.
    #[default]
    Agent,
    /// Produced by a tool.
    Tool,
    /// Read from an external document.
    ExternalDocument,
}

impl SourceType {
    /// Snake-case name, identical to the serialized form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::Tool => "tool",
            Self::ExternalDocument => "external_document",
        }
    }
}

impl FromStr for SourceType {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "tool" => Ok(Self::Tool),
            "external_document" => Ok(Self::ExternalDocument),
            other => Err(MemoryError::Serialization(format!("unknown source type: {other}"))),
        }
    }
}

/// Who proposed a staged memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedBy {
    /// Picked up from session activity.
    Implicit,
    /// Explicitly requested by the agent.
    Agent,
}

/// Suggested long-term type for a working-context value, given its key and
/// provenance. `None` means the value is ephemeral.
#[must_use]
pub fn infer_memory_type(key: ContextKey, source: ContextSource) -> Option<MemoryType> {
    match (key, source) {
        (
            ContextKey::Framework
            | ContextKey::PrimaryLanguage
            | ContextKey::ProjectRoot
            | ContextKey::FileRelationships,
            ContextSource::Tool,
        ) => Some(MemoryType::Fact),
        (ContextKey::UserIntent, ContextSource::Inferred) => Some(MemoryType::Assumption),
        (ContextKey::DiscoveredPatterns, _) => Some(MemoryType::Discovery),
        (ContextKey::PendingQuestions, _) => Some(MemoryType::Unknown),
        (ContextKey::ActiveErrors, _) => None,
        _ => None,
    }
}
