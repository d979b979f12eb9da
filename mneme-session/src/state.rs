//! Per-session state owned by the session actor.

use std::collections::HashSet;

use mneme_core::access_log::AccessLog;
use mneme_core::config::MnemeConfig;
use mneme_core::pending::PendingMemories;
use mneme_core::taxonomy::ContextKey;
use mneme_core::working_context::WorkingContext;

/// Everything a session remembers in-process.
///
/// Only the actor task touches this, so nothing here is synchronised.
#[derive(Debug)]
pub struct SessionState {
    /// Current understanding of the session.
    pub context: WorkingContext,
    /// Recent reads, writes and queries.
    pub access_log: AccessLog,
    /// Candidates waiting for promotion.
    pub pending: PendingMemories,
    /// `(key, rendered value)` pairs already promoted from the working
    /// context. A pair is promoted at most once per session.
    pub promoted_context: HashSet<(ContextKey, String)>,
}

impl SessionState {
    /// Fresh state sized from `config`.
    #[must_use]
    pub fn new(config: &MnemeConfig) -> Self {
        Self {
            context: WorkingContext::new(config.working_context.token_budget),
            access_log: AccessLog::new(config.access_log.max_entries),
            pending: PendingMemories::new(config.pending.max_items, config.pending.max_agent_decisions)
                .with_default_importance(config.pending.default_importance),
            promoted_context: HashSet::new(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(&MnemeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mneme_core::pending::PendingItem;
    use mneme_core::taxonomy::MemoryType;

    #[test]
    fn sized_from_config() {
        let mut config = MnemeConfig::default();
        config.access_log.max_entries = 7;
        config.pending.max_items = 3;
        let state = SessionState::new(&config);
        assert_eq!(state.access_log.max_entries(), 7);
        assert_eq!(state.pending.max_items(), 3);
        assert!(state.context.is_empty());
        assert!(state.promoted_context.is_empty());
    }

    #[test]
    fn unscored_items_use_configured_importance() {
        let mut config = MnemeConfig::default();
        config.pending.default_importance = 0.9;
        config.validate().expect("valid config");
        let mut state = SessionState::new(&config);

        let item = PendingItem::new("deploys go through fly.io", MemoryType::Fact);
        let id = item.id;
        state.pending.add_implicit(item);
        assert_eq!(state.pending.get(id).map(|i| i.importance_score), Some(0.9));
    }
}
