//! Per-connection packet budgets
//!
//! Each category has a counter that grows with every packet and decays over
//! time. A packet that would push a counter over its limit is rejected.

use crate::game::constants::limits;

/// Violations from packet budgets
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitViolation {
    #[error("{category:?} limit exceeded: {value} > {limit}")]
    Exceeded {
        category: LimitCategory,
        value: u32,
        limit: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitCategory {
    Any,
    Chat,
    Key,
    Respawn,
    Spectate,
    Su,
    Debug,
    Spam,
}

impl LimitCategory {
    const COUNT: usize = 8;

    pub fn limit(&self) -> u32 {
        match self {
            LimitCategory::Any => limits::ANY,
            LimitCategory::Chat => limits::CHAT,
            LimitCategory::Key => limits::KEY,
            LimitCategory::Respawn => limits::RESPAWN,
            LimitCategory::Spectate => limits::SPECTATE,
            LimitCategory::Su => limits::SU,
            LimitCategory::Debug => limits::DEBUG,
            LimitCategory::Spam => limits::SPAM,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Counters for one connection
#[derive(Debug, Clone, Default)]
pub struct LimitCounters {
    values: [f32; LimitCategory::COUNT],
}

impl LimitCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge one packet to `category` and to the global `Any` budget. A
    /// rejected packet charges neither counter.
    pub fn charge(&mut self, category: LimitCategory) -> Result<(), RateLimitViolation> {
        self.check(LimitCategory::Any)?;
        if category != LimitCategory::Any {
            self.check(category)?;
            self.values[category.index()] += 1.0;
        }
        self.values[LimitCategory::Any.index()] += 1.0;
        Ok(())
    }

    fn check(&self, category: LimitCategory) -> Result<(), RateLimitViolation> {
        let limit = category.limit();
        let next = self.values[category.index()] + 1.0;
        if next > limit as f32 {
            return Err(RateLimitViolation::Exceeded {
                category,
                value: next as u32,
                limit,
            });
        }
        Ok(())
    }

    /// Forgive part of every counter for `elapsed_secs` of time
    pub fn decay(&mut self, elapsed_secs: f32) {
        let categories = [
            LimitCategory::Any,
            LimitCategory::Chat,
            LimitCategory::Key,
            LimitCategory::Respawn,
            LimitCategory::Spectate,
            LimitCategory::Su,
            LimitCategory::Debug,
            LimitCategory::Spam,
        ];
        for category in categories {
            let forgiven = category.limit() as f32 * limits::DECAY_PER_SECOND * elapsed_secs;
            let value = &mut self.values[category.index()];
            *value = (*value - forgiven).max(0.0);
        }
    }

    pub fn value(&self, category: LimitCategory) -> f32 {
        self.values[category.index()]
    }

    pub fn reset(&mut self) {
        self.values = [0.0; LimitCategory::COUNT];
    }
}
