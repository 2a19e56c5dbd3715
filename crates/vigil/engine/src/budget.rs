//! Session budget accounting
//!
//! Usage only ever grows. Wall-clock time accrues only while the session is
//! actively reasoning or executing, so time parked in AwaitingApproval does
//! not eat the budget.

use crate::config::BudgetConfig;
use std::time::Duration;
use tokio::time::Instant;
use vigil_types::{BudgetLimit, BudgetUsage};

/// Tokens attributed to a tool result of `chars` characters
pub fn estimate_tokens(chars: usize) -> u64 {
    (chars as u64).div_ceil(4)
}

#[derive(Debug, Clone)]
pub struct BudgetTracker {
    limits: BudgetConfig,
    usage: BudgetUsage,
    extra_calls: u32,
    accumulated: Duration,
    active_since: Option<Instant>,
}

impl BudgetTracker {
    pub fn new(limits: BudgetConfig) -> Self {
        Self {
            limits,
            usage: BudgetUsage::default(),
            extra_calls: 0,
            accumulated: Duration::ZERO,
            active_since: None,
        }
    }

    /// Start (or keep) the wall clock running
    pub fn resume(&mut self) {
        if self.active_since.is_none() {
            self.active_since = Some(Instant::now());
        }
    }

    /// Stop the wall clock, keeping what has accrued
    pub fn pause(&mut self) {
        if let Some(since) = self.active_since.take() {
            self.accumulated += since.elapsed();
        }
        self.sync_elapsed();
    }

    pub fn elapsed(&self) -> Duration {
        self.accumulated + self.active_since.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn sync_elapsed(&mut self) {
        let ms = self.elapsed().as_millis() as u64;
        self.usage.elapsed_ms = self.usage.elapsed_ms.max(ms);
    }

    /// Account one tool call whose result serialized to `result_chars`
    pub fn record_call(&mut self, result_chars: usize) {
        self.usage.tool_calls += 1;
        self.usage.tokens += estimate_tokens(result_chars);
        self.usage.cost_usd = self
            .usage
            .cost_usd
            .max(self.usage.tokens as f64 / 1_000.0 * self.limits.cost_per_1k_tokens_usd);
        self.sync_elapsed();
    }

    /// Account tokens spent outside tool calls, e.g. hypothesis generation
    pub fn record_tokens(&mut self, tokens: u64) {
        self.usage.tokens += tokens;
        self.usage.cost_usd = self
            .usage
            .cost_usd
            .max(self.usage.tokens as f64 / 1_000.0 * self.limits.cost_per_1k_tokens_usd);
        self.sync_elapsed();
    }

    /// Grant more tool calls after a deeper-evidence request
    pub fn extend_calls(&mut self, calls: u32) {
        self.extra_calls += calls;
    }

    pub fn max_tool_calls(&self) -> u32 {
        self.limits.max_tool_calls + self.extra_calls
    }

    pub fn remaining_calls(&self) -> u32 {
        self.max_tool_calls().saturating_sub(self.usage.tool_calls)
    }

    pub fn remaining_wall_clock(&self) -> Duration {
        self.limits.wall_clock().saturating_sub(self.elapsed())
    }

    /// First ceiling reached, if any.
    ///
    /// Reaching a ceiling counts: the 15th of 15 calls exhausts the budget.
    pub fn exceeded(&mut self) -> Option<BudgetLimit> {
        self.sync_elapsed();
        let usage = &self.usage;
        if usage.tool_calls >= self.max_tool_calls() {
            Some(BudgetLimit::ToolCalls)
        } else if usage.tokens >= self.limits.max_tokens {
            Some(BudgetLimit::Tokens)
        } else if self.elapsed() >= self.limits.wall_clock() {
            Some(BudgetLimit::WallClock)
        } else if usage.cost_usd >= self.limits.max_cost_usd {
            Some(BudgetLimit::Cost)
        } else {
            None
        }
    }

    pub fn usage(&self) -> BudgetUsage {
        let mut usage = self.usage;
        usage.elapsed_ms = usage.elapsed_ms.max(self.elapsed().as_millis() as u64);
        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(8), 2);
        assert_eq!(estimate_tokens(9), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifteenth_call_exhausts() {
        let mut budget = BudgetTracker::new(BudgetConfig::default());
        budget.resume();
        for _ in 0..14 {
            budget.record_call(40);
            assert_eq!(budget.exceeded(), None);
        }
        budget.record_call(40);
        assert_eq!(budget.exceeded(), Some(BudgetLimit::ToolCalls));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extension_reopens_calls() {
        let mut budget = BudgetTracker::new(BudgetConfig {
            max_tool_calls: 2,
            ..BudgetConfig::default()
        });
        budget.resume();
        budget.record_call(0);
        budget.record_call(0);
        assert_eq!(budget.exceeded(), Some(BudgetLimit::ToolCalls));
        budget.extend_calls(5);
        assert_eq!(budget.exceeded(), None);
        assert_eq!(budget.remaining_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_and_cost_ceilings() {
        let mut budget = BudgetTracker::new(BudgetConfig {
            max_tokens: 100,
            ..BudgetConfig::default()
        });
        budget.resume();
        budget.record_call(400);
        assert_eq!(budget.exceeded(), Some(BudgetLimit::Tokens));

        let mut budget = BudgetTracker::new(BudgetConfig {
            max_cost_usd: 0.001,
            ..BudgetConfig::default()
        });
        budget.resume();
        budget.record_call(2_000);
        assert_eq!(budget.usage().tokens, 500);
        assert_eq!(budget.exceeded(), Some(BudgetLimit::Cost));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_only_runs_while_active() {
        let mut budget = BudgetTracker::new(BudgetConfig {
            max_wall_clock_secs: 10,
            ..BudgetConfig::default()
        });
        budget.resume();
        tokio::time::advance(Duration::from_secs(4)).await;
        budget.pause();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(budget.exceeded(), None);
        assert_eq!(budget.usage().elapsed_ms, 4_000);

        budget.resume();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(budget.exceeded(), Some(BudgetLimit::WallClock));
    }
}
