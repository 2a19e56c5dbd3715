//! Investigation lifecycle states and budget accounting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationState {
    Created,
    Observing,
    Hypothesizing,
    Investigating,
    Analyzing,
    Concluding,
    Recommending,
    AwaitingApproval,
    Executing,
    Verifying,
    Completed,
    Failed,
    Timedout,
    Cancelled,
}

impl InvestigationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvestigationState::Completed
                | InvestigationState::Failed
                | InvestigationState::Timedout
                | InvestigationState::Cancelled
        )
    }

    /// States where an in-flight mutation must be allowed to finish
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            InvestigationState::Executing | InvestigationState::Verifying
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: InvestigationState) -> bool {
        use InvestigationState::*;

        if self.is_terminal() {
            return false;
        }
        // Cancellation is accepted from every non-terminal state.
        if next == Cancelled {
            return true;
        }
        match self {
            Created => matches!(next, Observing | Failed | Timedout),
            Observing => matches!(next, Hypothesizing | Failed | Timedout),
            Hypothesizing => matches!(next, Investigating | Failed | Timedout),
            Investigating => matches!(next, Analyzing | Failed),
            Analyzing => matches!(next, Concluding | Failed),
            Concluding => matches!(next, Recommending | Completed | Failed),
            Recommending => matches!(next, AwaitingApproval | Completed | Failed),
            AwaitingApproval => {
                matches!(next, Executing | Recommending | Investigating | Completed)
            }
            Executing => matches!(next, Verifying | Failed),
            Verifying => matches!(next, Completed | Investigating | Failed),
            Completed | Failed | Timedout | Cancelled => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationState::Created => "created",
            InvestigationState::Observing => "observing",
            InvestigationState::Hypothesizing => "hypothesizing",
            InvestigationState::Investigating => "investigating",
            InvestigationState::Analyzing => "analyzing",
            InvestigationState::Concluding => "concluding",
            InvestigationState::Recommending => "recommending",
            InvestigationState::AwaitingApproval => "awaiting_approval",
            InvestigationState::Executing => "executing",
            InvestigationState::Verifying => "verifying",
            InvestigationState::Completed => "completed",
            InvestigationState::Failed => "failed",
            InvestigationState::Timedout => "timedout",
            InvestigationState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for InvestigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: InvestigationState,
    pub to: InvestigationState,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Budget ceiling that forced evidence gathering to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetLimit {
    ToolCalls,
    Tokens,
    WallClock,
    Cost,
}

impl fmt::Display for BudgetLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BudgetLimit::ToolCalls => "tool-call budget",
            BudgetLimit::Tokens => "token budget",
            BudgetLimit::WallClock => "wall-clock budget",
            BudgetLimit::Cost => "cost budget",
        };
        f.write_str(s)
    }
}

/// Budgets consumed so far; every field only ever grows
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub tool_calls: u32,
    pub tokens: u64,
    pub elapsed_ms: u64,
    pub cost_usd: f64,
}

impl BudgetUsage {
    /// True when no field of `self` is below the same field of `earlier`
    pub fn dominates(&self, earlier: &BudgetUsage) -> bool {
        self.tool_calls >= earlier.tool_calls
            && self.tokens >= earlier.tokens
            && self.elapsed_ms >= earlier.elapsed_ms
            && self.cost_usd >= earlier.cost_usd
    }
}
