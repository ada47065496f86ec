//! Approval rules: matching conditions, the approver chain, and the
//! selection policy that binds a rule to an expense.

use crate::error::ApprovalError;
use crate::expense::{Category, TimeStamp};
use chrono::Utc;
use std::collections::HashSet;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    #[n(0)]
    Sequential,
    #[n(1)]
    Parallel,
    #[n(2)]
    Percentage,
}

/// One position in a rule's approver chain. `order` drives sequencing;
/// stored list order is never trusted.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApproverSlot {
    #[n(0)]
    pub user: String,
    #[n(1)]
    pub order: u32,
    #[n(2)]
    pub is_required: bool,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct RuleConditions {
    /// Minor units in the company base currency. The rule only matches
    /// expenses at or above this amount.
    #[n(0)]
    pub amount_threshold: u64,
    /// Empty means the rule matches every category.
    #[n(1)]
    pub categories: Vec<Category>,
    // declared in the data model, unused in matching
    #[n(2)]
    pub departments: Vec<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ApprovalFlow {
    #[n(0)]
    pub flow_type: FlowType,
    #[n(1)]
    pub approvers: Vec<ApproverSlot>,
    #[n(2)]
    pub percentage_required: u8,
    #[n(3)]
    pub is_manager_approver: bool,
    #[n(4)]
    pub manager_approval_required: bool,
}

/// Declared for rule authoring parity; no scheduler in this crate ever
/// triggers an escalation.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct EscalationRules {
    #[n(0)]
    pub auto_escalate_after_hours: u32,
    #[n(1)]
    pub escalation_approvers: Vec<String>,
}

impl Default for EscalationRules {
    fn default() -> Self {
        Self {
            auto_escalate_after_hours: 72,
            escalation_approvers: vec![],
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct ApprovalRule {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub company: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub description: Option<String>,
    #[n(4)]
    pub is_active: bool,
    /// Tie-break for selection: among equal thresholds the newest rule wins.
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub conditions: RuleConditions,
    #[n(7)]
    pub flow: ApprovalFlow,
    #[n(8)]
    pub escalation: EscalationRules,
}

/// What the selector needs to know about an expense.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub amount_in_base: u64,
    pub category: Category,
}

impl ApprovalRule {
    pub fn applies_to(&self, classification: &Classification) -> bool {
        if !self.is_active {
            return false;
        }
        if classification.amount_in_base < self.conditions.amount_threshold {
            return false;
        }
        if !self.conditions.categories.is_empty()
            && !self.conditions.categories.contains(&classification.category)
        {
            return false;
        }
        true
    }

    /// Next approver in the chain after `completed`, or `None` once the
    /// chain is exhausted. A `completed` id that is not in the chain also
    /// resolves to `None`. Only sequential flows resolve; parallel and
    /// percentage flows are data-modeled but refuse resolution outright.
    pub fn next_approver(&self, completed: Option<&str>) -> Result<Option<String>, ApprovalError> {
        if self.flow.flow_type != FlowType::Sequential {
            return Err(ApprovalError::UnsupportedFlow(self.flow.flow_type));
        }

        // stable sort: equal orders keep their stored list position
        let mut chain: Vec<&ApproverSlot> = self.flow.approvers.iter().collect();
        chain.sort_by_key(|slot| slot.order);

        match completed {
            None => Ok(chain.first().map(|slot| slot.user.clone())),
            Some(done) => match chain.iter().position(|slot| slot.user == done) {
                Some(i) if i + 1 < chain.len() => Ok(Some(chain[i + 1].user.clone())),
                _ => Ok(None),
            },
        }
    }
}

/// Pick the rule governing an expense: the active rule with the highest
/// amount threshold (ties broken by most recent creation), tested against
/// the classification. If that one rule does not apply, no rule does --
/// selection deliberately does not cascade to lower tiers.
pub fn select_rule<'a>(
    rules: &'a [ApprovalRule],
    classification: &Classification,
) -> Option<&'a ApprovalRule> {
    let candidate = rules.iter().filter(|r| r.is_active).max_by(|a, b| {
        a.conditions
            .amount_threshold
            .cmp(&b.conditions.amount_threshold)
            .then_with(|| a.created_at.cmp(&b.created_at))
    })?;

    candidate.applies_to(classification).then_some(candidate)
}

/// Rule fields as supplied by an admin; validated structurally here and
/// referentially (approver lookups) by the service layer.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub name: String,
    pub description: Option<String>,
    pub conditions: RuleConditions,
    pub flow: ApprovalFlow,
    pub escalation: EscalationRules,
}

impl NewRule {
    pub fn validate(&self) -> Result<(), ApprovalError> {
        let name_len = self.name.trim().chars().count();
        if !(3..=100).contains(&name_len) {
            return Err(ApprovalError::Validation(
                "rule name must be 3 to 100 characters".into(),
            ));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > 500 {
                return Err(ApprovalError::Validation(
                    "rule description cannot exceed 500 characters".into(),
                ));
            }
        }
        if self.flow.approvers.is_empty() {
            return Err(ApprovalError::Validation(
                "approval flow needs at least one approver".into(),
            ));
        }
        let mut seen = HashSet::new();
        for slot in &self.flow.approvers {
            if slot.order == 0 {
                return Err(ApprovalError::Validation(
                    "approver order must be at least 1".into(),
                ));
            }
            // duplicate orders would make sequential resolution ambiguous
            if !seen.insert(slot.order) {
                return Err(ApprovalError::Validation(format!(
                    "duplicate approver order {}",
                    slot.order
                )));
            }
        }
        if self.flow.percentage_required > 100 {
            return Err(ApprovalError::Validation(
                "percentage required cannot exceed 100".into(),
            ));
        }
        if self.escalation.auto_escalate_after_hours == 0 {
            return Err(ApprovalError::Validation(
                "auto-escalation delay must be at least one hour".into(),
            ));
        }
        Ok(())
    }
}
