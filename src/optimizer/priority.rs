use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::optimizer::model::rebalance_action;
use crate::optimizer::types::{PriorityAction, Urgency};

/// Pending optimizations ordered by priority, highest first.
///
/// Entries with equal priority keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct PriorityQueue {
    entries: Vec<PriorityAction>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: PriorityAction) {
        self.entries.push(action);
        // sort_by is stable
        self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn pop_front(&mut self) -> Option<PriorityAction> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn peek(&self) -> Option<&PriorityAction> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriorityAction> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rebalance request for `vault_id` with priority and deadline derived from `urgency`
pub fn build_priority_action(
    vault_id: &str,
    agent_id: &str,
    urgency: Urgency,
    now: DateTime<Utc>,
) -> PriorityAction {
    let id = Uuid::new_v4();
    PriorityAction {
        id: format!("priority_{id}"),
        agent_id: agent_id.to_string(),
        action: rebalance_action(format!("rebalance_{id}")),
        priority: urgency.priority(),
        urgency,
        deadline: now + Duration::hours(urgency.deadline_hours()),
        target_vault: vault_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::types::ActionKind;

    #[test]
    fn test_orders_by_priority_then_insertion() {
        let now = Utc::now();
        let mut queue = PriorityQueue::new();
        queue.push(build_priority_action("low", "system", Urgency::Low, now));
        queue.push(build_priority_action("medium_a", "system", Urgency::Medium, now));
        queue.push(build_priority_action("critical", "system", Urgency::Critical, now));
        queue.push(build_priority_action("medium_b", "system", Urgency::Medium, now));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop_front())
            .map(|p| p.target_vault)
            .collect();
        assert_eq!(order, vec!["critical", "medium_a", "medium_b", "low"]);
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_deadline_and_action() {
        let now = Utc::now();
        let high = build_priority_action("v", "system", Urgency::High, now);

        assert_eq!(high.priority, 80);
        assert_eq!(high.deadline - now, Duration::hours(6));
        assert!(matches!(high.action.kind, ActionKind::Rebalance { .. }));
        assert!(high.action.id.starts_with("rebalance_"));

        let low = build_priority_action("v", "system", Urgency::Low, now);
        assert_eq!(low.deadline - now, Duration::hours(24));
    }
}
