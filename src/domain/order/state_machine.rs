use crate::domain::order::model::{Order, OrderStatus};
use crate::foundation::SkusError;
use chrono::{DateTime, Utc};
use log::{info, warn};

const VALID_TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Pending, OrderStatus::Paid),
    (OrderStatus::Pending, OrderStatus::Canceled),
    (OrderStatus::Paid, OrderStatus::PastDue),
    (OrderStatus::Paid, OrderStatus::Canceled),
    (OrderStatus::PastDue, OrderStatus::Paid),
    (OrderStatus::PastDue, OrderStatus::Canceled),
    // Webhook-driven reversal after a renewal lands on a canceled subscription.
    (OrderStatus::Canceled, OrderStatus::Paid),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateTransitionResult {
    pub valid: bool,
    pub from_state: OrderStatus,
    pub to_state: OrderStatus,
    pub transition_reason: Option<String>,
}

pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> StateTransitionResult {
    if from == to {
        return StateTransitionResult { valid: true, from_state: from, to_state: to, transition_reason: Some("no_op".to_string()) };
    }
    if VALID_TRANSITIONS.contains(&(from, to)) {
        return StateTransitionResult { valid: true, from_state: from, to_state: to, transition_reason: None };
    }
    StateTransitionResult { valid: false, from_state: from, to_state: to, transition_reason: Some("not_allowed".to_string()) }
}

pub fn ensure_valid_transition(from: OrderStatus, to: OrderStatus) -> Result<(), SkusError> {
    let result = validate_transition(from, to);
    if result.valid {
        Ok(())
    } else {
        Err(SkusError::InvalidStateTransition { from: from.to_string(), to: to.to_string() })
    }
}

impl Order {
    /// Moves the order to `to`, stamping `updated_at`. Same-state moves leave the order untouched.
    pub fn transition_to(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), SkusError> {
        let result = validate_transition(self.status, to);
        if !result.valid {
            warn!("rejected order status transition: order_id={} from={} to={}", self.id, self.status, to);
            return Err(SkusError::InvalidStateTransition { from: self.status.to_string(), to: to.to_string() });
        }
        if result.transition_reason.as_deref() == Some("no_op") {
            return Ok(());
        }
        info!("order status transition: order_id={} from={} to={}", self.id, self.status, to);
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}
