//! Order state machine.
//!
//! Two independent axes: fulfillment [`OrderStatus`] and [`PaymentStatus`].
//! The only coupling is the payment gate on `Pending -> Confirmed` for online
//! orders, enforced by the aggregate.

use serde::{Deserialize, Serialize};

/// Fulfillment status of an order.
///
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered ──► ReturnRequested ──► Returned
///    │            │              │
///    └────────────┴──────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    ReturnRequested,
    Returned,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::ReturnRequested,
        OrderStatus::Returned,
    ];

    /// Returns true if the transition table has an edge `self -> target`.
    ///
    /// Self-transitions are never legal.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, target),
            (Pending, Confirmed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending | Confirmed | Processing, Cancelled)
                | (Delivered, ReturnRequested)
                | (ReturnRequested, Returned)
        )
    }

    /// Returns true if no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::ReturnRequested => "RETURN_REQUESTED",
            OrderStatus::Returned => "RETURNED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// Payment status of an order.
///
/// ```text
/// Pending ──► Paid ──► Refunded
///    │         ▲
///    └─► Failed┘
/// CodPending ──► Paid
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Online order waiting for the gateway.
    #[default]
    Pending,
    /// Cash-on-delivery order: unpaid, but fulfillment may proceed.
    CodPending,
    Paid,
    /// The last gateway attempt failed; a later capture may still succeed.
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, target),
            (Pending, Paid) | (Pending, Failed) | (Failed, Paid) | (CodPending, Paid) | (Paid, Refunded)
        )
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::CodPending => "COD_PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_a_chain() {
        use OrderStatus::*;
        let path = [Pending, Confirmed, Processing, Shipped, Delivered, ReturnRequested, Returned];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_step_can_be_skipped_or_reversed() {
        use OrderStatus::*;
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Confirmed.can_transition_to(Shipped));
        assert!(!Shipped.can_transition_to(Processing));
        assert!(!Delivered.can_transition_to(Returned));
        assert!(!Delivered.can_transition_to(Shipped));
    }

    #[test]
    fn cancellation_only_before_shipping() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_statuses_have_no_exits_and_self_loops_are_illegal() {
        for from in OrderStatus::ALL {
            assert!(!from.can_transition_to(from));
            if from.is_terminal() {
                assert!(OrderStatus::ALL.iter().all(|to| !from.can_transition_to(*to)));
            }
        }
    }

    #[test]
    fn parses_wire_names_case_insensitively() {
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert_eq!(
            "RETURN_REQUESTED".parse::<OrderStatus>(),
            Ok(OrderStatus::ReturnRequested)
        );
        assert!("LOST".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_in_screaming_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::ReturnRequested).unwrap(),
            "\"RETURN_REQUESTED\""
        );
        assert_eq!(
            serde_json::to_string(&PaymentStatus::CodPending).unwrap(),
            "\"COD_PENDING\""
        );
    }

    #[test]
    fn payment_transitions() {
        use PaymentStatus::*;
        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Paid));
        assert!(CodPending.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));

        assert!(!Paid.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!CodPending.can_transition_to(Refunded));
        assert!(!Pending.can_transition_to(Refunded));
    }
}
