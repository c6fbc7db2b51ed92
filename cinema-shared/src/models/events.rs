use uuid::Uuid;

/// Work item on the payment request queue. One per pending reservation.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub reservation_id: Uuid,
    pub user_id: String,
    /// Minor currency units (cents).
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    #[serde(alias = "paid")]
    Paid,
    #[serde(alias = "failed")]
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Paid => "PAID",
            OutcomeStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of a payment attempt, broadcast to every outcome subscriber.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub reservation_id: Uuid,
    pub user_id: String,
    pub status: OutcomeStatus,
    pub amount: i64,
    pub timestamp: i64,
}

impl PaymentOutcome {
    pub fn for_request(request: &PaymentRequest, status: OutcomeStatus) -> Self {
        Self {
            reservation_id: request.reservation_id,
            user_id: request.user_id.clone(),
            status,
            amount: request.amount,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == OutcomeStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_shape() {
        let request = PaymentRequest {
            reservation_id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            amount: 1500,
            currency: "usd".to_string(),
        };
        let outcome = PaymentOutcome::for_request(&request, OutcomeStatus::Paid);
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "PAID");
        assert_eq!(json["amount"], 1500);
        assert_eq!(json["user_id"], "user-1");
        assert_eq!(json["reservation_id"], request.reservation_id.to_string());
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_outcome_status_accepts_lowercase() {
        let status: OutcomeStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(status, OutcomeStatus::Failed);
    }
}
