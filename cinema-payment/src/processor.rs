use async_trait::async_trait;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Card declined: {0}")]
    Declined(String),
    #[error("Invalid charge: {0}")]
    Invalid(String),
    #[error("Processor unreachable: {0}")]
    Unreachable(String),
}

/// Receipt of an approved charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// External card processor boundary.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn charge(&self, amount: i64, currency: &str, description: &str) -> Result<Charge, PaymentError>;
}

/// Stands in for the card network: approves up to `decline_over_amount`
/// minor units and declines anything larger.
pub struct SimulatedProcessor {
    decline_over_amount: i64,
}

impl SimulatedProcessor {
    pub fn new(decline_over_amount: i64) -> Self {
        Self { decline_over_amount }
    }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
    async fn charge(&self, amount: i64, currency: &str, description: &str) -> Result<Charge, PaymentError> {
        if amount <= 0 {
            return Err(PaymentError::Invalid(format!("Amount must be positive, got {}", amount)));
        }
        if currency.trim().is_empty() {
            return Err(PaymentError::Invalid("Currency is required".to_string()));
        }
        if amount > self.decline_over_amount {
            return Err(PaymentError::Declined(format!(
                "{} {} exceeds limit for '{}'",
                amount, currency, description
            )));
        }
        Ok(Charge {
            id: format!("ch_sim_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.to_lowercase(),
        })
    }
}
