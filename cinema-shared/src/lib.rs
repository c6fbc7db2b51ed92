pub mod models;
pub mod pii;

pub use models::events::{OutcomeStatus, PaymentOutcome, PaymentRequest};
