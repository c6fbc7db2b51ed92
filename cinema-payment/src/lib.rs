pub mod processor;
pub mod worker;

pub use processor::{PaymentError, PaymentProcessor, SimulatedProcessor};
pub use worker::{AttemptState, PaymentWorker};
