use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cinema_shared::{OutcomeStatus, PaymentOutcome};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::broker::MessageHandler;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub reservation_id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub status: OutcomeStatus,
    pub issued_at: DateTime<Utc>,
}

/// Only a PAID outcome yields a ticket. Derived purely from the event, so
/// rendering a replay produces the same document.
pub fn render(outcome: &PaymentOutcome) -> Option<Ticket> {
    if !outcome.is_paid() {
        return None;
    }
    let issued_at = Utc
        .timestamp_opt(outcome.timestamp, 0)
        .single()
        .unwrap_or_else(Utc::now);
    Some(Ticket {
        reservation_id: outcome.reservation_id,
        user_id: outcome.user_id.clone(),
        amount: outcome.amount,
        status: outcome.status,
        issued_at,
    })
}

pub struct TicketIssuer {
    dir: PathBuf,
}

impl TicketIssuer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, reservation_id: Uuid) -> PathBuf {
        self.dir.join(format!("ticket_{}.json", reservation_id))
    }

    pub async fn issue(&self, outcome: &PaymentOutcome) -> CoreResult<Option<PathBuf>> {
        let Some(ticket) = render(outcome) else {
            debug!(reservation_id = %outcome.reservation_id, status = %outcome.status, "No ticket for outcome");
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CoreError::StoreError(format!("Ticket dir {}: {}", self.dir.display(), e)))?;

        let body = serde_json::to_vec_pretty(&ticket).map_err(|e| CoreError::StoreError(e.to_string()))?;
        let path = self.path_for(ticket.reservation_id);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| CoreError::StoreError(format!("Ticket {}: {}", path.display(), e)))?;

        info!(reservation_id = %ticket.reservation_id, path = %path.display(), "Ticket issued");
        Ok(Some(path))
    }

    pub async fn load(&self, reservation_id: Uuid) -> CoreResult<Option<Ticket>> {
        let path = self.path_for(reservation_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| CoreError::StoreError(format!("Corrupt ticket {}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::StoreError(e.to_string())),
        }
    }
}

#[async_trait]
impl MessageHandler for TicketIssuer {
    async fn handle(&self, payload: &[u8]) -> CoreResult<()> {
        let outcome: PaymentOutcome = match serde_json::from_slice(payload) {
            Ok(o) => o,
            Err(e) => {
                error!("Discarding malformed outcome event: {}", e);
                return Ok(());
            }
        };
        if let Err(e) = self.issue(&outcome).await {
            error!(reservation_id = %outcome.reservation_id, "Ticket generation failed: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: OutcomeStatus) -> PaymentOutcome {
        PaymentOutcome {
            reservation_id: Uuid::new_v4(),
            user_id: "alice".into(),
            status,
            amount: 1500,
            timestamp: 4_070_908_800,
        }
    }

    #[test]
    fn test_render_is_paid_only() {
        assert!(render(&outcome(OutcomeStatus::Failed)).is_none());
        let ticket = render(&outcome(OutcomeStatus::Paid)).unwrap();
        assert_eq!(ticket.user_id, "alice");
        assert_eq!(ticket.issued_at.timestamp(), 4_070_908_800);
    }

    #[tokio::test]
    async fn test_issue_writes_ticket_file() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = TicketIssuer::new(dir.path().join("tickets"));
        let paid = outcome(OutcomeStatus::Paid);

        let payload = serde_json::to_vec(&paid).unwrap();
        issuer.handle(&payload).await.unwrap();
        issuer.handle(&payload).await.unwrap();

        let path = dir
            .path()
            .join("tickets")
            .join(format!("ticket_{}.json", paid.reservation_id));
        assert!(path.exists());

        let loaded = issuer.load(paid.reservation_id).await.unwrap().unwrap();
        assert_eq!(loaded.reservation_id, paid.reservation_id);
        assert_eq!(loaded.amount, 1500);
    }

    #[tokio::test]
    async fn test_failed_outcome_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let issuer = TicketIssuer::new(dir.path());
        let failed = outcome(OutcomeStatus::Failed);

        assert!(issuer.issue(&failed).await.unwrap().is_none());
        assert!(issuer.load(failed.reservation_id).await.unwrap().is_none());
    }
}
