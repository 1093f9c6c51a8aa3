//! NATS publisher for intervention records
//!
//! Downstream collaborators (guardian notification, counselor reporting)
//! subscribe to the configured subject. Publishing is best-effort after the
//! transaction is durably stored; delivery mechanics live with the
//! subscribers.

use crate::types::InterventionRecord;
use anyhow::Result;
use async_nats::Client;
use tracing::{debug, info};

/// Publisher for intervention records
#[derive(Clone)]
pub struct InterventionPublisher {
    client: Client,
    subject: String,
}

impl InterventionPublisher {
    /// Connect to NATS and create a publisher for the given subject
    pub async fn connect(url: &str, subject: &str) -> Result<Self> {
        let client = async_nats::connect(url).await?;
        info!(url = %url, subject = %subject, "Connected to NATS for intervention publishing");
        Ok(Self {
            client,
            subject: subject.to_string(),
        })
    }

    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish an intervention record
    pub async fn publish(&self, record: &InterventionRecord) -> Result<()> {
        let payload = serde_json::to_vec(record)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            intervention_id = %record.intervention_id,
            transaction_id = %record.transaction_id,
            alert = record.alert,
            "Published intervention record"
        );

        Ok(())
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running NATS server
}
