//! At-least-once delivery of reviewer activations.
//!
//! Activations are written to `reviewer_activations` in the same transaction
//! as the directive or handoff that produced them. [`ActivationOutbox`] later
//! pushes undelivered rows to a [`ReviewerSink`]. A row is marked delivered
//! only after the sink acknowledges it, so a crash in between redelivers the
//! same request; sinks deduplicate on the stable `delivery_key`.

use async_trait::async_trait;
use gatekeeper_common::Priority;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::reviewers::ReviewerCode;
use crate::errors::GateResult;
use crate::store::DbHandle;

/// Default number of delivery attempts before an activation is parked.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// A persisted activation and its delivery state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub id: i64,
    pub directive_id: i64,
    pub handoff_id: Option<i64>,
    pub reviewer_code: ReviewerCode,
    pub priority: Priority,
    pub matched_phrase: String,
    pub delivery_key: Uuid,
    pub attempts: u32,
    pub delivered_at: Option<String>,
    pub last_error: Option<String>,
}

/// Work handed to an external reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerRequest {
    pub directive_id: i64,
    pub reviewer_code: ReviewerCode,
    pub priority: Priority,
    pub delivery_key: Uuid,
    pub matched_phrase: String,
    pub focus_areas: Vec<String>,
}

impl From<&ActivationRecord> for ReviewerRequest {
    fn from(record: &ActivationRecord) -> Self {
        Self {
            directive_id: record.directive_id,
            reviewer_code: record.reviewer_code.clone(),
            priority: record.priority,
            delivery_key: record.delivery_key,
            matched_phrase: record.matched_phrase.clone(),
            focus_areas: record
                .reviewer_code
                .focus_areas()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Receiver of reviewer work. Must tolerate duplicate `delivery_key`s.
#[async_trait]
pub trait ReviewerSink: Send + Sync {
    async fn deliver(&self, request: &ReviewerRequest) -> anyhow::Result<()>;
}

/// Writes each request as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct JsonLinesSink;

#[async_trait]
impl ReviewerSink for JsonLinesSink {
    async fn deliver(&self, request: &ReviewerRequest) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string(request)?);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct ActivationOutbox {
    db: DbHandle,
    max_attempts: u32,
}

impl ActivationOutbox {
    pub fn new(db: DbHandle, max_attempts: u32) -> Self {
        Self {
            db,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Push every pending activation to `sink` once.
    pub async fn deliver_pending(&self, sink: &dyn ReviewerSink) -> GateResult<DeliveryReport> {
        let max_attempts = self.max_attempts;
        let pending = self
            .db
            .call(move |db| db.pending_deliveries(max_attempts))
            .await?;

        let mut report = DeliveryReport::default();
        for record in pending {
            let request = ReviewerRequest::from(&record);
            let id = record.id;
            match sink.deliver(&request).await {
                Ok(()) => {
                    self.db.call(move |db| db.mark_delivered(id)).await?;
                    report.delivered += 1;
                    tracing::debug!(activation_id = id, reviewer = %request.reviewer_code, "activation delivered");
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!(
                        activation_id = id,
                        reviewer = %request.reviewer_code,
                        attempt = record.attempts + 1,
                        error = %message,
                        "activation delivery failed"
                    );
                    self.db
                        .call(move |db| db.mark_delivery_failed(id, &message))
                        .await?;
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
