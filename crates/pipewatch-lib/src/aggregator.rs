//! Applies execution events to the aggregate store

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::models::ExecutionEvent;
use crate::observability::MonitorMetrics;
use crate::store::{AggregateStore, PipelineAggregate};

/// Result of a successful `apply`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event changed the pipeline aggregate
    Applied,
    /// The execution id was already applied; nothing changed
    Duplicate,
}

/// Single entry point for mutating pipeline aggregates
pub struct Aggregator {
    store: Arc<AggregateStore>,
    metrics: MonitorMetrics,
}

impl Aggregator {
    pub fn new(store: Arc<AggregateStore>) -> Self {
        Self {
            store,
            metrics: MonitorMetrics::new(),
        }
    }

    /// Apply one event with at-least-once semantics.
    ///
    /// Invalid events are rejected before any state is touched. A repeated
    /// execution id is a no-op success.
    pub fn apply(&self, event: &ExecutionEvent) -> Result<ApplyOutcome> {
        if let Err(e) = event.validate() {
            self.metrics.inc_events_rejected();
            return Err(e);
        }

        let dedup_capacity = self.store.dedup_capacity();
        let (outcome, created) = self.store.with_shard_mut(&event.pipeline_id, |shard| {
            let created = !shard.contains_key(&event.pipeline_id);
            let aggregate = shard
                .entry(event.pipeline_id.clone())
                .or_insert_with(|| {
                    PipelineAggregate::new(&event.pipeline_id, &event.team, dedup_capacity)
                });

            if aggregate.has_applied(&event.execution_id) {
                return (ApplyOutcome::Duplicate, false);
            }

            if aggregate.team() != event.team {
                warn!(
                    pipeline_id = %event.pipeline_id,
                    owner = %aggregate.team(),
                    event_team = %event.team,
                    "Event team differs from pipeline owner, keeping owner"
                );
            }

            aggregate.record(event);
            (ApplyOutcome::Applied, created)
        });

        match outcome {
            ApplyOutcome::Applied => {
                self.metrics.inc_events_applied();
                if created {
                    self.metrics.set_pipelines_tracked(self.store.len());
                }
            }
            ApplyOutcome::Duplicate => {
                self.metrics.inc_events_duplicate();
                debug!(
                    pipeline_id = %event.pipeline_id,
                    execution_id = %event.execution_id,
                    "Skipping already applied execution"
                );
            }
        }

        Ok(outcome)
    }
}
