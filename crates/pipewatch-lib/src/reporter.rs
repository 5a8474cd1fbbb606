//! Read-only health queries over the aggregate store

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};
use crate::store::{AggregateStore, PipelineHealth};

/// Consistent copy of every pipeline aggregate.
///
/// Iteration is lazy over the copy and can be restarted any number of
/// times. Order is unspecified.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub taken_at: DateTime<Utc>,
    pipelines: Vec<PipelineHealth>,
}

impl HealthSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, PipelineHealth> {
        self.pipelines.iter()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn into_vec(self) -> Vec<PipelineHealth> {
        self.pipelines
    }
}

impl<'a> IntoIterator for &'a HealthSnapshot {
    type Item = &'a PipelineHealth;
    type IntoIter = std::slice::Iter<'a, PipelineHealth>;

    fn into_iter(self) -> Self::IntoIter {
        self.pipelines.iter()
    }
}

/// Derived view over all pipelines owned by one team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamHealth {
    pub team: String,
    pub pipeline_count: usize,
    pub total_count: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub success_rate: Option<f64>,
    /// Run-count weighted across the team's pipelines
    pub avg_duration_secs: Option<f64>,
    /// Run-count weighted across the team's pipelines
    pub avg_records_processed: Option<f64>,
}

impl TeamHealth {
    fn from_pipelines<'a>(team: &str, pipelines: impl IntoIterator<Item = &'a PipelineHealth>) -> Self {
        let mut view = TeamHealth {
            team: team.to_string(),
            pipeline_count: 0,
            total_count: 0,
            success_count: 0,
            failed_count: 0,
            success_rate: None,
            avg_duration_secs: None,
            avg_records_processed: None,
        };

        let mut weighted_duration = 0.0;
        let mut weighted_records = 0.0;
        for p in pipelines {
            view.pipeline_count += 1;
            view.total_count += p.total_count;
            view.success_count += p.success_count;
            view.failed_count += p.failed_count;
            weighted_duration += p.total_count as f64 * p.avg_duration_secs;
            weighted_records += p.total_count as f64 * p.avg_records_processed;
        }

        if view.total_count > 0 {
            let total = view.total_count as f64;
            view.success_rate = Some(view.success_count as f64 / total);
            view.avg_duration_secs = Some(weighted_duration / total);
            view.avg_records_processed = Some(weighted_records / total);
        }
        view
    }
}

/// Totals across every pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSummary {
    pub pipeline_count: usize,
    pub team_count: usize,
    pub total_count: u64,
    pub success_count: u64,
    pub failed_count: u64,
    pub success_rate: Option<f64>,
}

/// Query side of the monitor
pub struct HealthReporter {
    store: Arc<AggregateStore>,
}

impl HealthReporter {
    pub fn new(store: Arc<AggregateStore>) -> Self {
        Self { store }
    }

    pub fn get_pipeline_health(&self, pipeline_id: &str) -> Result<PipelineHealth> {
        self.store
            .get(pipeline_id)
            .ok_or_else(|| MonitorError::PipelineNotFound(pipeline_id.to_string()))
    }

    pub fn get_all_health(&self) -> HealthSnapshot {
        HealthSnapshot {
            taken_at: Utc::now(),
            pipelines: self.store.snapshot(),
        }
    }

    pub fn get_team_health(&self, team: &str) -> Result<TeamHealth> {
        let snapshot = self.store.snapshot();
        let owned: Vec<&PipelineHealth> = snapshot.iter().filter(|p| p.team == team).collect();
        if owned.is_empty() {
            return Err(MonitorError::TeamNotFound(team.to_string()));
        }
        Ok(TeamHealth::from_pipelines(team, owned))
    }

    /// One view per team, all computed from the same snapshot, sorted by team
    pub fn get_all_team_health(&self) -> Vec<TeamHealth> {
        let snapshot = self.store.snapshot();
        let mut by_team: BTreeMap<&str, Vec<&PipelineHealth>> = BTreeMap::new();
        for p in &snapshot {
            by_team.entry(p.team.as_str()).or_default().push(p);
        }
        by_team
            .into_iter()
            .map(|(team, pipelines)| TeamHealth::from_pipelines(team, pipelines))
            .collect()
    }

    pub fn get_global_summary(&self) -> GlobalSummary {
        let snapshot = self.store.snapshot();
        let teams: BTreeSet<&str> = snapshot.iter().map(|p| p.team.as_str()).collect();

        let total_count: u64 = snapshot.iter().map(|p| p.total_count).sum();
        let success_count: u64 = snapshot.iter().map(|p| p.success_count).sum();
        let failed_count: u64 = snapshot.iter().map(|p| p.failed_count).sum();

        GlobalSummary {
            pipeline_count: snapshot.len(),
            team_count: teams.len(),
            total_count,
            success_count,
            failed_count,
            success_rate: (total_count > 0).then(|| success_count as f64 / total_count as f64),
        }
    }
}
