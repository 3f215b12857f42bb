//! Assessment aggregation.
//!
//! An [`Assessment`] is produced in one of two ways:
//!
//! - [`run_assessment`] loads a dataset once through a [`Connector`] and runs
//!   each requested check exactly once on a bounded worker pool;
//! - [`assessment_from_results`] wraps check results computed elsewhere.
//!
//! Both go through [`PendingAssessment::complete`], so the summary and the
//! recommendations are derived identically. Given the same results and the
//! same timestamp, the two paths serialize to the same JSON.
//!
//! ```text
//! CREATED ──start()──▶ CHECKS_RUNNING ──complete()──▶ Assessment (CHECKS_COMPLETE)
//! ```

use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::checks::{run_check, CheckKind, CheckResult, Outcome};
use crate::config::AssessmentConfig;
use crate::connector::Connector;
use crate::error::{QualityError, Result};
use crate::frame::Frame;
use crate::recommend::{self, Recommendation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentMetadata {
    pub dataset_id: String,
    pub connector_type: String,
    pub timestamp: DateTime<Utc>,
    pub checks_requested: Vec<String>,
    pub total_checks: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(rename = "passed_checks")]
    pub passed: usize,
    #[serde(rename = "failed_checks")]
    pub failed: usize,
    #[serde(rename = "error_checks")]
    pub errored: usize,
}

impl Summary {
    pub fn from_results(check_results: &IndexMap<String, CheckResult>) -> Self {
        let mut summary = Summary::default();
        for result in check_results.values() {
            match result.outcome() {
                Outcome::Passed => summary.passed += 1,
                Outcome::Failed => summary.failed += 1,
                Outcome::Errored => summary.errored += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored
    }
}

/// A completed assessment. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub metadata: AssessmentMetadata,
    /// Results in request order.
    pub check_results: IndexMap<String, CheckResult>,
    pub summary: Summary,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssessmentState {
    Created,
    ChecksRunning,
    ChecksComplete,
}

/// An assessment that has metadata but no results yet.
#[derive(Debug, Clone)]
pub struct PendingAssessment {
    dataset_id: String,
    connector_type: String,
    timestamp: DateTime<Utc>,
    checks_requested: Vec<String>,
    state: AssessmentState,
}

impl PendingAssessment {
    pub fn new(
        dataset_id: impl Into<String>,
        connector_type: impl Into<String>,
        checks_requested: Vec<String>,
    ) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            connector_type: connector_type.into(),
            timestamp: Utc::now().trunc_subsecs(0),
            checks_requested,
            state: AssessmentState::Created,
        }
    }

    /// Pin the timestamp (truncated to whole seconds).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(0);
        self
    }

    pub fn state(&self) -> AssessmentState {
        self.state
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn start(&mut self) {
        self.state = AssessmentState::ChecksRunning;
    }

    /// Classify, summarize and attach recommendations.
    pub fn complete(self, check_results: IndexMap<String, CheckResult>) -> Assessment {
        let summary = Summary::from_results(&check_results);
        let recommendations = recommend::generate(&check_results);
        debug_assert_eq!(summary.total(), check_results.len());

        Assessment {
            metadata: AssessmentMetadata {
                dataset_id: self.dataset_id,
                connector_type: self.connector_type,
                timestamp: self.timestamp,
                checks_requested: self.checks_requested,
                total_checks: check_results.len(),
            },
            check_results,
            summary,
            recommendations,
        }
    }
}

/// Worker pool and deadlines for [`run_assessment`].
#[derive(Debug, Clone)]
pub struct AssessmentOptions {
    pub workers: usize,
    pub load_timeout: Duration,
    pub check_timeout: Duration,
}

impl Default for AssessmentOptions {
    fn default() -> Self {
        Self::from(&AssessmentConfig::default())
    }
}

impl From<&AssessmentConfig> for AssessmentOptions {
    fn from(config: &AssessmentConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            load_timeout: Duration::from_secs(config.load_timeout_secs),
            check_timeout: Duration::from_secs(config.check_timeout_secs),
        }
    }
}

/// Canonical check names, de-duplicated in first-occurrence order. Unknown
/// names are kept verbatim so they surface as errors.
pub fn normalize_check_names(check_names: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(check_names.len());
    for raw in check_names {
        let name = match CheckKind::from_str(raw) {
            Ok(kind) => kind.as_str().to_string(),
            Err(_) => raw.trim().to_string(),
        };
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Load `dataset_id` once and run the named checks against it.
pub async fn run_assessment(
    connector: Arc<dyn Connector>,
    dataset_id: &str,
    check_names: &[String],
    options: &AssessmentOptions,
) -> Assessment {
    let names = normalize_check_names(check_names);
    let pending = PendingAssessment::new(dataset_id, connector.name(), names);
    run_pending(pending, connector, options).await
}

/// [`run_assessment`] for a pending assessment created by the caller.
pub async fn run_pending(
    mut pending: PendingAssessment,
    connector: Arc<dyn Connector>,
    options: &AssessmentOptions,
) -> Assessment {
    pending.start();
    let dataset_id = pending.dataset_id.clone();
    let names = pending.checks_requested.clone();

    tracing::info!(
        dataset = %dataset_id,
        connector = %connector.name(),
        checks = ?names,
        "running assessment"
    );

    let results = match load(connector.as_ref(), &dataset_id, options.load_timeout).await {
        Ok(frame) => execute_checks(Arc::new(frame), &dataset_id, &names, options).await,
        Err(e) => {
            tracing::warn!(dataset = %dataset_id, error = %e, "dataset load failed");
            let message = e.to_string();
            names
                .iter()
                .map(|name| (name.clone(), CheckResult::error(message.clone())))
                .collect()
        }
    };

    let assessment = pending.complete(results);
    tracing::info!(
        dataset = %dataset_id,
        passed = assessment.summary.passed,
        failed = assessment.summary.failed,
        errored = assessment.summary.errored,
        "assessment complete"
    );
    assessment
}

/// Wrap externally computed results. Nothing is executed.
pub fn assessment_from_results(
    check_results: IndexMap<String, CheckResult>,
    dataset_id: &str,
    connector_type: &str,
) -> Assessment {
    let requested = check_results.keys().cloned().collect();
    PendingAssessment::new(dataset_id, connector_type, requested).complete(check_results)
}

async fn load(connector: &dyn Connector, dataset_id: &str, limit: Duration) -> Result<Frame> {
    let work = async {
        connector.connect().await?;
        connector.load_data(dataset_id).await
    };
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(QualityError::Timeout {
            what: format!("loading '{}'", dataset_id),
            secs: limit.as_secs(),
        }),
    }
}

async fn execute_checks(
    frame: Arc<Frame>,
    dataset_id: &str,
    names: &[String],
    options: &AssessmentOptions,
) -> IndexMap<String, CheckResult> {
    let mut slots: Vec<Option<CheckResult>> = vec![None; names.len()];
    let permits = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut tasks = JoinSet::new();

    for (pos, name) in names.iter().enumerate() {
        let kind = match CheckKind::from_str(name) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(check = %name, "unknown check");
                slots[pos] = Some(CheckResult::error(e.to_string()));
                continue;
            }
        };

        let frame = Arc::clone(&frame);
        let permits = Arc::clone(&permits);
        let dataset_id = dataset_id.to_string();
        let check_timeout = options.check_timeout;

        tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (pos, CheckResult::error(e.to_string())),
            };
            let job = tokio::task::spawn_blocking(move || run_check(kind, &dataset_id, &frame));
            let result = match tokio::time::timeout(check_timeout, job).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => CheckResult::error(format!("check '{}' aborted: {}", kind.as_str(), e)),
                Err(_) => {
                    let err = QualityError::Timeout {
                        what: format!("check '{}'", kind.as_str()),
                        secs: check_timeout.as_secs(),
                    };
                    tracing::warn!(error = %err, "check timed out");
                    CheckResult::error(err.to_string())
                }
            };
            (pos, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((pos, result)) => slots[pos] = Some(result),
            Err(e) => tracing::warn!(error = %e, "check task failed"),
        }
    }

    names
        .iter()
        .zip(slots)
        .map(|(name, slot)| {
            let result = slot.unwrap_or_else(|| CheckResult::error("check did not complete"));
            (name.clone(), result)
        })
        .collect()
}
