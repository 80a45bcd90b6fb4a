//! Idle eligibility evaluation
//!
//! Two evaluators, one per workload family:
//! - [`CliEligibilityEvaluator`] judges each CLI deployment on its own
//! - [`ServiceEligibilityEvaluator`] judges an environment's services as a whole
//!
//! Neither mutates anything. Listing, probe and query failures are logged
//! and folded into the returned decision.

mod cli;
mod service;

pub use cli::{cron_job_count, CliEligibilityEvaluator, CRONJOBS_ENV};
pub use service::ServiceEligibilityEvaluator;

use crate::models::PodPhase;
use crate::repository::WorkloadRepository;
use crate::selector::LabelSelector;
use tracing::{error, info};

/// Whether a build pod in one of `blocking` phases exists.
///
/// A failed listing is logged and treated as no builds.
async fn build_in_progress(
    repository: &dyn WorkloadRepository,
    namespace: &str,
    selector: &LabelSelector,
    blocking: &[PodPhase],
) -> bool {
    match repository.list_builds(namespace, selector).await {
        Ok(builds) => match builds.iter().find(|b| blocking.contains(&b.phase)) {
            Some(build) => {
                info!(
                    namespace = %namespace,
                    build = %build.name,
                    phase = %build.phase,
                    "Environment has running build, skipping"
                );
                true
            }
            None => false,
        },
        Err(e) => {
            error!(namespace = %namespace, error = %e, "Error getting running builds");
            false
        }
    }
}
