//! Pre-flight checks run before a session opens.
//!
//! Results are plain values, never errors: the CLI renders them and decides
//! the exit code. `success` requires every *selected* check to pass.

use std::path::Path;
use std::sync::Arc;

use ipuaro_llm::ChatProvider;

use crate::index::scanner::scan_project;
use crate::store::IndexStore;

/// Warn when a project exceeds this many supported files.
pub const LARGE_PROJECT_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Default)]
pub struct CheckOutcome {
    pub ok: bool,
    pub error: Option<String>,
}

impl CheckOutcome {
    fn pass() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Which checks to run; all on by default.
#[derive(Debug, Clone, Copy)]
pub struct OnboardingOptions {
    pub check_store: bool,
    pub check_provider: bool,
    pub check_model: bool,
    pub check_project: bool,
}

impl Default for OnboardingOptions {
    fn default() -> Self {
        Self {
            check_store: true,
            check_provider: true,
            check_model: true,
            check_project: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OnboardingReport {
    pub success: bool,
    pub store: CheckOutcome,
    pub provider: CheckOutcome,
    pub model: CheckOutcome,
    pub project: CheckOutcome,
    pub file_count: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Run the selected checks in order: store ping, provider reachability,
/// model presence, project size.
pub async fn run_onboarding(
    store: &IndexStore,
    provider: &Arc<dyn ChatProvider>,
    root: &Path,
    ignore_patterns: &[String],
    opts: OnboardingOptions,
) -> OnboardingReport {
    let mut report = OnboardingReport::default();

    if opts.check_store {
        report.store = match store.ping().await {
            Ok(()) => CheckOutcome::pass(),
            Err(e) => CheckOutcome::fail(format!("store ping failed: {e}")),
        };
    } else {
        report.store = CheckOutcome::pass();
    }

    if opts.check_provider {
        report.provider = if provider.is_available().await {
            CheckOutcome::pass()
        } else {
            CheckOutcome::fail(format!("provider '{}' is not reachable", provider.name()))
        };
    } else {
        report.provider = CheckOutcome::pass();
    }

    // Model presence only means something when the provider answers at all.
    if opts.check_model && report.provider.ok {
        report.model = match provider.has_model(provider.model()).await {
            Ok(true) => CheckOutcome::pass(),
            Ok(false) => CheckOutcome::fail(format!(
                "model '{}' is not available; pull it first",
                provider.model()
            )),
            Err(e) => CheckOutcome::fail(format!("model check failed: {e}")),
        };
    } else {
        report.model = CheckOutcome::pass();
    }

    if opts.check_project {
        let mut noop = |_| {};
        report.project = match scan_project(root, ignore_patterns, &mut noop) {
            Ok(entries) => {
                report.file_count = entries.len();
                if entries.is_empty() {
                    CheckOutcome::fail("no supported source files found in the project")
                } else {
                    if entries.len() > LARGE_PROJECT_THRESHOLD {
                        report.warnings.push(format!(
                            "large project: {} files (indexing may take a while)",
                            entries.len()
                        ));
                    }
                    CheckOutcome::pass()
                }
            }
            Err(e) => CheckOutcome::fail(format!("project scan failed: {e}")),
        };
    } else {
        report.project = CheckOutcome::pass();
    }

    for outcome in [
        &report.store,
        &report.provider,
        &report.model,
        &report.project,
    ] {
        if let Some(error) = &outcome.error {
            report.errors.push(error.clone());
        }
    }
    report.success =
        report.store.ok && report.provider.ok && report.model.ok && report.project.ok;
    report
}
