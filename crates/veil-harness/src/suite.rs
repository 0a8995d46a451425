use std::future::Future;
use std::pin::Pin;
use tracing::{error, info};

use crate::{HarnessError, VeilHarness};

/// Boxed future returned by a suite case.
pub type CaseFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// A named check run against a live daemon.
pub struct SuiteCase {
    pub name: &'static str,
    pub run: fn(&mut VeilHarness) -> CaseFuture<'_>,
}

/// Outcome of one suite run.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub passed: usize,
    pub failed: Vec<&'static str>,
}

impl SuiteReport {
    pub fn all_passed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `cases` in order against the daemon held by `harness`.
///
/// A case returning `Err` is recorded and the run continues. A daemon that
/// died is fatal instead, since every later case would fail for the same
/// reason; the error names the case it was detected around.
pub async fn run_suite(
    harness: &mut VeilHarness,
    cases: &[SuiteCase],
) -> Result<SuiteReport, HarnessError> {
    let mut report = SuiteReport::default();
    for case in cases {
        if !harness.proxy_is_running() {
            return Err(HarnessError::ProxyNotRunning(format!(
                "before case `{}`",
                case.name
            )));
        }
        info!(case = case.name, "running suite case");
        match (case.run)(harness).await {
            Ok(()) => report.passed += 1,
            Err(err) => {
                error!(case = case.name, error = %err, "suite case failed");
                report.failed.push(case.name);
            }
        }
        if !harness.proxy_is_running() {
            return Err(HarnessError::ProxyNotRunning(format!(
                "after case `{}`",
                case.name
            )));
        }
    }
    if report.all_passed() {
        info!(passed = report.passed, "suite finished");
    } else {
        error!(
            passed = report.passed,
            failed = report.failed.len(),
            "suite finished with failures"
        );
    }
    Ok(report)
}
