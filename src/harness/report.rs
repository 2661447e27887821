//! Suite and case reports.

use serde::Serialize;

/// Outcome of one test case.
#[derive(Clone, Debug, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub passed: bool,
    pub failures: Vec<String>,
}

impl CaseReport {
    pub(crate) fn failed(name: &str, failures: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            failures,
        }
    }
}

/// Outcome of a whole suite.
#[derive(Clone, Debug, Serialize)]
pub struct SuiteReport {
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.cases.iter().all(|case| case.passed)
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|case| case.passed).count()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.cases.len() - self.passed_count()
    }
}
