// SPDX-License-Identifier: AGPL-3.0-only

//! Validation harness for pmhmc binaries.
//!
//! The validation binary follows a fixed pattern:
//!   - Hardcoded expected values with provenance
//!   - Explicit pass/fail checks against documented tolerances
//!   - Exit code 0 (all checks pass) or 1 (any check fails)
//!   - Machine-readable summary on stdout

use std::process;

/// A single validation check with result tracking.
#[derive(Debug, Clone)]
pub struct Check {
    /// Human-readable label.
    pub label: String,
    /// Whether this check passed.
    pub passed: bool,
    /// Observed value.
    pub observed: f64,
    /// Expected value (or bound).
    pub expected: f64,
    /// Tolerance used.
    pub tolerance: f64,
    /// How the tolerance was applied.
    pub mode: ToleranceMode,
}

/// How a tolerance threshold is applied.
#[derive(Debug, Clone, Copy)]
pub enum ToleranceMode {
    /// |observed - expected| < tolerance
    Absolute,
    /// |observed - expected| / |expected| < tolerance
    Relative,
    /// observed < threshold (upper bound only)
    UpperBound,
}

impl std::fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "abs"),
            Self::Relative => write!(f, "rel"),
            Self::UpperBound => write!(f, "<"),
        }
    }
}

/// Accumulates validation checks and produces a summary with exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    /// Name of the validation binary.
    pub name: String,
    /// All checks performed.
    pub checks: Vec<Check>,
}

impl ValidationHarness {
    /// Create a new harness for a named validation binary.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
        }
    }

    /// Add an absolute tolerance check: |observed - expected| < tolerance.
    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        self.checks.push(Check {
            label: label.to_string(),
            passed: (observed - expected).abs() < tolerance,
            observed,
            expected,
            tolerance,
            mode: ToleranceMode::Absolute,
        });
    }

    /// Add a relative tolerance check:
    /// |observed - expected| / |expected| < tolerance.
    pub fn check_rel(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = if expected.abs() > f64::EPSILON {
            ((observed - expected) / expected).abs() < tolerance
        } else {
            observed.abs() < tolerance
        };
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance,
            mode: ToleranceMode::Relative,
        });
    }

    /// Add an upper-bound check: observed < threshold.
    pub fn check_upper(&mut self, label: &str, observed: f64, threshold: f64) {
        self.checks.push(Check {
            label: label.to_string(),
            passed: observed < threshold,
            observed,
            expected: threshold,
            tolerance: threshold,
            mode: ToleranceMode::UpperBound,
        });
    }

    /// Number of failed checks.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    /// Print the per-check table and summary line; exit 1 on any failure.
    pub fn finish(&self) -> ! {
        println!("\n── {} ──", self.name);
        for c in &self.checks {
            let status = if c.passed { "PASS" } else { "FAIL" };
            println!(
                "  [{status}] {:<46} observed={:>14.6e} expected={:>14.6e} ({} {:.1e})",
                c.label, c.observed, c.expected, c.mode, c.tolerance
            );
        }
        let failures = self.failures();
        println!(
            "SUMMARY {}: {} checks, {} failed",
            self.name,
            self.checks.len(),
            failures
        );
        process::exit(i32::from(failures > 0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_check_pass_and_fail() {
        let mut h = ValidationHarness::new("t");
        h.check_abs("close", 1.0, 1.0 + 1e-12, 1e-10);
        h.check_abs("far", 1.0, 2.0, 1e-10);
        assert!(h.checks[0].passed);
        assert!(!h.checks[1].passed);
        assert_eq!(h.failures(), 1);
    }

    #[test]
    fn rel_check_handles_zero_expected() {
        let mut h = ValidationHarness::new("t");
        h.check_rel("zero", 1e-12, 0.0, 1e-10);
        assert!(h.checks[0].passed, "falls back to absolute near zero");
    }

    #[test]
    fn upper_bound_check() {
        let mut h = ValidationHarness::new("t");
        h.check_upper("bounded", 0.5, 1.0);
        h.check_upper("unbounded", 2.0, 1.0);
        assert!(h.checks[0].passed);
        assert!(!h.checks[1].passed);
    }
}
