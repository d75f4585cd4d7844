//! Test runner output parsing
//!
//! Recognises the summary lines of the common runners:
//!
//! | Runner      | Summary                                           |
//! |-------------|---------------------------------------------------|
//! | jest        | `Tests:       2 failed, 6 passed, 8 total`        |
//! | vitest      | `Tests  6 passed \| 2 failed (8)`                 |
//! | mocha       | `6 passing` / `2 failing`                         |
//! | pytest      | `==== 6 passed, 2 failed in 0.12s ====`           |
//! | cargo test  | `test result: FAILED. 6 passed; 2 failed; ...`    |

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// jest `Tests:` and vitest `Tests` totals line
static SUMMARY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*Tests:?\s+(.*\d.*)$").expect("summary regex is valid"));

/// pytest `==== ... ====` banner
static PYTEST_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^=+ (.+) =+$").expect("pytest regex is valid"));

/// cargo `test result:` line of one test binary
static CARGO_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^test result: \w+\. (\d+) passed; (\d+) failed;")
        .expect("cargo regex is valid")
});

/// mocha reporter totals, printed on separate lines
static MOCHA_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+) (passing|failing)\b").expect("mocha regex is valid")
});

/// `N passed` / `N failed` pairs inside a summary
static COUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+) (passed|failed)\b").expect("count regex is valid"));

/// Passed and failed test counts from one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    /// Passing tests
    pub passed: u32,
    /// Failing tests
    pub failed: u32,
}

impl TestCounts {
    /// Create counts
    #[inline]
    #[must_use]
    pub fn new(passed: u32, failed: u32) -> Self {
        Self { passed, failed }
    }

    /// Parse runner output
    ///
    /// A `Tests` summary line wins when present (jest and vitest also print
    /// per-suite counts that must not be added). `test result:` lines are
    /// summed across test binaries. Otherwise the last pytest banner, or the
    /// mocha totals, are used. Output without counts parses as zero. Counts
    /// too large for `u32` saturate.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let mut cargo: Option<TestCounts> = None;
        let mut pytest = None;
        let mut mocha: Option<TestCounts> = None;

        for line in output.lines() {
            if let Some(caps) = SUMMARY_LINE.captures(line) {
                if let Some(counts) = pairs_in(&caps[1]) {
                    return counts;
                }
            }
            if let Some(caps) = CARGO_LINE.captures(line) {
                let total = cargo.get_or_insert_with(TestCounts::default);
                total.passed = total.passed.saturating_add(number(&caps[1]));
                total.failed = total.failed.saturating_add(number(&caps[2]));
            } else if let Some(caps) = PYTEST_LINE.captures(line.trim_end()) {
                if let Some(counts) = pairs_in(&caps[1]) {
                    pytest = Some(counts);
                }
            } else if let Some(caps) = MOCHA_LINE.captures(line) {
                let total = mocha.get_or_insert_with(TestCounts::default);
                let n = number(&caps[1]);
                if &caps[2] == "passing" {
                    total.passed = n;
                } else {
                    total.failed = n;
                }
            }
        }

        cargo.or(pytest).or(mocha).unwrap_or_default()
    }

    /// Total tests run
    #[inline]
    #[must_use]
    pub fn total(&self) -> u32 {
        self.passed.saturating_add(self.failed)
    }

    /// No failures and at least one passing test
    #[inline]
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.passed > 0
    }
}

impl std::fmt::Display for TestCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} passing", self.passed, self.total())
    }
}

/// Digits beyond `u32` saturate
fn number(digits: &str) -> u32 {
    digits.parse().unwrap_or(u32::MAX)
}

fn pairs_in(text: &str) -> Option<TestCounts> {
    let mut counts = TestCounts::default();
    let mut found = false;
    for caps in COUNT.captures_iter(text) {
        let n = number(&caps[1]);
        if &caps[2] == "passed" {
            counts.passed = counts.passed.saturating_add(n);
        } else {
            counts.failed = counts.failed.saturating_add(n);
        }
        found = true;
    }
    found.then_some(counts)
}
