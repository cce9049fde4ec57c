//! Verdict engine: maps (case, actual output) to pass/fail
//!
//! Both polarities pass on substring containment. Negative cases can
//! optionally be held to a stricter rule: the output, minus framing
//! whitespace, must be exactly the original input.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cases::{Polarity, TestCase};

/// Containment check shared by every policy. No whitespace normalization.
pub fn evaluate(expected: &str, actual: &str) -> bool {
    actual.contains(expected)
}

/// What a case asserts about the output, resolved from its polarity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "expected", rename_all = "snake_case")]
pub enum AssertionPolicy {
    /// The transliterated text must appear in the output
    TransformExpected(String),
    /// The original text must come through unaltered
    PreservedExpected(String),
}

impl AssertionPolicy {
    pub fn for_case(case: &TestCase) -> Self {
        match case.polarity {
            Polarity::Pos => AssertionPolicy::TransformExpected(case.expected.clone()),
            Polarity::Neg => AssertionPolicy::PreservedExpected(case.expected.clone()),
        }
    }

    pub fn expected(&self) -> &str {
        match self {
            AssertionPolicy::TransformExpected(s) | AssertionPolicy::PreservedExpected(s) => s,
        }
    }
}

/// Outcome of evaluating one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub policy: AssertionPolicy,
    /// For preserved cases: whether the output, minus framing whitespace, is exactly the input.
    /// Lets a report tell a clean pass-through from one that merely contains it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_passthrough: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictEngine {
    strict_passthrough: bool,
}

impl VerdictEngine {
    pub fn new(strict_passthrough: bool) -> Self {
        Self { strict_passthrough }
    }

    pub fn judge(&self, case: &TestCase, actual: &str) -> Verdict {
        let policy = AssertionPolicy::for_case(case);
        let contained = evaluate(policy.expected(), actual);

        match &policy {
            AssertionPolicy::TransformExpected(_) => Verdict {
                passed: contained,
                policy,
                exact_passthrough: None,
            },
            AssertionPolicy::PreservedExpected(expected) => {
                let exact = actual.trim() == expected.as_str();
                let passed = if self.strict_passthrough {
                    exact
                } else {
                    contained
                };

                if contained && !exact && !self.strict_passthrough {
                    warn!(
                        "[{}] Pass-through text found but output carries extra content: {:?}",
                        case.id, actual
                    );
                }

                Verdict {
                    passed,
                    policy,
                    exact_passthrough: Some(exact),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{CaseRecord, TestCase};
    use test_case::test_case;

    fn case(id: &str, input: &str, expected: &str) -> TestCase {
        TestCase::try_from(CaseRecord {
            id: id.to_string(),
            category: "0_Test".to_string(),
            input: input.to_string(),
            expected: expected.to_string(),
        })
        .unwrap()
    }

    #[test_case("මම හෙට ගෙදර යනවා.", "මම හෙට ගෙදර යනවා.", true; "exact")]
    #[test_case("මම හෙට", "මම හෙට ගෙදර යනවා.", true; "prefix")]
    #[test_case("ගෙදර", "  මම හෙට ගෙදර යනවා.\n", true; "framed")]
    #[test_case("ගෙදර යනවා", "මම හෙට ගෙදර", false; "absent tail")]
    #[test_case("a   b", "a b", false; "whitespace is not collapsed")]
    #[test_case("a   b", "x a   b y", true; "whitespace run kept")]
    #[test_case("abc", "", false; "empty actual")]
    fn test_containment(expected: &str, actual: &str, passed: bool) {
        assert_eq!(evaluate(expected, actual), passed);
    }

    #[test]
    fn test_policy_from_polarity() {
        let pos = case("Pos_Fun_001", "mama", "මම");
        let neg = case("Neg_Fun_003", "0771234567", "0771234567");

        assert_eq!(
            AssertionPolicy::for_case(&pos),
            AssertionPolicy::TransformExpected("මම".into())
        );
        assert_eq!(
            AssertionPolicy::for_case(&neg),
            AssertionPolicy::PreservedExpected("0771234567".into())
        );
    }

    #[test]
    fn test_negative_pass_through_passes() {
        let neg = case(
            "Neg_Fun_002",
            "<script>alert('Test')</script>",
            "<script>alert('Test')</script>",
        );
        let verdict = VerdictEngine::default().judge(&neg, "<script>alert('Test')</script> ");
        assert!(verdict.passed);
        assert_eq!(verdict.exact_passthrough, Some(true));
    }

    #[test]
    fn test_negative_altered_input_fails() {
        let neg = case("Neg_Fun_004", "https://www.google.com", "https://www.google.com");
        let verdict = VerdictEngine::default().judge(&neg, "හ්ttප්ස්://www.google.com");
        assert!(!verdict.passed);
    }

    #[test]
    fn test_lenient_and_strict_passthrough_differ_on_extra_content() {
        let neg = case("Neg_Fun_003", "0771234567", "0771234567");
        let actual = "0771234567 ගෙදර";

        let lenient = VerdictEngine::new(false).judge(&neg, actual);
        assert!(lenient.passed);
        assert_eq!(lenient.exact_passthrough, Some(false));

        let strict = VerdictEngine::new(true).judge(&neg, actual);
        assert!(!strict.passed);
    }

    #[test]
    fn test_positive_verdict_has_no_passthrough_flag() {
        let pos = case("Pos_Fun_016", "mata badagini.", "මට බඩගිනි.");
        let verdict = VerdictEngine::new(true).judge(&pos, "මට බඩගිනි.");
        assert!(verdict.passed);
        assert_eq!(verdict.exact_passthrough, None);
    }

    #[test]
    fn test_strict_passthrough_keeps_expected_whitespace() {
        let neg = case("Neg_Space_002", " 0771234567", " 0771234567");

        let strict = VerdictEngine::new(true).judge(&neg, " 0771234567\n");
        assert!(!strict.passed);
        assert_eq!(strict.exact_passthrough, Some(false));

        let lenient = VerdictEngine::new(false).judge(&neg, " 0771234567\n");
        assert!(lenient.passed);
    }
}
