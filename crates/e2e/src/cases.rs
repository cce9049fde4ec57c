//! Declarative case table: the fixture of (input, expected, category) records

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{E2eResult, FixtureError};

/// Built-in fixture shipped with the crate.
const BUILTIN_FIXTURE: &str = include_str!("../fixtures/cases.yaml");

/// Whether a case expects transformation or pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    Pos,
    Neg,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Pos => f.write_str("Pos"),
            Polarity::Neg => f.write_str("Neg"),
        }
    }
}

impl std::str::FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pos" | "positive" => Ok(Polarity::Pos),
            "neg" | "negative" => Ok(Polarity::Neg),
            other => Err(format!("unknown polarity '{}'", other)),
        }
    }
}

/// One record as it appears in a fixture file
#[derive(Debug, Clone, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub category: String,
    pub input: String,
    pub expected: String,
}

/// A validated test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub id: String,
    pub category: String,
    pub input: String,
    pub expected: String,
    pub polarity: Polarity,
    /// Kind segment of the id, e.g. `Fun` or `UI`
    pub kind: String,
    pub sequence: u32,
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(Pos|Neg)_([A-Za-z]+)_(\d+)$").expect("case id pattern is valid")
    })
}

fn category_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("category pattern is valid")
    })
}

/// Split an id into its polarity, kind and sequence parts.
pub fn parse_case_id(id: &str) -> Result<(Polarity, String, u32), FixtureError> {
    let malformed = || FixtureError::MalformedId(id.to_string());
    let caps = id_pattern().captures(id).ok_or_else(malformed)?;

    let polarity = match &caps[1] {
        "Pos" => Polarity::Pos,
        _ => Polarity::Neg,
    };
    let sequence = caps[3].parse::<u32>().map_err(|_| malformed())?;

    Ok((polarity, caps[2].to_string(), sequence))
}

impl TryFrom<CaseRecord> for TestCase {
    type Error = FixtureError;

    fn try_from(record: CaseRecord) -> Result<Self, Self::Error> {
        let (polarity, kind, sequence) = parse_case_id(&record.id)?;

        if record.expected.is_empty() {
            return Err(FixtureError::EmptyExpected(record.id));
        }
        if !category_pattern().is_match(&record.category) {
            return Err(FixtureError::UnsafeCategory {
                id: record.id,
                category: record.category,
            });
        }
        if polarity == Polarity::Neg && record.input != record.expected {
            return Err(FixtureError::PassThroughMismatch { id: record.id });
        }

        Ok(TestCase {
            id: record.id,
            category: record.category,
            input: record.input,
            expected: record.expected,
            polarity,
            kind,
            sequence,
        })
    }
}

/// The non data-driven render check run after the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiPresenceScenario {
    pub id: String,
    pub category: String,
    pub description: String,
}

impl Default for UiPresenceScenario {
    fn default() -> Self {
        Self {
            id: "Pos_UI_001".to_string(),
            category: "9_UI".to_string(),
            description: "Input box visibility".to_string(),
        }
    }
}

/// Case selection used by the harness binary
#[derive(Debug, Clone, Default)]
pub struct CaseFilter {
    pub ids: Vec<String>,
    pub category_prefix: Option<String>,
    pub polarity: Option<Polarity>,
}

impl CaseFilter {
    pub fn matches(&self, case: &TestCase) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| id == &case.id) {
            return false;
        }
        if let Some(prefix) = &self.category_prefix {
            if !case.category.starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.polarity.map_or(true, |p| p == case.polarity)
    }
}

/// Ordered, validated, immutable table of cases
#[derive(Debug, Clone)]
pub struct CaseTable {
    cases: Vec<TestCase>,
    ui_presence: UiPresenceScenario,
}

impl CaseTable {
    /// Validate records and build the table. Fails on the first integrity violation.
    pub fn new(records: Vec<CaseRecord>) -> Result<Self, FixtureError> {
        if records.is_empty() {
            return Err(FixtureError::EmptyTable);
        }

        let mut seen = HashSet::with_capacity(records.len());
        let mut cases = Vec::with_capacity(records.len());

        for record in records {
            if !seen.insert(record.id.clone()) {
                return Err(FixtureError::DuplicateId(record.id));
            }
            cases.push(TestCase::try_from(record)?);
        }

        Ok(Self {
            cases,
            ui_presence: UiPresenceScenario::default(),
        })
    }

    /// The shipped Singlish fixture
    pub fn builtin() -> E2eResult<Self> {
        Self::from_yaml(BUILTIN_FIXTURE)
    }

    /// Parse a table from a YAML list of records
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let records: Vec<CaseRecord> = serde_yaml::from_str(yaml)?;
        Ok(Self::new(records)?)
    }

    /// Parse a table from a JSON array of records
    pub fn from_json(json: &str) -> E2eResult<Self> {
        let records: Vec<CaseRecord> = serde_json::from_str(json)?;
        Ok(Self::new(records)?)
    }

    /// Load a fixture file, picking the format from its extension
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let records = Self::parse_records(path, &content)?;
        Ok(Self::new(records)?)
    }

    /// Load every fixture under a directory as one table, in file name order
    pub fn load_all(dir: &Path) -> E2eResult<Self> {
        let mut records = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml" || ext == "json")
                    .unwrap_or(false)
            })
        {
            let content = std::fs::read_to_string(entry.path())?;
            records.extend(Self::parse_records(entry.path(), &content)?);
        }

        Ok(Self::new(records)?)
    }

    fn parse_records(path: &Path, content: &str) -> E2eResult<Vec<CaseRecord>> {
        let is_json = path.extension().map(|ext| ext == "json").unwrap_or(false);
        if is_json {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(serde_yaml::from_str(content)?)
        }
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    pub fn ui_presence(&self) -> &UiPresenceScenario {
        &self.ui_presence
    }

    /// Cases matching the filter, in table order
    pub fn select(&self, filter: &CaseFilter) -> Vec<&TestCase> {
        self.cases.iter().filter(|c| filter.matches(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, category: &str, input: &str, expected: &str) -> CaseRecord {
        CaseRecord {
            id: id.to_string(),
            category: category.to_string(),
            input: input.to_string(),
            expected: expected.to_string(),
        }
    }

    #[test]
    fn test_builtin_fixture_loads() {
        let table = CaseTable::builtin().unwrap();
        assert_eq!(table.len(), 24);

        let first = &table.cases()[0];
        assert_eq!(first.id, "Pos_Fun_001");
        assert_eq!(first.expected, "මම හෙට ගෙදර යනවා.");
        assert_eq!(first.polarity, Polarity::Pos);
        assert_eq!(first.kind, "Fun");
        assert_eq!(first.sequence, 1);

        let script = table.get("Neg_Fun_002").unwrap();
        assert_eq!(script.input, "<script>alert('Test')</script>");
        assert_eq!(script.polarity, Polarity::Neg);

        assert_eq!(table.ui_presence().id, "Pos_UI_001");
        assert_eq!(table.ui_presence().category, "9_UI");
    }

    #[test]
    fn test_builtin_preserves_interior_whitespace() {
        let table = CaseTable::builtin().unwrap();
        let case = table.get("Pos_Fun_009").unwrap();
        assert_eq!(case.input, "oya kattiya   kohedha   yannee?");
        assert_eq!(case.expected, "ඔය කට්ටිය   කොහෙද   යන්නේ?");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = CaseTable::new(vec![
            record("Pos_Fun_001", "1_Simple_Daily", "mama", "මම"),
            record("Pos_Fun_001", "2_Questions", "oya", "ඔය"),
        ])
        .unwrap_err();
        assert_eq!(err, FixtureError::DuplicateId("Pos_Fun_001".into()));
    }

    #[test]
    fn test_empty_expected_rejected() {
        let err = CaseTable::new(vec![record("Pos_Fun_001", "1_Simple_Daily", "mama", "")])
            .unwrap_err();
        assert_eq!(err, FixtureError::EmptyExpected("Pos_Fun_001".into()));
    }

    #[test]
    fn test_negative_must_pass_through() {
        let err = CaseTable::new(vec![record("Neg_Fun_001", "8_Negative", "a@b", "a b")])
            .unwrap_err();
        assert!(matches!(err, FixtureError::PassThroughMismatch { .. }));
    }

    #[test]
    fn test_malformed_id_and_category_rejected() {
        let err = CaseTable::new(vec![record("Fun_001", "1_Simple", "a", "a")]).unwrap_err();
        assert_eq!(err, FixtureError::MalformedId("Fun_001".into()));

        let err = CaseTable::new(vec![record("Pos_Fun_001", "../escape", "a", "a")])
            .unwrap_err();
        assert!(matches!(err, FixtureError::UnsafeCategory { .. }));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert_eq!(CaseTable::new(vec![]).unwrap_err(), FixtureError::EmptyTable);
    }

    #[test]
    fn test_parse_json_fixture() {
        let json = r#"[
            {"id": "Neg_Fun_003", "category": "8_Negative_Numeric", "input": "0771234567", "expected": "0771234567"}
        ]"#;
        let table = CaseTable::from_json(json).unwrap();
        assert_eq!(table.cases()[0].polarity, Polarity::Neg);
    }

    #[test]
    fn test_select_by_category_and_polarity() {
        let table = CaseTable::builtin().unwrap();

        let negatives = table.select(&CaseFilter {
            polarity: Some(Polarity::Neg),
            ..Default::default()
        });
        assert_eq!(negatives.len(), 4);
        assert!(negatives.iter().all(|c| c.id.starts_with("Neg_")));

        let questions = table.select(&CaseFilter {
            category_prefix: Some("2_Questions".into()),
            ..Default::default()
        });
        let ids: Vec<&str> = questions.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Pos_Fun_002", "Pos_Fun_014", "Pos_Fun_018"]);

        let single = table.select(&CaseFilter {
            ids: vec!["Pos_Fun_010".into()],
            ..Default::default()
        });
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_load_all_rejects_duplicates_across_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.yaml"),
            "- {id: Pos_Fun_001, category: 1_Simple_Daily, input: mama, expected: \"මම\"}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            r#"[{"id": "Pos_Fun_001", "category": "2_Questions", "input": "oya", "expected": "ඔය"}]"#,
        )
        .unwrap();

        let err = CaseTable::load_all(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::E2eError::Fixture(FixtureError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_polarity_from_str() {
        assert_eq!("neg".parse::<Polarity>().unwrap(), Polarity::Neg);
        assert_eq!("Positive".parse::<Polarity>().unwrap(), Polarity::Pos);
        assert!("sideways".parse::<Polarity>().is_err());
    }
}
