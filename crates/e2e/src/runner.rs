//! Execution orchestrator: drives cases, captures evidence, applies verdicts

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::artifact::{ArtifactRecord, ArtifactStore};
use crate::browser::{BrowserPage, PageFactory};
use crate::cases::{CaseFilter, CaseTable, Polarity, TestCase, UiPresenceScenario};
use crate::config::HarnessConfig;
use crate::driver::{InteractionDriver, PresenceObservation, Progress};
use crate::error::{E2eError, E2eResult, FailureKind, Stage};
use crate::verdict::{Verdict, VerdictEngine};

/// Why a case did not pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFailure {
    pub kind: FailureKind,
    pub stage: Option<Stage>,
    pub message: String,
}

impl CaseFailure {
    fn from_error(err: &E2eError) -> Self {
        Self {
            kind: err.failure_kind(),
            stage: err.stage(),
            message: err.to_string(),
        }
    }
}

/// Result of driving one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub case_id: String,
    pub category: String,
    pub polarity: Polarity,
    pub input: String,
    pub expected: String,
    /// Rendered output, when the driver got that far
    pub actual_output: Option<String>,
    pub artifact_path: Option<PathBuf>,
    pub passed: bool,
    pub verdict: Option<Verdict>,
    pub failure: Option<CaseFailure>,
    /// Evidence attached to the report, captured whatever the outcome
    pub attachments: Vec<ArtifactRecord>,
    pub observed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn new(case: &TestCase) -> Self {
        Self {
            case_id: case.id.clone(),
            category: case.category.clone(),
            polarity: case.polarity,
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual_output: None,
            artifact_path: None,
            passed: false,
            verdict: None,
            failure: None,
            attachments: Vec::new(),
            observed_at: Utc::now(),
            duration_ms: 0,
        }
    }

    fn attach(&mut self, artifact: ArtifactRecord) {
        self.artifact_path = Some(artifact.path.clone());
        self.attachments.push(artifact);
    }
}

/// Result of the input-control presence check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiPresenceResult {
    pub id: String,
    pub category: String,
    pub description: String,
    pub passed: bool,
    pub observation: Option<PresenceObservation>,
    pub failure: Option<CaseFailure>,
    pub artifact_path: Option<PathBuf>,
    pub attachments: Vec<ArtifactRecord>,
    pub observed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<ExecutionResult>,
    pub ui_presence: Option<UiPresenceResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn get(&self, case_id: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.case_id == case_id)
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Screenshots go to `<artifacts_root>/screenshots/<category>/<id>.png`
    pub artifacts_root: PathBuf,

    /// Directory for `test-results.json`
    pub output_dir: PathBuf,

    /// Cases driven at once, each on its own page
    pub concurrency: usize,

    /// Budget for driving one case end to end
    pub case_timeout_ms: u64,

    /// Budget for taking one screenshot
    pub capture_timeout_ms: u64,

    /// Require negative cases to render exactly their input
    pub strict_passthrough: bool,

    pub run_ui_presence: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            artifacts_root: PathBuf::from("."),
            output_dir: PathBuf::from("test-results"),
            concurrency: 1,
            case_timeout_ms: 60_000,
            capture_timeout_ms: 10_000,
            strict_passthrough: false,
            run_ui_presence: true,
        }
    }
}

/// Main orchestrator
pub struct TestRunner {
    factory: Arc<dyn PageFactory>,
    driver: InteractionDriver,
    verdicts: VerdictEngine,
    store: ArtifactStore,
    config: RunnerConfig,
}

impl TestRunner {
    pub fn new(factory: Arc<dyn PageFactory>, config: &HarnessConfig) -> Self {
        let driver = InteractionDriver::new(config.target.clone(), config.waits.clone());
        Self::with_driver(factory, driver, config.runner.clone())
    }

    pub fn with_driver(
        factory: Arc<dyn PageFactory>,
        driver: InteractionDriver,
        config: RunnerConfig,
    ) -> Self {
        Self {
            factory,
            driver,
            verdicts: VerdictEngine::new(config.strict_passthrough),
            store: ArtifactStore::new(config.artifacts_root.clone()),
            config,
        }
    }

    /// Load a fixture and run it. An invalid fixture fails before any page is opened.
    pub async fn run_fixture(&self, path: &Path, filter: &CaseFilter) -> E2eResult<TestSuiteResult> {
        let table = if path.is_dir() {
            CaseTable::load_all(path)?
        } else {
            CaseTable::from_file(path)?
        };
        Ok(self.run(&table, filter).await)
    }

    /// Run the selected cases in table order, then the presence check
    pub async fn run(&self, table: &CaseTable, filter: &CaseFilter) -> TestSuiteResult {
        let selected = table.select(filter);
        let ui = self.config.run_ui_presence.then(|| table.ui_presence());
        self.run_cases(&selected, ui).await
    }

    pub async fn run_cases(
        &self,
        cases: &[&TestCase],
        ui_presence: Option<&UiPresenceScenario>,
    ) -> TestSuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let concurrency = self.config.concurrency.max(1);

        info!("Running {} case(s), concurrency {}...", cases.len(), concurrency);
        debug!("Artifacts under {}", self.store.root().display());

        let results: Vec<ExecutionResult> = stream::iter(cases.iter().copied())
            .map(|case| self.run_case(case))
            .buffered(concurrency)
            .collect()
            .await;

        let ui_presence = match ui_presence {
            Some(scenario) => Some(self.run_ui_presence(scenario).await),
            None => None,
        };

        let passed = results.iter().filter(|r| r.passed).count()
            + ui_presence.as_ref().map_or(0, |u| usize::from(u.passed));
        let total = results.len() + usize::from(ui_presence.is_some());
        let failed = total - passed;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed of {} ({} ms)",
            passed, failed, total, duration_ms
        );

        TestSuiteResult {
            total,
            passed,
            failed,
            started_at,
            duration_ms,
            results,
            ui_presence,
        }
    }

    /// Drive one case to a result. Never returns an error: failures are recorded.
    pub async fn run_case(&self, case: &TestCase) -> ExecutionResult {
        let start = Instant::now();
        let mut result = ExecutionResult::new(case);
        debug!("Running case: {} ({})", case.id, case.category);

        let page = match self.factory.new_page().await {
            Ok(page) => page,
            Err(e) => {
                let err = E2eError::driver(Stage::Session, e.to_string());
                result.failure = Some(CaseFailure::from_error(&err));
                return self.finish(result, start);
            }
        };

        let progress = Progress::new();
        let driven = match timeout(
            self.case_timeout(),
            self.driver.run(page.as_ref(), case, &progress),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(E2eError::timeout(format!(
                "case {} exceeded {} ms",
                case.id, self.config.case_timeout_ms
            ))
            .at_stage(progress.current())),
        };

        // Evidence is captured whether or not driving succeeded.
        let captured = self.capture(page.as_ref(), &case.category, &case.id).await;
        if let Err(e) = page.close().await {
            warn!("[{}] Failed to close page: {}", case.id, e);
        }

        match driven {
            Ok(actual) => {
                info!(
                    "[{}] Expected: \"{}\" | Actual: \"{}\"",
                    case.id, case.expected, actual
                );
                let verdict = self.verdicts.judge(case, &actual);

                match captured {
                    Ok(artifact) => {
                        result.attach(artifact);
                        result.passed = verdict.passed;
                        if !verdict.passed {
                            result.failure = Some(CaseFailure {
                                kind: FailureKind::AssertionMismatch,
                                stage: None,
                                message: format!(
                                    "expected output to contain {:?}, got {:?}",
                                    case.expected, actual
                                ),
                            });
                        }
                    }
                    Err(e) => {
                        result.failure = Some(CaseFailure::from_error(&e));
                    }
                }

                result.actual_output = Some(actual);
                result.verdict = Some(verdict);
            }
            Err(e) => {
                result.failure = Some(CaseFailure::from_error(&e));
                match captured {
                    Ok(artifact) => result.attach(artifact),
                    Err(capture_err) => {
                        warn!("[{}] No evidence captured: {}", case.id, capture_err)
                    }
                }
            }
        }

        self.finish(result, start)
    }

    fn finish(&self, mut result: ExecutionResult, start: Instant) -> ExecutionResult {
        result.duration_ms = start.elapsed().as_millis() as u64;
        result.observed_at = Utc::now();

        if result.passed {
            info!("✓ {} ({} ms)", result.case_id, result.duration_ms);
        } else {
            let reason = result
                .failure
                .as_ref()
                .map(|f| f.message.as_str())
                .unwrap_or("unknown error");
            error!("✗ {} - {}", result.case_id, reason);
        }
        result
    }

    /// Navigate, wait for document-ready and check the input control's initial state
    pub async fn run_ui_presence(&self, scenario: &UiPresenceScenario) -> UiPresenceResult {
        let start = Instant::now();
        info!("Running {}: {}", scenario.id, scenario.description);
        let mut result = UiPresenceResult {
            id: scenario.id.clone(),
            category: scenario.category.clone(),
            description: scenario.description.clone(),
            passed: false,
            observation: None,
            failure: None,
            artifact_path: None,
            attachments: Vec::new(),
            observed_at: Utc::now(),
            duration_ms: 0,
        };

        match self.factory.new_page().await {
            Ok(page) => {
                let progress = Progress::new();
                let observed = match timeout(
                    self.case_timeout(),
                    self.driver.observe_presence(page.as_ref(), &progress),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(E2eError::timeout(format!(
                        "{} exceeded {} ms",
                        scenario.id, self.config.case_timeout_ms
                    ))
                    .at_stage(progress.current())),
                };

                let captured = self.capture(page.as_ref(), &scenario.category, &scenario.id).await;
                if let Err(e) = page.close().await {
                    warn!("[{}] Failed to close page: {}", scenario.id, e);
                }

                match (observed, captured) {
                    (Ok(observation), Ok(artifact)) => {
                        result.passed = observation.passed();
                        if !result.passed {
                            result.failure = Some(CaseFailure {
                                kind: FailureKind::AssertionMismatch,
                                stage: Some(Stage::Presence),
                                message: format!(
                                    "input control visible={} enabled={} initial length={}",
                                    observation.visible,
                                    observation.enabled,
                                    observation.initial_value.chars().count()
                                ),
                            });
                        }
                        result.observation = Some(observation);
                        result.artifact_path = Some(artifact.path.clone());
                        result.attachments.push(artifact);
                    }
                    (Ok(observation), Err(e)) => {
                        result.observation = Some(observation);
                        result.failure = Some(CaseFailure::from_error(&e));
                    }
                    (Err(e), captured) => {
                        result.failure = Some(CaseFailure::from_error(&e));
                        if let Ok(artifact) = captured {
                            result.artifact_path = Some(artifact.path.clone());
                            result.attachments.push(artifact);
                        }
                    }
                }
            }
            Err(e) => {
                let err = E2eError::driver(Stage::Session, e.to_string());
                result.failure = Some(CaseFailure::from_error(&err));
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        result.observed_at = Utc::now();
        if result.passed {
            info!("✓ {} ({} ms)", result.id, result.duration_ms);
        } else {
            let reason = result.failure.as_ref().map(|f| f.message.as_str()).unwrap_or("unknown error");
            error!("✗ {} - {}", result.id, reason);
        }
        result
    }

    /// Screenshot the page and store it under category/id
    async fn capture(&self, page: &dyn BrowserPage, category: &str, id: &str) -> E2eResult<ArtifactRecord> {
        let bytes = match timeout(
            Duration::from_millis(self.config.capture_timeout_ms),
            page.screenshot(),
        )
        .await
        {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => return Err(e.at_stage(Stage::Capture)),
            Err(_) => {
                return Err(E2eError::timeout(format!(
                    "screenshot of {} exceeded {} ms",
                    id, self.config.capture_timeout_ms
                ))
                .at_stage(Stage::Capture))
            }
        };

        self.store.save(category, id, &bytes)
    }

    fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.config.case_timeout_ms)
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PollPolicy, SettlePolicy, TargetConfig, WaitConfig};
    use crate::fake::{FakeBrowser, FakeFault};

    fn runner(browser: FakeBrowser, root: &Path) -> TestRunner {
        let driver = InteractionDriver::new(
            TargetConfig::default(),
            WaitConfig {
                readiness: PollPolicy {
                    poll_interval_ms: 1,
                    timeout_ms: 50,
                },
                output: SettlePolicy {
                    initial_delay_ms: 0,
                    poll_interval_ms: 1,
                    stable_reads: 2,
                    timeout_ms: 200,
                },
                page_ready_timeout_ms: 50,
                preflight_timeout_ms: 50,
            },
        );
        TestRunner::with_driver(
            Arc::new(browser),
            driver,
            RunnerConfig {
                artifacts_root: root.to_path_buf(),
                output_dir: root.join("test-results"),
                case_timeout_ms: 500,
                capture_timeout_ms: 200,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_run_case_passes_and_attaches_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let table = CaseTable::builtin().unwrap();
        let runner = runner(FakeBrowser::new(), dir.path());

        let result = runner.run_case(table.get("Pos_Fun_002").unwrap()).await;

        assert!(result.passed, "{:?}", result.failure);
        assert!(result.actual_output.as_deref().unwrap().contains("ඔයාගෙ නම මොකක්ද?"));
        let path = result.artifact_path.clone().unwrap();
        assert_eq!(path, dir.path().join("screenshots/2_Questions/Pos_Fun_002.png"));
        assert!(path.exists());
        assert_eq!(result.attachments.len(), 1);
        assert_eq!(result.attachments[0].content_type, "image/png");
    }

    #[tokio::test]
    async fn test_mismatch_keeps_expected_and_actual() {
        let dir = tempfile::tempdir().unwrap();
        let table = CaseTable::builtin().unwrap();
        // Engine that converts nothing.
        let runner = runner(FakeBrowser::new().with_engine(|t| t.to_string()), dir.path());

        let result = runner.run_case(table.get("Pos_Fun_001").unwrap()).await;

        assert!(!result.passed);
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::AssertionMismatch);
        assert_eq!(result.expected, "මම හෙට ගෙදර යනවා.");
        assert!(result.actual_output.unwrap().contains("mama heta gedhara yanavaa."));
        assert!(result.artifact_path.is_some());
    }

    #[tokio::test]
    async fn test_screenshot_failure_fails_otherwise_passing_case() {
        let dir = tempfile::tempdir().unwrap();
        let table = CaseTable::builtin().unwrap();
        let runner = runner(FakeBrowser::new().with_fault(FakeFault::ScreenshotFails), dir.path());

        let result = runner.run_case(table.get("Neg_Fun_001").unwrap()).await;

        assert!(!result.passed);
        assert!(result.verdict.unwrap().passed);
        assert_eq!(result.failure.unwrap().stage, Some(Stage::Capture));
        assert!(result.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_session_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let table = CaseTable::builtin().unwrap();
        let runner = runner(FakeBrowser::new().with_fault(FakeFault::SessionFails), dir.path());

        let result = runner.run_case(table.get("Neg_Fun_001").unwrap()).await;

        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Driver);
        assert_eq!(failure.stage, Some(Stage::Session));
    }

    #[tokio::test]
    async fn test_write_results() {
        let dir = tempfile::tempdir().unwrap();
        let table = CaseTable::builtin().unwrap();
        let runner = runner(FakeBrowser::new(), dir.path());

        let filter = CaseFilter {
            ids: vec!["Neg_Fun_003".into()],
            ..Default::default()
        };
        let suite = runner.run(&table, &filter).await;
        let path = runner.write_results(&suite).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["results"][0]["case_id"], "Neg_Fun_003");
        assert_eq!(json["results"][0]["category"], "8_Negative_Numeric");
        assert_eq!(json["results"][0]["passed"], true);
        assert_eq!(json["ui_presence"]["id"], "Pos_UI_001");
        assert_eq!(json["ui_presence"]["description"], "Input box visibility");
    }

    #[tokio::test]
    async fn test_unsettled_output_reports_read_stage() {
        let dir = tempfile::tempdir().unwrap();
        let table = CaseTable::builtin().unwrap();
        let runner = runner(FakeBrowser::new().with_fault(FakeFault::FlickeringOutput), dir.path());

        let result = runner.run_case(table.get("Pos_Fun_001").unwrap()).await;

        assert!(!result.passed);
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.stage, Some(Stage::ReadOutput));
        assert!(result.artifact_path.is_some());
    }

    #[tokio::test]
    async fn test_case_timeout_reports_stage_in_progress() {
        let dir = tempfile::tempdir().unwrap();
        let table = CaseTable::builtin().unwrap();
        let browser = FakeBrowser::new().with_fault(FakeFault::HangOnInput("0771234567".into()));
        let runner = runner(browser, dir.path());

        let result = runner.run_case(table.get("Neg_Fun_003").unwrap()).await;

        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.stage, Some(Stage::Inject));
    }
}
