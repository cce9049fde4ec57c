//! Transliterator E2E Test Framework
//!
//! This crate verifies a web-based Singlish to Sinhala transliterator by
//! feeding a table of cases through its UI:
//! - Loads case tables from YAML/JSON fixtures (or the built-in table)
//! - Drives a real browser through a Playwright bridge process
//! - Judges the rendered output with a polarity-aware containment check
//! - Captures one screenshot per case under `screenshots/<category>/<id>.png`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── run(table, filter) -> TestSuiteResult                │
//! │    ├── run_case(case) -> ExecutionResult                    │
//! │    │     ├── InteractionDriver::run(page, case) -> output   │
//! │    │     ├── VerdictEngine::judge(case, output) -> Verdict  │
//! │    │     └── ArtifactStore::save(category, id, png)         │
//! │    └── run_ui_presence(scenario) -> UiPresenceResult        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PageFactory / BrowserPage                                  │
//! │    ├── PlaywrightBridge (node + JSON lines)                 │
//! │    └── FakeBrowser (in-memory transliterator)               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CaseTable (YAML)                                           │
//! │    └── [{ id, category, input, expected }]                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod browser;
pub mod cases;
pub mod config;
pub mod driver;
pub mod error;
pub mod fake;
pub mod playwright;
pub mod preflight;
pub mod runner;
pub mod verdict;
pub mod wait;

pub use artifact::{ArtifactRecord, ArtifactStore};
pub use browser::{BrowserPage, PageFactory};
pub use cases::{CaseFilter, CaseTable, Polarity, TestCase, UiPresenceScenario};
pub use config::HarnessConfig;
pub use driver::{InteractionDriver, Progress};
pub use error::{E2eError, E2eResult, FailureKind, Stage};
pub use runner::{ExecutionResult, TestRunner, TestSuiteResult};
pub use verdict::{evaluate, AssertionPolicy, Verdict, VerdictEngine};
