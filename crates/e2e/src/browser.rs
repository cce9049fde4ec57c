//! Browser capability interface consumed by the driver and orchestrator
//!
//! The harness never talks to a browser runtime directly. A [`PageFactory`]
//! hands out isolated pages; each [`BrowserPage`] exposes the handful of
//! operations the transliteration flow needs.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;

/// How an element is found on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Input control by its placeholder / accessible label
    Placeholder(String),
    /// Any element by CSS selector
    Css(String),
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Placeholder(text) => write!(f, "placeholder={:?}", text),
            Locator::Css(selector) => write!(f, "css={}", selector),
        }
    }
}

/// Observed state of a located element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
}

/// Document lifecycle events a page can wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    DomContentLoaded,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::DomContentLoaded => "domcontentloaded",
        }
    }
}

/// One isolated page (own browser context), used by a single case at a time
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> E2eResult<()>;

    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: u64) -> E2eResult<()>;

    /// `None` when nothing matches the locator
    async fn locate(&self, target: &Locator) -> E2eResult<Option<ElementState>>;

    async fn click(&self, target: &Locator) -> E2eResult<()>;

    /// Press a key or chord, on an element or on the page keyboard when `target` is `None`
    async fn press(&self, target: Option<&Locator>, key: &str) -> E2eResult<()>;

    /// Replace the element's value in one operation
    async fn set_text(&self, target: &Locator, text: &str) -> E2eResult<()>;

    async fn dispatch_event(&self, target: &Locator, event: &str) -> E2eResult<()>;

    /// Rendered text, whitespace preserved
    async fn read_text(&self, target: &Locator) -> E2eResult<String>;

    /// Current value of a form control
    async fn input_value(&self, target: &Locator) -> E2eResult<String>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> E2eResult<Vec<u8>>;

    async fn close(&self) -> E2eResult<()>;
}

/// Source of fresh, isolated pages
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn new_page(&self) -> E2eResult<Box<dyn BrowserPage>>;
}
