//! In-memory browser for exercising the harness without a real runtime
//!
//! The fake page behaves like the transliterator UI in the ways the driver
//! depends on:
//! - the input is a controlled editor: `set_text` alone does not reach the
//!   app state, an `input` event (or a key event) has to follow
//! - the last word is only converted once a word boundary is typed
//! - the output surface lags behind by a configurable number of reads

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::browser::{BrowserPage, ElementState, LoadState, Locator, PageFactory};
use crate::config::TargetConfig;
use crate::error::{E2eError, E2eResult};

/// PNG file signature; fake screenshots start with it
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Word-for-word transliteration table. Unknown tokens pass through.
#[derive(Debug, Clone, Default)]
pub struct WordTable {
    words: HashMap<String, String>,
}

impl WordTable {
    /// A handful of Singlish words with their Sinhala renderings
    pub fn sample() -> Self {
        let pairs = [
            ("mama", "මම"),
            ("heta", "හෙට"),
            ("gedhara", "ගෙදර"),
            ("yanavaa.", "යනවා."),
            ("oyaage", "ඔයාගෙ"),
            ("nama", "නම"),
            ("mokakdha?", "මොකක්ද?"),
            ("oya", "ඔය"),
            ("kattiya", "කට්ටිය"),
            ("kohedha", "කොහෙද"),
            ("yannee?", "යන්නේ?"),
            ("mata", "මට"),
            ("badagini.", "බඩගිනි."),
            ("api", "අපි"),
            ("gahamu.", "ගහමු."),
        ];
        Self {
            words: pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }

    /// Build a table by aligning the space-separated tokens of input/output pairs.
    /// Pairs whose token counts differ are skipped.
    pub fn from_aligned<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut words = HashMap::new();
        for (input, output) in pairs {
            let from: Vec<&str> = input.split(' ').collect();
            let to: Vec<&str> = output.split(' ').collect();
            if from.len() != to.len() {
                continue;
            }
            for (f, t) in from.into_iter().zip(to) {
                if !f.is_empty() {
                    words.entry(f.to_string()).or_insert_with(|| t.to_string());
                }
            }
        }
        Self { words }
    }

    /// Convert every space-separated token; runs of spaces are kept.
    pub fn transliterate(&self, text: &str) -> String {
        text.split(' ')
            .map(|token| self.words.get(token).map(String::as_str).unwrap_or(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Injectable misbehaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFault {
    /// Opening a page fails
    SessionFails,
    NavigationFails,
    /// The placeholder locator never matches
    MissingInput,
    /// The input exists but stays disabled
    DisabledInput,
    MissingOutput,
    ScreenshotFails,
    /// Every read of the output surface shows a different rendering
    FlickeringOutput,
    /// Processing this exact input never finishes
    HangOnInput(String),
}

/// Operations observed by the fake, in call order across all pages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Navigate(String),
    LoadState(LoadState),
    Click(Locator),
    Press { target: bool, key: String },
    SetText(String),
    Dispatch(String),
    Screenshot,
    Close,
}

type Engine = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Page factory handing out fake transliterator pages
#[derive(Clone)]
pub struct FakeBrowser {
    target: TargetConfig,
    engine: Engine,
    faults: Vec<FakeFault>,
    render_lag: usize,
    initial_input: String,
    events: Arc<Mutex<Vec<PageEvent>>>,
    opened: Arc<AtomicUsize>,
    open_now: Arc<AtomicUsize>,
    max_open: Arc<AtomicUsize>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        let table = WordTable::sample();
        Self {
            target: TargetConfig::default(),
            engine: Arc::new(move |text: &str| table.transliterate(text)),
            faults: Vec::new(),
            render_lag: 2,
            initial_input: String::new(),
            events: Arc::new(Mutex::new(Vec::new())),
            opened: Arc::new(AtomicUsize::new(0)),
            open_now: Arc::new(AtomicUsize::new(0)),
            max_open: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.target = target;
        self
    }

    pub fn with_table(self, table: WordTable) -> Self {
        self.with_engine(move |text| table.transliterate(text))
    }

    pub fn with_engine(mut self, engine: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn with_fault(mut self, fault: FakeFault) -> Self {
        self.faults.push(fault);
        self
    }

    /// Number of output reads that still return the previous rendering
    pub fn with_render_lag(mut self, reads: usize) -> Self {
        self.render_lag = reads;
        self
    }

    /// Text already present in the editor after navigation
    pub fn with_initial_input(mut self, text: &str) -> Self {
        self.initial_input = text.to_string();
        self
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.events.lock().clone()
    }

    pub fn pages_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn pages_open(&self) -> usize {
        self.open_now.load(Ordering::SeqCst)
    }

    /// Highest number of pages that were open at the same time
    pub fn max_concurrent_pages(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    fn has(&self, fault: &FakeFault) -> bool {
        self.faults.contains(fault)
    }

    fn record(&self, event: PageEvent) {
        self.events.lock().push(event);
    }
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFactory for FakeBrowser {
    async fn new_page(&self) -> E2eResult<Box<dyn BrowserPage>> {
        if self.has(&FakeFault::SessionFails) {
            return Err(E2eError::Playwright("browser context could not be created".into()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(FakePage {
            browser: self.clone(),
            state: Mutex::new(PageState::default()),
        }))
    }
}

#[derive(Debug, Default)]
struct PageState {
    loaded: bool,
    closed: bool,
    focused: bool,
    selected_all: bool,
    /// DOM value of the editor
    value: String,
    /// Value the app has seen through events
    committed: String,
    rendered: String,
    pending: Option<String>,
    lag: usize,
    output_reads: usize,
}

pub struct FakePage {
    browser: FakeBrowser,
    state: Mutex<PageState>,
}

impl FakePage {
    fn is_input(&self, target: &Locator) -> bool {
        matches!(target, Locator::Placeholder(p) if *p == self.browser.target.input_placeholder)
    }

    fn is_output(&self, target: &Locator) -> bool {
        matches!(target, Locator::Css(s) if *s == self.browser.target.output_selector)
    }

    fn element(&self, target: &Locator) -> Option<ElementState> {
        if !self.state.lock().loaded {
            return None;
        }
        if self.is_input(target) && !self.browser.has(&FakeFault::MissingInput) {
            return Some(ElementState {
                visible: true,
                enabled: !self.browser.has(&FakeFault::DisabledInput),
            });
        }
        if self.is_output(target) && !self.browser.has(&FakeFault::MissingOutput) {
            return Some(ElementState {
                visible: true,
                enabled: true,
            });
        }
        None
    }

    fn require(&self, target: &Locator) -> E2eResult<ElementState> {
        self.element(target).ok_or_else(|| {
            E2eError::Playwright(format!("waiting for {}: locator resolved to no element", target))
        })
    }

    fn require_input(&self, target: &Locator) -> E2eResult<()> {
        self.require(target)?;
        if self.is_input(target) {
            Ok(())
        } else {
            Err(E2eError::Playwright(format!("{} is not an editable element", target)))
        }
    }

    /// Commit the editor value and schedule a new rendering.
    /// Only text followed by a space is considered finished.
    fn commit(&self, state: &mut PageState) {
        state.committed = state.value.clone();

        let text = &state.committed;
        let rendered = match text.rfind(' ') {
            Some(idx) => {
                let (done, last) = text.split_at(idx + 1);
                format!("{}{}", (self.browser.engine)(done), last)
            }
            None => text.clone(),
        };

        state.pending = Some(rendered);
        state.lag = self.browser.render_lag;
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        self.browser.record(PageEvent::Navigate(url.to_string()));
        if self.browser.has(&FakeFault::NavigationFails) {
            return Err(E2eError::Playwright(format!(
                "page.goto: net::ERR_NAME_NOT_RESOLVED at {}",
                url
            )));
        }

        let mut state = self.state.lock();
        *state = PageState {
            loaded: true,
            value: self.browser.initial_input.clone(),
            committed: self.browser.initial_input.clone(),
            ..PageState::default()
        };
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, _timeout_ms: u64) -> E2eResult<()> {
        self.browser.record(PageEvent::LoadState(state));
        if self.state.lock().loaded {
            Ok(())
        } else {
            Err(E2eError::Playwright("no document loaded".into()))
        }
    }

    async fn locate(&self, target: &Locator) -> E2eResult<Option<ElementState>> {
        Ok(self.element(target))
    }

    async fn click(&self, target: &Locator) -> E2eResult<()> {
        self.browser.record(PageEvent::Click(target.clone()));
        self.require(target)?;
        self.state.lock().focused = self.is_input(target);
        Ok(())
    }

    async fn press(&self, target: Option<&Locator>, key: &str) -> E2eResult<()> {
        self.browser.record(PageEvent::Press {
            target: target.is_some(),
            key: key.to_string(),
        });
        if let Some(target) = target {
            self.require_input(target)?;
        }

        let mut state = self.state.lock();
        if target.is_none() && !state.focused {
            return Ok(());
        }

        match key {
            "Control+A" | "Meta+A" => state.selected_all = true,
            "Backspace" | "Delete" => {
                if state.selected_all {
                    state.value.clear();
                } else {
                    state.value.pop();
                }
                state.selected_all = false;
                self.commit(&mut state);
            }
            "Space" => {
                state.value.push(' ');
                state.selected_all = false;
                self.commit(&mut state);
            }
            _ => {}
        }
        Ok(())
    }

    async fn set_text(&self, target: &Locator, text: &str) -> E2eResult<()> {
        self.browser.record(PageEvent::SetText(text.to_string()));
        self.require_input(target)?;

        let mut state = self.state.lock();
        state.value = text.to_string();
        state.focused = true;
        Ok(())
    }

    async fn dispatch_event(&self, target: &Locator, event: &str) -> E2eResult<()> {
        self.browser.record(PageEvent::Dispatch(event.to_string()));
        self.require_input(target)?;

        let hang = {
            let mut state = self.state.lock();
            if event == "input" {
                self.commit(&mut state);
            }
            self.browser.faults.iter().any(|f| {
                matches!(f, FakeFault::HangOnInput(text) if *text == state.committed)
            })
        };

        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn read_text(&self, target: &Locator) -> E2eResult<String> {
        self.require(target)?;

        let mut state = self.state.lock();
        if self.is_input(target) {
            return Ok(state.value.clone());
        }

        if state.pending.is_some() {
            if state.lag == 0 {
                state.rendered = state.pending.take().unwrap_or_default();
            } else {
                state.lag -= 1;
            }
        }

        if self.browser.has(&FakeFault::FlickeringOutput) {
            state.output_reads += 1;
            return Ok(format!("{}{}", state.rendered, state.output_reads));
        }
        Ok(state.rendered.clone())
    }

    async fn input_value(&self, target: &Locator) -> E2eResult<String> {
        self.require_input(target)?;
        Ok(self.state.lock().value.clone())
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        self.browser.record(PageEvent::Screenshot);
        if self.browser.has(&FakeFault::ScreenshotFails) {
            return Err(E2eError::Playwright("page.screenshot: target closed".into()));
        }

        let state = self.state.lock();
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(state.rendered.as_bytes());
        Ok(bytes)
    }

    async fn close(&self) -> E2eResult<()> {
        self.browser.record(PageEvent::Close);
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            self.browser.open_now.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
