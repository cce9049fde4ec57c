//! Interaction driver: one case's sequence of operations against the service UI

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::browser::{BrowserPage, LoadState, Locator};
use crate::cases::TestCase;
use crate::config::{TargetConfig, WaitConfig};
use crate::error::{E2eError, E2eResult, Stage};
use crate::wait;

/// What the presence check saw right after the page became ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceObservation {
    pub visible: bool,
    pub enabled: bool,
    pub initial_value: String,
}

impl PresenceObservation {
    pub fn passed(&self) -> bool {
        self.visible && self.enabled && self.initial_value.is_empty()
    }
}

fn at_stage(stage: Stage) -> impl FnOnce(E2eError) -> E2eError {
    move |err| err.at_stage(stage)
}

/// Last stage a driver run entered. Read by the orchestrator when a case
/// is cut off by its own timeout.
#[derive(Debug)]
pub struct Progress(Mutex<Stage>);

impl Progress {
    pub fn new() -> Self {
        Self(Mutex::new(Stage::Session))
    }

    pub fn current(&self) -> Stage {
        *self.0.lock()
    }

    fn enter(&self, stage: Stage) {
        *self.0.lock() = stage;
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the transliterator page for a single case
#[derive(Debug, Clone)]
pub struct InteractionDriver {
    target: TargetConfig,
    waits: WaitConfig,
}

impl InteractionDriver {
    pub fn new(target: TargetConfig, waits: WaitConfig) -> Self {
        Self { target, waits }
    }

    pub fn input_locator(&self) -> Locator {
        Locator::Placeholder(self.target.input_placeholder.clone())
    }

    pub fn output_locator(&self) -> Locator {
        Locator::Css(self.target.output_selector.clone())
    }

    /// Feed `case.input` through the page and return the rendered output verbatim
    pub async fn run(
        &self,
        page: &dyn BrowserPage,
        case: &TestCase,
        progress: &Progress,
    ) -> E2eResult<String> {
        let input = self.input_locator();
        let output = self.output_locator();

        self.open(page, progress).await?;

        progress.enter(Stage::LocateOutput);
        if page
            .locate(&output)
            .await
            .map_err(at_stage(Stage::LocateOutput))?
            .is_none()
        {
            return Err(E2eError::driver(
                Stage::LocateOutput,
                format!("no element matches {}", output),
            ));
        }

        progress.enter(Stage::Clear);
        self.clear(page, &input).await?;

        progress.enter(Stage::Inject);
        debug!("[{}] Injecting {:?}", case.id, case.input);
        page.set_text(&input, &case.input)
            .await
            .map_err(at_stage(Stage::Inject))?;
        page.dispatch_event(&input, &self.target.input_event)
            .await
            .map_err(at_stage(Stage::Inject))?;

        // The service only converts the last word on a word boundary.
        progress.enter(Stage::Trigger);
        page.press(None, &self.target.trigger_key)
            .await
            .map_err(at_stage(Stage::Trigger))?;

        progress.enter(Stage::ReadOutput);
        let output = &output;
        let actual = wait::until_stable("output surface", &self.waits.output, || {
            page.read_text(output)
        })
        .await
        .map_err(at_stage(Stage::ReadOutput))?;

        debug!("[{}] Output settled: {:?}", case.id, actual);
        Ok(actual)
    }

    /// Navigate and wait until the input control is usable
    pub async fn open(&self, page: &dyn BrowserPage, progress: &Progress) -> E2eResult<()> {
        let input = self.input_locator();

        progress.enter(Stage::Navigate);
        debug!("Navigating to {}", self.target.url);
        page.navigate(&self.target.url)
            .await
            .map_err(at_stage(Stage::Navigate))?;

        progress.enter(Stage::Readiness);
        let input_ref = &input;
        let ready = wait::poll_until("input control", &self.waits.readiness, || async move {
            let state = page.locate(input_ref).await?;
            Ok::<_, E2eError>(state.filter(|s| s.enabled))
        })
        .await;

        match ready {
            Ok(_) => Ok(()),
            Err(E2eError::Timeout { stage: None, .. }) => {
                // Tell "missing" apart from "present but never usable".
                let found = page
                    .locate(&input)
                    .await
                    .map_err(at_stage(Stage::LocateInput))?;
                match found {
                    None => Err(E2eError::driver(
                        Stage::LocateInput,
                        format!(
                            "no element matches {} within {} ms",
                            input, self.waits.readiness.timeout_ms
                        ),
                    )),
                    Some(_) => Err(E2eError::driver(
                        Stage::Readiness,
                        format!(
                            "{} never became enabled within {} ms",
                            input, self.waits.readiness.timeout_ms
                        ),
                    )),
                }
            }
            Err(err) => Err(err.at_stage(Stage::Readiness)),
        }
    }

    /// Select-all then delete, so editors that track key events stay in sync
    async fn clear(&self, page: &dyn BrowserPage, input: &Locator) -> E2eResult<()> {
        page.click(input).await.map_err(at_stage(Stage::Clear))?;
        page.press(Some(input), &self.target.select_all_chord)
            .await
            .map_err(at_stage(Stage::Clear))?;
        page.press(Some(input), &self.target.delete_key)
            .await
            .map_err(at_stage(Stage::Clear))?;
        Ok(())
    }

    /// Load the page on the cheap document-ready signal and inspect the input control
    pub async fn observe_presence(
        &self,
        page: &dyn BrowserPage,
        progress: &Progress,
    ) -> E2eResult<PresenceObservation> {
        let input = self.input_locator();

        progress.enter(Stage::Navigate);
        page.navigate(&self.target.url)
            .await
            .map_err(at_stage(Stage::Navigate))?;

        progress.enter(Stage::Readiness);
        page.wait_for_load_state(LoadState::DomContentLoaded, self.waits.page_ready_timeout_ms)
            .await
            .map_err(at_stage(Stage::Readiness))?;

        progress.enter(Stage::LocateInput);
        let state = page
            .locate(&input)
            .await
            .map_err(at_stage(Stage::LocateInput))?
            .ok_or_else(|| {
                E2eError::driver(Stage::LocateInput, format!("no element matches {}", input))
            })?;

        progress.enter(Stage::Presence);
        let initial_value = page
            .input_value(&input)
            .await
            .map_err(at_stage(Stage::Presence))?;

        Ok(PresenceObservation {
            visible: state.visible,
            enabled: state.enabled,
            initial_value,
        })
    }
}
