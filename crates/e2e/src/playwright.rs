//! Playwright browser automation
//!
//! A single Node process runs an embedded bridge script that owns the
//! Playwright browser. Requests and responses travel as JSON lines over the
//! child's stdin/stdout, correlated by id, so many pages (one browser context
//! each) can be driven concurrently through one process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command as TokioCommand};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::{BrowserPage, ElementState, LoadState, Locator, PageFactory};
use crate::error::{E2eError, E2eResult};

const BRIDGE_SCRIPT: &str = r#"
const readline = require('readline');
const playwright = require(require.resolve('playwright', { paths: [process.cwd()] }));

const config = JSON.parse(process.argv[2]);
const pages = new Map();
let browser = null;

function locate(page, loc) {
  if (loc.kind === 'placeholder') return page.getByPlaceholder(loc.value);
  return page.locator(loc.value);
}

async function handle(op, a) {
  const page = a.page !== undefined ? pages.get(a.page) : undefined;
  if (a.page !== undefined && !page) throw new Error(`unknown page ${a.page}`);

  switch (op) {
    case 'launch':
      browser = await playwright[config.browser].launch({
        headless: config.headless,
        timeout: config.launch_timeout_ms,
      });
      return null;
    case 'newPage': {
      const context = await browser.newContext({
        viewport: { width: config.viewport_width, height: config.viewport_height },
      });
      const created = await context.newPage();
      created.setDefaultTimeout(config.action_timeout_ms);
      pages.set(a.pageId, created);
      return null;
    }
    case 'goto':
      await page.goto(a.url);
      return null;
    case 'waitForLoadState':
      await page.waitForLoadState(a.state, { timeout: a.timeout });
      return null;
    case 'locate': {
      const l = locate(page, a.locator);
      if ((await l.count()) === 0) return null;
      const first = l.first();
      return { visible: await first.isVisible(), enabled: await first.isEnabled() };
    }
    case 'click':
      await locate(page, a.locator).click();
      return null;
    case 'press':
      if (a.locator) await locate(page, a.locator).press(a.key);
      else await page.keyboard.press(a.key);
      return null;
    case 'fill':
      await locate(page, a.locator).fill(a.text);
      return null;
    case 'dispatchEvent':
      await locate(page, a.locator).dispatchEvent(a.event);
      return null;
    case 'innerText':
      return await locate(page, a.locator).innerText();
    case 'inputValue':
      return await locate(page, a.locator).inputValue();
    case 'screenshot':
      return (await page.screenshot()).toString('base64');
    case 'closePage':
      await page.context().close();
      pages.delete(a.page);
      return null;
    case 'shutdown':
      if (browser) await browser.close();
      return null;
    default:
      throw new Error(`unknown op ${op}`);
  }
}

const rl = readline.createInterface({ input: process.stdin });
rl.on('line', async (line) => {
  let req;
  try {
    req = JSON.parse(line);
  } catch (e) {
    console.error(`bad request: ${line}`);
    return;
  }
  let reply;
  try {
    reply = { id: req.id, ok: true, result: await handle(req.op, req.args || {}) };
  } catch (e) {
    reply = { id: req.id, ok: false, error: String((e && e.message) || e) };
  }
  process.stdout.write(JSON.stringify(reply) + '\n');
  if (req.op === 'shutdown') process.exit(0);
});
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser '{}'", other)),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Node executable used to run the bridge
    pub node_binary: PathBuf,

    /// Directory whose node_modules provides `playwright`
    pub working_dir: PathBuf,

    pub launch_timeout_ms: u64,

    /// Default timeout for each Playwright action
    pub action_timeout_ms: u64,
}

impl PlaywrightConfig {
    /// How long to wait for the bridge to answer one request
    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms.max(self.launch_timeout_ms) + 5_000)
    }
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: PathBuf::from("node"),
            working_dir: PathBuf::from("."),
            launch_timeout_ms: 30_000,
            action_timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    op: &'a str,
    args: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

type Pending = Arc<parking_lot::Mutex<HashMap<u64, oneshot::Sender<BridgeResponse>>>>;

struct BridgeInner {
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    child: parking_lot::Mutex<Option<Child>>,
    request_timeout: Duration,
    // Holds the bridge script on disk for the lifetime of the process.
    _script_dir: tempfile::TempDir,
}

impl BridgeInner {
    async fn call(&self, op: &str, args: Value) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let mut line = serde_json::to_string(&BridgeRequest { id, op, args })?;
        line.push('\n');

        let written = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.pending.lock().remove(&id);
            return Err(E2eError::Playwright(format!("bridge stdin closed: {}", e)));
        }

        let response = match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(E2eError::Playwright("bridge process exited".into())),
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(E2eError::timeout(format!(
                    "playwright {} ({} ms)",
                    op,
                    self.request_timeout.as_millis()
                )));
            }
        };

        if response.ok {
            Ok(response.result)
        } else {
            Err(E2eError::Playwright(format!(
                "{}: {}",
                op,
                response.error.unwrap_or_else(|| "unknown error".into())
            )))
        }
    }

    /// SIGTERM first, then kill
    fn terminate(&self) {
        let Some(mut child) = self.child.lock().take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        let _ = child.start_kill();
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Handle to the running Playwright bridge process
#[derive(Clone)]
pub struct PlaywrightBridge {
    inner: Arc<BridgeInner>,
    next_page: Arc<AtomicU64>,
}

impl PlaywrightBridge {
    /// Start the bridge and launch the configured browser
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(&config)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        let bridge_config = serde_json::to_string(&config)?;
        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .arg(bridge_config)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::Playwright(format!(
                    "failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("bridge stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[playwright] {}", line);
                }
            });
        }

        let pending: Pending = Arc::new(parking_lot::Mutex::new(HashMap::new()));
        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<BridgeResponse>(&line) {
                    Ok(response) => {
                        if let Some(tx) = reader_pending.lock().remove(&response.id) {
                            let _ = tx.send(response);
                        }
                    }
                    Err(e) => warn!("Unparseable bridge output ({}): {}", e, line),
                }
            }
            // Dropping the senders fails every outstanding request.
            reader_pending.lock().clear();
        });

        let bridge = Self {
            inner: Arc::new(BridgeInner {
                stdin: tokio::sync::Mutex::new(stdin),
                pending,
                next_id: AtomicU64::new(1),
                child: parking_lot::Mutex::new(Some(child)),
                request_timeout: config.request_timeout(),
                _script_dir: script_dir,
            }),
            next_page: Arc::new(AtomicU64::new(1)),
        };

        bridge.inner.call("launch", json!({})).await?;
        info!(
            "Launched {} (headless: {})",
            config.browser.as_str(),
            config.headless
        );
        Ok(bridge)
    }

    /// Check if Playwright is installed
    pub fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let output = Command::new("npx")
            .args(["playwright", "--version"])
            .current_dir(&config.working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match output {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Close the browser and stop the bridge process
    pub async fn shutdown(&self) -> E2eResult<()> {
        let closed = self.inner.call("shutdown", json!({})).await;
        self.inner.terminate();
        closed.map(|_| ())
    }
}

#[async_trait]
impl PageFactory for PlaywrightBridge {
    async fn new_page(&self) -> E2eResult<Box<dyn BrowserPage>> {
        let id = self.next_page.fetch_add(1, Ordering::SeqCst);
        self.inner.call("newPage", json!({ "pageId": id })).await?;
        Ok(Box::new(PlaywrightPage {
            bridge: self.inner.clone(),
            id,
        }))
    }
}

/// One browser context + page inside the bridge
pub struct PlaywrightPage {
    bridge: Arc<BridgeInner>,
    id: u64,
}

impl PlaywrightPage {
    async fn call(&self, op: &str, mut args: Value) -> E2eResult<Value> {
        args["page"] = json!(self.id);
        self.bridge.call(op, args).await
    }

    async fn call_text(&self, op: &str, args: Value) -> E2eResult<String> {
        match self.call(op, args).await? {
            Value::String(s) => Ok(s),
            other => Err(E2eError::Playwright(format!(
                "{} returned non-text value: {}",
                op, other
            ))),
        }
    }
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn navigate(&self, url: &str) -> E2eResult<()> {
        self.call("goto", json!({ "url": url })).await.map(|_| ())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout_ms: u64) -> E2eResult<()> {
        self.call(
            "waitForLoadState",
            json!({ "state": state.as_str(), "timeout": timeout_ms }),
        )
        .await
        .map(|_| ())
    }

    async fn locate(&self, target: &Locator) -> E2eResult<Option<ElementState>> {
        let value = self.call("locate", json!({ "locator": target })).await?;
        if value.is_null() {
            Ok(None)
        } else {
            Ok(Some(serde_json::from_value(value)?))
        }
    }

    async fn click(&self, target: &Locator) -> E2eResult<()> {
        self.call("click", json!({ "locator": target })).await.map(|_| ())
    }

    async fn press(&self, target: Option<&Locator>, key: &str) -> E2eResult<()> {
        self.call("press", json!({ "locator": target, "key": key }))
            .await
            .map(|_| ())
    }

    async fn set_text(&self, target: &Locator, text: &str) -> E2eResult<()> {
        self.call("fill", json!({ "locator": target, "text": text }))
            .await
            .map(|_| ())
    }

    async fn dispatch_event(&self, target: &Locator, event: &str) -> E2eResult<()> {
        self.call("dispatchEvent", json!({ "locator": target, "event": event }))
            .await
            .map(|_| ())
    }

    async fn read_text(&self, target: &Locator) -> E2eResult<String> {
        self.call_text("innerText", json!({ "locator": target })).await
    }

    async fn input_value(&self, target: &Locator) -> E2eResult<String> {
        self.call_text("inputValue", json!({ "locator": target })).await
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        let encoded = self.call_text("screenshot", json!({})).await?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| E2eError::Playwright(format!("screenshot payload: {}", e)))
    }

    async fn close(&self) -> E2eResult<()> {
        self.call("closePage", json!({})).await.map(|_| ())
    }
}
