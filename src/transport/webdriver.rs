use rand::Rng as _;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::thread;
use std::time::Duration;

use super::{Browser, Locator};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// W3C key under which element references are returned
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Which browser the WebDriver server drives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverType {
    #[default]
    Chrome,
    Firefox,
}

impl fmt::Display for DriverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverType::Chrome => write!(f, "chrome"),
            DriverType::Firefox => write!(f, "firefox"),
        }
    }
}

impl DriverType {
    /// `capabilities` body for a new session
    pub fn capabilities(&self, headless: bool) -> Value {
        match self {
            DriverType::Chrome => {
                let args: Vec<&str> = if headless {
                    vec!["headless", "window-size=1920x1080", "disable-gpu"]
                } else {
                    vec![]
                };
                json!({"capabilities": {"alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {"args": args}
                }}})
            }
            DriverType::Firefox => {
                let args: Vec<&str> = if headless { vec!["-headless"] } else { vec![] };
                json!({"capabilities": {"alwaysMatch": {
                    "browserName": "firefox",
                    "moz:firefoxOptions": {"args": args}
                }}})
            }
        }
    }
}

/// A browser session driven through a WebDriver server (chromedriver or
/// geckodriver) over its HTTP protocol. The session is closed on drop.
pub struct WebDriverBrowser {
    client: Client,
    base: String,
    session_id: String,
    wait_secs: f64,
    logged_in: bool,
}

impl WebDriverBrowser {
    /// Start a new browser session on the configured WebDriver server
    pub fn connect(config: &SyncConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SyncError::Precondition(format!("failed to build HTTP client: {e}")))?;
        let base = config.webdriver_url.trim_end_matches('/').to_string();
        let url = format!("{base}/session");
        log::info!("Starting {} session at {}", config.driver_type, base);

        let value = send(
            client.post(&url).json(&config.driver_type.capabilities(config.headless)),
            &url,
        )
        .map_err(|e| match e {
            SyncError::Transient { url, message } => SyncError::Precondition(format!(
                "could not start a browser session at {url} (is the driver running?): {message}"
            )),
            other => other,
        })?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::transient(&url, "no sessionId in new session response"))?
            .to_string();
        log::debug!("WebDriver session {}", session_id);

        Ok(Self {
            client,
            base,
            session_id,
            wait_secs: config.browser_wait_secs,
            logged_in: false,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base, self.session_id, path)
    }

    fn get(&self, path: &str) -> SyncResult<Value> {
        let url = self.endpoint(path);
        send(self.client.get(&url), &url)
    }

    fn post(&self, path: &str, body: Value) -> SyncResult<Value> {
        let url = self.endpoint(path);
        send(self.client.post(&url).json(&body), &url)
    }

    fn element_ids(&self, locator: &Locator) -> SyncResult<Vec<String>> {
        let value = self.post(
            "/elements",
            json!({"using": locator.strategy(), "value": locator.value()}),
        )?;
        Ok(value
            .as_array()
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn first_element(&self, locator: &Locator) -> SyncResult<String> {
        self.element_ids(locator)?.into_iter().next().ok_or_else(|| {
            SyncError::transient(self.endpoint("/elements"), format!("no element matches {}", locator.value()))
        })
    }

    fn polite_wait(&self) {
        let secs = self.wait_secs + rand::thread_rng().gen::<f64>() * 4.0 - 1.0;
        if secs > 0.0 {
            thread::sleep(Duration::from_secs_f64(secs));
        }
    }
}

/// Send a WebDriver command and unwrap its `value`
fn send(builder: RequestBuilder, url: &str) -> SyncResult<Value> {
    let response = builder.send().map_err(|e| SyncError::transient(url, e))?;
    let status = response.status();
    let mut body: Value = response
        .json()
        .map_err(|e| SyncError::transient(url, format!("invalid WebDriver reply: {e}")))?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(value);
    }
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    Err(SyncError::transient(url, format!("{error}: {message}")))
}

impl Browser for WebDriverBrowser {
    fn navigate(&mut self, url: &str) -> SyncResult<()> {
        log::info!("Requesting {}", url);
        self.post("/url", json!({ "url": url }))?;
        self.polite_wait();
        Ok(())
    }

    fn current_url(&mut self) -> SyncResult<String> {
        let value = self.get("/url")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn find_texts(&mut self, locator: &Locator) -> SyncResult<Vec<String>> {
        self.element_ids(locator)?
            .iter()
            .map(|id| {
                let value = self.get(&format!("/element/{id}/text"))?;
                Ok(value.as_str().unwrap_or_default().to_string())
            })
            .collect()
    }

    fn find_attributes(&mut self, locator: &Locator, name: &str) -> SyncResult<Vec<String>> {
        let mut values = Vec::new();
        for id in self.element_ids(locator)? {
            let value = self.get(&format!("/element/{id}/attribute/{name}"))?;
            if let Some(s) = value.as_str() {
                values.push(s.to_string());
            }
        }
        Ok(values)
    }

    fn find_html(&mut self, locator: &Locator) -> SyncResult<Vec<String>> {
        self.element_ids(locator)?
            .iter()
            .map(|id| {
                let value = self.get(&format!("/element/{id}/property/outerHTML"))?;
                Ok(value.as_str().unwrap_or_default().to_string())
            })
            .collect()
    }

    fn submit_form(&mut self, fields: &[(Locator, &str)], submit: &Locator) -> SyncResult<()> {
        thread::sleep(Duration::from_secs(1));
        for (locator, text) in fields {
            let id = self.first_element(locator)?;
            self.post(&format!("/element/{id}/value"), json!({ "text": text }))?;
            thread::sleep(Duration::from_secs(1));
        }
        // clicked through a script so a small window cannot hide the button
        let button = self.first_element(submit)?;
        self.post(
            "/execute/sync",
            json!({"script": "arguments[0].click()", "args": [{ ELEMENT_KEY: button }]}),
        )?;
        self.polite_wait();
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn mark_logged_in(&mut self, logged_in: bool) {
        self.logged_in = logged_in;
    }
}

impl Drop for WebDriverBrowser {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.base, self.session_id);
        if let Err(e) = self.client.delete(&url).send() {
            log::warn!("Failed to close browser session {}: {}", self.session_id, e);
        }
    }
}
