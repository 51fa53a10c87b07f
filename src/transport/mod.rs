//! The two ways the sync engine talks to the site: a JSON API (plain or
//! OAuth-authenticated REST) and a logged-in browser session.
//!
//! Strategies only see the [`JsonApi`] and [`Browser`] traits, so tests can
//! drive them with in-memory fakes.

mod http;
mod oauth;
mod webdriver;

pub use http::{classify_status, HttpClient};
pub use oauth::{MalApiSession, TokenInfo};
pub use webdriver::{DriverType, WebDriverBrowser};

use serde_json::Value;
use std::time::{Duration, Instant};

use crate::credentials::Credentials;
use crate::error::{SyncError, SyncResult};
use crate::list_type::ResourceKind;
use crate::paginator::{ConvergingPaginator, Page};

pub const LOGIN_PAGE: &str = "https://myanimelist.net/login.php";
const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// A JSON-over-HTTP endpoint
pub trait JsonApi {
    /// GET `url` and decode the body. Transient failures have already been
    /// retried by the time an error is returned.
    fn get_json(&mut self, url: &str) -> SyncResult<Value>;
}

impl<T: JsonApi + ?Sized> JsonApi for &mut T {
    fn get_json(&mut self, url: &str) -> SyncResult<Value> {
        (**self).get_json(url)
    }
}

/// Iterate the `data` payload of every page of a cursor-paginated API
/// response (`{"data": ..., "paging": {"next": url}}`).
pub fn api_pages<'a, A>(api: &'a mut A, first_url: &str) -> impl Iterator<Item = SyncResult<Value>> + 'a
where
    A: JsonApi + ?Sized,
{
    ConvergingPaginator::cursor(first_url.to_string(), move |url: &String| {
        let mut resp = api.get_json(url)?;
        let next = resp
            .pointer("/paging/next")
            .and_then(Value::as_str)
            .map(str::to_string);
        let data = resp
            .get_mut("data")
            .map(Value::take)
            .ok_or_else(|| {
                SyncError::parse(ResourceKind::ApiResponse, None, format!("{url}: response has no 'data' field"))
            })?;
        Ok(Page::new(vec![data], next))
    })
}

/// How to find elements on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
    PartialLinkText(String),
}

impl Locator {
    pub fn css(s: impl Into<String>) -> Self {
        Locator::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Locator::XPath(s.into())
    }

    /// Strategy name used by the WebDriver protocol
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css selector",
            Locator::XPath(_) => "xpath",
            Locator::PartialLinkText(_) => "partial link text",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Css(v) | Locator::XPath(v) | Locator::PartialLinkText(v) => v,
        }
    }
}

/// A stateful browser session. One navigation at a time; the session holds
/// login cookies and the current page.
pub trait Browser {
    fn navigate(&mut self, url: &str) -> SyncResult<()>;

    fn current_url(&mut self) -> SyncResult<String>;

    /// Rendered text of every matching element
    fn find_texts(&mut self, locator: &Locator) -> SyncResult<Vec<String>>;

    /// Value of attribute `name` on every matching element that has it
    fn find_attributes(&mut self, locator: &Locator, name: &str) -> SyncResult<Vec<String>>;

    /// Outer HTML of every matching element
    fn find_html(&mut self, locator: &Locator) -> SyncResult<Vec<String>>;

    /// Type `fields` into their inputs and click `submit`
    fn submit_form(&mut self, fields: &[(Locator, &str)], submit: &Locator) -> SyncResult<()>;

    /// Session-scoped login marker
    fn is_logged_in(&self) -> bool;

    fn mark_logged_in(&mut self, logged_in: bool);

    /// Poll until some element matching `locator` contains `text`.
    fn wait_for_text(&mut self, locator: &Locator, text: &str, timeout: Duration) -> SyncResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.find_texts(locator)?.iter().any(|t| t.contains(text)) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let url = self.current_url().unwrap_or_default();
                return Err(SyncError::transient(
                    url,
                    format!("timed out waiting for '{}' in {}", text, locator.value()),
                ));
            }
            std::thread::sleep(Duration::from_millis(250));
        }
    }
}

/// Log the browser in with the site's login form, unless it already is.
pub fn login(browser: &mut dyn Browser, creds: &Credentials) -> SyncResult<()> {
    if browser.is_logged_in() {
        return Ok(());
    }
    log::info!("Logging in to MAL as {}...", creds.username);
    browser.navigate(LOGIN_PAGE)?;
    browser.submit_form(
        &[
            (Locator::css("#loginUserName"), creds.username.as_str()),
            (Locator::css("#login-password"), creds.password.as_str()),
        ],
        &Locator::css(".inputButton.btn-form-submit[value='Login']"),
    )?;
    browser.wait_for_text(&Locator::css("a.header-profile-link"), &creds.username, LOGIN_TIMEOUT)?;
    browser.mark_logged_in(true);
    Ok(())
}

/// Fail with `AuthExpired` if the last navigation bounced to the login page.
pub fn ensure_session(browser: &mut dyn Browser) -> SyncResult<()> {
    let url = browser.current_url()?;
    if url.contains("/login.php") {
        browser.mark_logged_in(false);
        return Err(SyncError::AuthExpired(format!("redirected to {url}")));
    }
    Ok(())
}
