//! One MAL account: its local directory, its settings and the lazily created
//! sessions every update shares.

use anyhow::{anyhow, Result};
use colored::Colorize;

use crate::config::SyncConfig;
use crate::credentials::{get_or_prompt_client_id, get_or_prompt_credentials, Credentials};
use crate::list_type::ListType;
use crate::localdir::LocalDir;
use crate::records::{ForumTopic, HistoryRecord, MessageThread};
use crate::store::{EntryStore, MergedStore, ShardedStore};
use crate::sync::{
    update_api_list, update_friends, update_list, BrowserHistorySource, BrowserMessageSource, ForumSync,
    HistoryCandidates, HistorySync, MessageSync, SyncReport,
};
use crate::transport::{Browser, HttpClient, MalApiSession, WebDriverBrowser};

/// Knobs accepted by the `update` commands
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub only: Option<ListType>,
    /// Cap on ids taken from the recent-history page
    pub count: Option<usize>,
    pub use_merged_file: bool,
    pub start_page: Option<usize>,
    /// Overrides the thread till-same limit
    pub thread_count: Option<usize>,
}

/// Result of `update_all`: what succeeded and which steps failed
#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub reports: Vec<SyncReport>,
    pub failures: Vec<(String, anyhow::Error)>,
}

impl UpdateSummary {
    pub fn record(&mut self, step: &str, outcome: Result<Vec<SyncReport>>) {
        match outcome {
            Ok(reports) => self.reports.extend(reports),
            Err(e) => {
                log::error!("{} failed: {:#}", step, e);
                self.failures.push((step.to_string(), e));
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn print(&self) {
        for report in &self.reports {
            report.print_summary();
        }
        for (step, e) in &self.failures {
            println!("{} {}: {:#}", "✗".red(), step.bold(), e);
        }
    }
}

pub struct Account {
    pub localdir: LocalDir,
    pub config: SyncConfig,
    browser: Option<Box<dyn Browser>>,
    credentials: Option<Credentials>,
    api_session: Option<MalApiSession>,
}

impl Account {
    pub fn new(localdir: LocalDir, config: SyncConfig) -> Self {
        Self {
            localdir,
            config,
            browser: None,
            credentials: None,
            api_session: None,
        }
    }

    /// Default directories and `config.toml` (with environment overrides)
    pub fn from_username(username: &str) -> Result<Self> {
        Ok(Self::new(LocalDir::from_username(username)?, SyncConfig::load()?))
    }

    /// Use this browser and these credentials instead of starting a
    /// WebDriver session and reading the stored ones
    pub fn with_browser(mut self, browser: Box<dyn Browser>, credentials: Credentials) -> Self {
        self.browser = Some(browser);
        self.credentials = Some(credentials);
        self
    }

    pub fn username(&self) -> &str {
        &self.localdir.username
    }

    /// The browser, started on first use, together with the login details
    fn browser_session(&mut self) -> Result<(&mut dyn Browser, &Credentials)> {
        if self.credentials.is_none() {
            self.credentials = Some(get_or_prompt_credentials(&self.localdir)?);
        }
        if self.browser.is_none() {
            self.browser = Some(Box::new(WebDriverBrowser::connect(&self.config)?));
        }
        match (self.browser.as_deref_mut(), self.credentials.as_ref()) {
            (Some(browser), Some(credentials)) => Ok((browser, credentials)),
            _ => Err(anyhow!("browser session was not started")),
        }
    }

    fn api_session(&mut self) -> Result<&mut MalApiSession> {
        if self.api_session.is_none() {
            let client = get_or_prompt_client_id(&self.localdir)?;
            let http = HttpClient::new(&self.config, None)?;
            let mut session = MalApiSession::new(http, client.client_id, self.localdir.refresh_info_path());
            session.authenticate()?;
            self.api_session = Some(session);
        }
        self.api_session
            .as_mut()
            .ok_or_else(|| anyhow!("API session was not started"))
    }

    /// Replace `{type}list.json` with the full `load.json` list
    pub fn update_lists(&mut self, only: Option<ListType>) -> Result<Vec<SyncReport>> {
        let mut http = HttpClient::new(&self.config, Some(&self.config.list_user_agent))?;
        let mut reports = Vec::new();
        for list_type in ListType::selected(only) {
            log::info!("Updating {} list for {}", list_type, self.username());
            let path = self.localdir.list_path(list_type);
            reports.push(update_list(&mut http, list_type, &self.localdir.username, &path)?);
        }
        Ok(reports)
    }

    /// Replace `{type}list_api.json` through the authenticated API
    pub fn update_api_lists(&mut self, only: Option<ListType>) -> Result<Vec<SyncReport>> {
        let username = self.localdir.username.clone();
        let paths: Vec<_> = ListType::selected(only)
            .into_iter()
            .map(|lt| (lt, self.localdir.api_list_path(lt)))
            .collect();
        let session = self.api_session()?;
        let mut reports = Vec::new();
        for (list_type, path) in paths {
            log::info!("Updating {} API list for {}", list_type, username);
            reports.push(update_api_list(&mut *session, list_type, &username, &path)?);
        }
        Ok(reports)
    }

    /// Refresh episode/chapter history. Needs a list file or an XML export
    /// for each list type; that is checked before the browser starts.
    pub fn update_history(
        &mut self,
        only: Option<ListType>,
        count: Option<usize>,
        use_merged_file: bool,
    ) -> Result<Vec<SyncReport>> {
        let mut planned = Vec::new();
        for list_type in ListType::selected(only) {
            planned.push((list_type, HistoryCandidates::load(&self.localdir, list_type)?));
        }

        let till_same_limit = self.config.history_till_same_limit;
        let flush_every = self.config.merged_flush_every;
        let mut stores: Vec<Box<dyn EntryStore<HistoryRecord>>> = Vec::new();
        for (list_type, _) in &planned {
            let store: Box<dyn EntryStore<HistoryRecord>> = if use_merged_file {
                Box::new(MergedStore::<HistoryRecord>::open(self.localdir.merged_history_path(*list_type), flush_every)?)
            } else {
                Box::new(ShardedStore::<HistoryRecord>::open(self.localdir.history_dir(*list_type))?)
            };
            stores.push(store);
        }

        let (browser, credentials) = self.browser_session()?;
        let mut source = BrowserHistorySource::new(browser, credentials);
        let mut reports = Vec::new();
        for ((list_type, candidates), store) in planned.into_iter().zip(stores.iter_mut()) {
            let report = HistorySync::new(list_type, &mut source, store.as_mut(), till_same_limit)
                .run(candidates, count)?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// Refresh forum topics the user created or posted in
    pub fn update_forum_posts(&mut self) -> Result<Vec<SyncReport>> {
        let username = self.localdir.username.clone();
        let index_path = self.localdir.forum_index_path();
        let limit = self.config.forum_till_same_limit;
        let mut store: ShardedStore<ForumTopic> = ShardedStore::open(self.localdir.forum_dir())?;
        let session = self.api_session()?;
        let report = ForumSync::new(session, &mut store, index_path)
            .with_till_same_limit(limit)
            .run(&username)?;
        Ok(vec![report])
    }

    pub fn update_friends(&mut self) -> Result<Vec<SyncReport>> {
        let mut http = HttpClient::new(&self.config, None)?;
        let path = self.localdir.friends_path();
        Ok(vec![update_friends(&mut http, &self.localdir.username, &path)?])
    }

    /// Refresh message threads, newest first, starting at `start_page`
    pub fn update_messages(
        &mut self,
        start_page: Option<usize>,
        thread_count: Option<usize>,
    ) -> Result<Vec<SyncReport>> {
        let limit = thread_count.unwrap_or(self.config.thread_till_same_limit);
        let mut store: ShardedStore<MessageThread> = ShardedStore::open(self.localdir.messages_dir())?;
        let (browser, credentials) = self.browser_session()?;
        let mut source = BrowserMessageSource::new(browser, credentials);
        let report = MessageSync::new(&mut source, &mut store, limit).run(start_page.unwrap_or(1))?;
        Ok(vec![report])
    }

    /// Run every update. A failing step is recorded and the rest still run.
    pub fn update_all(&mut self, options: &UpdateOptions) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let outcome = self.update_lists(options.only);
        summary.record("lists", outcome);
        let outcome = self.update_api_lists(options.only);
        summary.record("api lists", outcome);
        let outcome = self.update_history(options.only, options.count, options.use_merged_file);
        summary.record("history", outcome);
        let outcome = self.update_forum_posts();
        summary.record("forum", outcome);
        let outcome = self.update_friends();
        summary.record("friends", outcome);
        let outcome = self.update_messages(options.start_page, options.thread_count);
        summary.record("messages", outcome);
        summary
    }
}
