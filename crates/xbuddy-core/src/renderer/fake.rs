//! Scripted renderer for tests

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{BrowserSession, CapturedDownload, Renderer};
use crate::debug_log::EventSink;
use crate::error::{Result, XbuddyError};

/// What a click on a selector produces
#[derive(Debug, Clone)]
pub(crate) enum ClickScript {
    /// Writes `bytes` to `dest_dir/name`
    Download { name: String, bytes: Vec<u8> },
    Nothing,
    Fail,
}

#[derive(Debug, Default)]
pub(crate) struct FakeRenderer {
    /// HTML served per navigated URL (prefix match)
    pub pages: HashMap<String, String>,
    /// Selectors with a scripted click, present regardless of page
    pub present: Vec<String>,
    pub clicks: HashMap<String, ClickScript>,
    pub fail_launch: bool,
    pub fail_navigate: bool,
    pub launches: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub navigations: Arc<Mutex<Vec<String>>>,
    pub clicked: Arc<Mutex<Vec<String>>>,
}

impl FakeRenderer {
    pub fn with_page(mut self, url_prefix: &str, html: &str) -> Self {
        self.pages.insert(url_prefix.to_string(), html.to_string());
        self
    }

    pub fn with_click(mut self, selector: &str, script: ClickScript) -> Self {
        self.present.push(selector.to_string());
        self.clicks.insert(selector.to_string(), script);
        self
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub(crate) struct FakeSession {
    pages: HashMap<String, String>,
    present: Vec<String>,
    clicks: HashMap<String, ClickScript>,
    fail_navigate: bool,
    current: Option<String>,
    closes: Arc<AtomicUsize>,
    navigations: Arc<Mutex<Vec<String>>>,
    clicked: Arc<Mutex<Vec<String>>>,
}

impl FakeSession {
    fn current_html(&self) -> Option<&String> {
        let current = self.current.as_ref()?;
        self.pages
            .iter()
            .find(|(prefix, _)| current.starts_with(prefix.as_str()))
            .map(|(_, html)| html)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    type Session = FakeSession;

    async fn launch(&self, _user_agent: &str, _events: EventSink) -> Result<FakeSession> {
        if self.fail_launch {
            return Err(XbuddyError::Browser("launch failed".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            pages: self.pages.clone(),
            present: self.present.clone(),
            clicks: self.clicks.clone(),
            fail_navigate: self.fail_navigate,
            current: None,
            closes: self.closes.clone(),
            navigations: self.navigations.clone(),
            clicked: self.clicked.clone(),
        })
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        if self.fail_navigate {
            return Err(XbuddyError::Browser("navigation failed".to_string()));
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.has_element(selector).await
    }

    async fn has_element(&mut self, selector: &str) -> Result<bool> {
        if self.present.iter().any(|s| s == selector) {
            return Ok(true);
        }
        let Some(html) = self.current_html() else {
            return Ok(false);
        };
        let document = scraper::Html::parse_document(html);
        let selector = scraper::Selector::parse(selector)
            .map_err(|e| XbuddyError::Browser(format!("{:?}", e)))?;
        Ok(document.select(&selector).next().is_some())
    }

    async fn content(&mut self) -> Result<String> {
        self.current_html()
            .cloned()
            .ok_or_else(|| XbuddyError::Browser("no page loaded".to_string()))
    }

    async fn click_for_download(
        &mut self,
        selector: &str,
        dest_dir: &Path,
        _timeout: Duration,
    ) -> Result<Option<CapturedDownload>> {
        self.clicked.lock().unwrap().push(selector.to_string());
        match self.clicks.get(selector).cloned() {
            Some(ClickScript::Download { name, bytes }) => {
                std::fs::create_dir_all(dest_dir)?;
                let path = dest_dir.join(&name);
                std::fs::write(&path, bytes)?;
                Ok(Some(CapturedDownload {
                    path,
                    url: self.current.clone().unwrap_or_default(),
                }))
            }
            Some(ClickScript::Fail) => Err(XbuddyError::Browser("click failed".to_string())),
            Some(ClickScript::Nothing) | None => Ok(None),
        }
    }

    async fn close(self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
