//! In-memory [`BrowserDriver`] that records every call.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::driver::{
    BrowserDriver, HistoryDirection, HistoryOutcome, KeyEvent, MouseEvent, TabId, TabInfo,
};
use crate::error::BrowserError;
use crate::human::cursor::blank_png;
use crate::types::Dimensions;

#[derive(Debug, Clone)]
pub(crate) struct FakeTab {
    pub id: TabId,
    pub history: Vec<(String, String)>,
    pub position: usize,
}

impl FakeTab {
    fn current(&self) -> (String, String) {
        self.history[self.position].clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Open(String),
    Activate(TabId),
    Navigate(TabId, String),
    History(TabId, HistoryDirection),
    Reload(TabId),
    Screenshot(TabId),
    Mouse(MouseEvent),
    Key(KeyEvent),
    Text(String),
    Close,
}

#[derive(Default)]
pub(crate) struct FakeDriver {
    pub tabs: Mutex<Vec<FakeTab>>,
    pub calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
    /// Remaining screenshot calls that fail before one succeeds.
    pub failing_screenshots: AtomicUsize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Page title served for a URL: `Title of <url>`.
    pub fn title_for(url: &str) -> String {
        format!("Title of {url}")
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn mouse_events(&self) -> Vec<MouseEvent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Mouse(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn key_events(&self) -> Vec<KeyEvent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Key(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Close a tab behind the session's back, as a user or page script would.
    pub fn close_tab(&self, index: usize) {
        self.tabs.lock().remove(index);
    }

    fn with_tab<T>(&self, id: &TabId, f: impl FnOnce(&mut FakeTab) -> T) -> Result<T, BrowserError> {
        let mut tabs = self.tabs.lock();
        let tab = tabs
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| BrowserError::TabNotFound(id.clone()))?;
        Ok(f(tab))
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    fn dimensions(&self) -> Dimensions {
        Dimensions::default()
    }

    async fn open_tab(&self, url: &str) -> Result<TabId, BrowserError> {
        self.record(Call::Open(url.to_string()));
        let id = format!("tab-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.tabs.lock().push(FakeTab {
            id: id.clone(),
            history: vec![(url.to_string(), Self::title_for(url))],
            position: 0,
        });
        Ok(id)
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>, BrowserError> {
        Ok(self
            .tabs
            .lock()
            .iter()
            .map(|t| {
                let (url, title) = t.current();
                TabInfo {
                    id: t.id.clone(),
                    title,
                    url,
                }
            })
            .collect())
    }

    async fn activate(&self, tab: &TabId) -> Result<(), BrowserError> {
        self.record(Call::Activate(tab.clone()));
        self.with_tab(tab, |_| ())
    }

    async fn navigate(&self, tab: &TabId, url: &str) -> Result<(), BrowserError> {
        self.record(Call::Navigate(tab.clone(), url.to_string()));
        self.with_tab(tab, |t| {
            t.history.truncate(t.position + 1);
            t.history.push((url.to_string(), Self::title_for(url)));
            t.position = t.history.len() - 1;
        })
    }

    async fn history(
        &self,
        tab: &TabId,
        direction: HistoryDirection,
    ) -> Result<HistoryOutcome, BrowserError> {
        self.record(Call::History(tab.clone(), direction));
        self.with_tab(tab, |t| match direction {
            HistoryDirection::Back if t.position > 0 => {
                t.position -= 1;
                HistoryOutcome::Navigated
            }
            HistoryDirection::Forward if t.position + 1 < t.history.len() => {
                t.position += 1;
                HistoryOutcome::Navigated
            }
            _ => HistoryOutcome::NoPreviousEntry,
        })
    }

    async fn reload(&self, tab: &TabId) -> Result<(), BrowserError> {
        self.record(Call::Reload(tab.clone()));
        self.with_tab(tab, |_| ())
    }

    async fn screenshot(&self, tab: &TabId) -> Result<Vec<u8>, BrowserError> {
        self.record(Call::Screenshot(tab.clone()));
        self.with_tab(tab, |_| ())?;
        let failing = self.failing_screenshots.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_screenshots.store(failing - 1, Ordering::SeqCst);
            return Err(BrowserError::Driver("screenshot failed".to_string()));
        }
        Ok(blank_png(64, 48))
    }

    async fn dispatch_mouse(&self, tab: &TabId, event: MouseEvent) -> Result<(), BrowserError> {
        self.with_tab(tab, |_| ())?;
        self.record(Call::Mouse(event));
        Ok(())
    }

    async fn dispatch_key(&self, tab: &TabId, event: KeyEvent) -> Result<(), BrowserError> {
        self.with_tab(tab, |_| ())?;
        self.record(Call::Key(event));
        Ok(())
    }

    async fn insert_text(&self, tab: &TabId, text: &str) -> Result<(), BrowserError> {
        self.with_tab(tab, |_| ())?;
        self.record(Call::Text(text.to_string()));
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.record(Call::Close);
        self.tabs.lock().clear();
        Ok(())
    }
}
