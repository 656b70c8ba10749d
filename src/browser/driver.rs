use async_trait::async_trait;

use crate::error::BrowserError;
use crate::types::{Dimensions, MouseButton};

/// Opaque identifier of a tab, stable for the tab's lifetime.
pub type TabId = String;

/// Live state of one tab as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryDirection {
    Back,
    Forward,
}

/// Whether a history navigation had somewhere to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOutcome {
    Navigated,
    NoPreviousEntry,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseEventKind {
    Move,
    Press,
    Release,
    Wheel { delta_x: f64, delta_y: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub x: i32,
    pub y: i32,
    /// `None` for moves and wheel events.
    pub button: Option<MouseButton>,
    pub click_count: u32,
    pub modifiers: u32,
}

impl MouseEvent {
    pub fn moved(x: i32, y: i32, modifiers: u32) -> Self {
        Self {
            kind: MouseEventKind::Move,
            x,
            y,
            button: None,
            click_count: 0,
            modifiers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub key: String,
    pub code: String,
    pub key_code: u32,
    pub text: Option<String>,
    pub modifiers: u32,
}

/// Low-level automation backend the session drives.
///
/// Every method is a single round trip; timeouts, retries and active-tab
/// bookkeeping are the session's business.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    fn dimensions(&self) -> Dimensions;

    /// Open a tab and load `url` in it.
    async fn open_tab(&self, url: &str) -> Result<TabId, BrowserError>;

    /// Open tabs in browser order.
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, BrowserError>;

    async fn activate(&self, tab: &TabId) -> Result<(), BrowserError>;

    async fn navigate(&self, tab: &TabId, url: &str) -> Result<(), BrowserError>;

    async fn history(
        &self,
        tab: &TabId,
        direction: HistoryDirection,
    ) -> Result<HistoryOutcome, BrowserError>;

    async fn reload(&self, tab: &TabId) -> Result<(), BrowserError>;

    /// Raw PNG of the tab's viewport.
    async fn screenshot(&self, tab: &TabId) -> Result<Vec<u8>, BrowserError>;

    async fn dispatch_mouse(&self, tab: &TabId, event: MouseEvent) -> Result<(), BrowserError>;

    async fn dispatch_key(&self, tab: &TabId, event: KeyEvent) -> Result<(), BrowserError>;

    /// Insert text as if typed, without individual key events.
    async fn insert_text(&self, tab: &TabId, text: &str) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;
}
