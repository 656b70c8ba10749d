//! The live browser session: tab set, active tab and cursor, driven with
//! human-looking timing.

pub mod chrome;
pub mod driver;
#[cfg(test)]
pub(crate) mod fake;
pub mod keys;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use chrome::{ChromeDriver, ChromeOptions};
pub use driver::{
    BrowserDriver, HistoryDirection, HistoryOutcome, KeyEvent, KeyEventKind, MouseEvent,
    MouseEventKind, TabId, TabInfo,
};

use crate::error::BrowserError;
use crate::human::{self, TypingAction, cursor};
use crate::types::{Dimensions, MouseButton, Position, Tab};

pub const DEFAULT_START_URL: &str = "https://bing.com";
pub const DEFAULT_FALLBACK_URL: &str = "https://www.google.com";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Loaded in the first tab at launch.
    pub start_url: String,
    /// Opened when the active tab disappears and no other tab is left.
    pub fallback_url: String,
    /// Upper bound on any single driver call.
    pub call_timeout: Duration,
    /// Attempts for idempotent reads (tab list, screenshot).
    pub read_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            start_url: DEFAULT_START_URL.to_string(),
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            call_timeout: Duration::from_secs(30),
            read_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// One browser automation context shared by the executor and the dashboard.
///
/// Input and navigation run one at a time under `input`. Cursor, active tab
/// and held modifiers sit behind short synchronous locks so screenshots can be
/// taken while an action is in flight.
pub struct BrowserSession {
    driver: Arc<dyn BrowserDriver>,
    options: SessionOptions,
    dimensions: Dimensions,
    input: tokio::sync::Mutex<()>,
    cursor: Mutex<Position>,
    active: Mutex<Option<TabId>>,
    modifiers: Mutex<u32>,
}

impl BrowserSession {
    /// Open the first tab at the start URL with the cursor at the origin.
    pub async fn launch(
        driver: Arc<dyn BrowserDriver>,
        options: SessionOptions,
    ) -> Result<Self, BrowserError> {
        let session = Self {
            dimensions: driver.dimensions(),
            driver,
            options,
            input: tokio::sync::Mutex::new(()),
            cursor: Mutex::new(Position::default()),
            active: Mutex::new(None),
            modifiers: Mutex::new(0),
        };
        let tab = session
            .call(session.driver.open_tab(&session.options.start_url))
            .await?;
        info!(url = %session.options.start_url, "browser session ready");
        *session.active.lock() = Some(tab);
        Ok(session)
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn cursor_position(&self) -> Position {
        *self.cursor.lock()
    }

    // ---- tabs & navigation ----

    pub async fn tabs(&self) -> Result<Vec<Tab>, BrowserError> {
        Ok(self
            .live_tabs()
            .await?
            .into_iter()
            .enumerate()
            .map(|(index, t)| Tab {
                index,
                title: t.title,
                url: t.url,
            })
            .collect())
    }

    /// `None` before any tab has been opened, after `close`, or when every tab
    /// is gone.
    pub async fn current_tab(&self) -> Result<Option<Tab>, BrowserError> {
        let Some(active) = self.active_for_read().await? else {
            return Ok(None);
        };
        let tabs = self.live_tabs().await?;
        Ok(tabs
            .into_iter()
            .enumerate()
            .find(|(_, t)| t.id == active)
            .map(|(index, t)| Tab {
                index,
                title: t.title,
                url: t.url,
            }))
    }

    /// Open `url` in a new tab and make it active.
    pub async fn new_tab(&self, url: &str) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        info!(%url, "opening new tab");
        let tab = self.call(self.driver.open_tab(url)).await?;
        self.call(self.driver.activate(&tab)).await?;
        *self.active.lock() = Some(tab);
        Ok(())
    }

    /// Make the tab at `index` active. Out-of-range leaves the active tab alone.
    pub async fn switch_to_tab(&self, index: usize) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tabs = self.live_tabs().await?;
        let tab = tabs.get(index).ok_or(BrowserError::TabOutOfRange {
            index,
            count: tabs.len(),
        })?;
        self.call(self.driver.activate(&tab.id)).await?;
        debug!(index, url = %tab.url, "switched tab");
        *self.active.lock() = Some(tab.id.clone());
        Ok(())
    }

    pub async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        info!(%url, "navigating");
        self.call(self.driver.navigate(&tab, url)).await
    }

    pub async fn back(&self) -> Result<HistoryOutcome, BrowserError> {
        self.history(HistoryDirection::Back).await
    }

    pub async fn forward(&self) -> Result<HistoryOutcome, BrowserError> {
        self.history(HistoryDirection::Forward).await
    }

    async fn history(&self, direction: HistoryDirection) -> Result<HistoryOutcome, BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        let outcome = self.call(self.driver.history(&tab, direction)).await?;
        debug!(?direction, ?outcome, "history navigation");
        Ok(outcome)
    }

    pub async fn refresh(&self) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.call(self.driver.reload(&tab)).await
    }

    // ---- screenshots ----

    /// PNG of the active tab with the cursor marker drawn in. Empty when no tab
    /// is open.
    pub async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let Some(tab) = self.active_for_read().await? else {
            return Ok(Vec::new());
        };
        let png = match self.read_with_retry(|| self.driver.screenshot(&tab)).await {
            Ok(png) => png,
            Err(BrowserError::TabNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let at = self.cursor_position();
        tokio::task::spawn_blocking(move || cursor::composite(&png, at))
            .await
            .map_err(|e| BrowserError::Image(format!("compositing task panicked: {e}")))?
    }

    pub async fn screenshot_base64(&self) -> Result<String, BrowserError> {
        let png = self.screenshot().await?;
        if png.is_empty() {
            return Ok(String::new());
        }
        Ok(STANDARD.encode(png))
    }

    // ---- pointer ----

    /// Walk the cursor to (x, y) along a human-looking path.
    pub async fn move_to(&self, x: i32, y: i32) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.move_locked(&tab, Position::new(x, y)).await
    }

    async fn move_locked(&self, tab: &TabId, to: Position) -> Result<(), BrowserError> {
        let path = human::mouse_path(self.cursor_position(), to);
        for point in path {
            let event = MouseEvent::moved(point.x, point.y, self.held_modifiers());
            self.call(self.driver.dispatch_mouse(tab, event)).await?;
            *self.cursor.lock() = point.position();
            tokio::time::sleep(point.delay).await;
        }
        Ok(())
    }

    /// Click `count` times at the cursor.
    pub async fn click(&self, button: MouseButton, count: u32) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        for n in 1..=count.max(1) {
            self.button_locked(&tab, MouseEventKind::Press, button, n).await?;
            tokio::time::sleep(human::click_delay()).await;
            self.button_locked(&tab, MouseEventKind::Release, button, n).await?;
        }
        Ok(())
    }

    pub async fn double_click(&self) -> Result<(), BrowserError> {
        self.click(MouseButton::Left, 2).await
    }

    pub async fn mouse_down(&self, button: MouseButton) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.button_locked(&tab, MouseEventKind::Press, button, 1).await
    }

    pub async fn mouse_up(&self, button: MouseButton) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.button_locked(&tab, MouseEventKind::Release, button, 1).await
    }

    async fn button_locked(
        &self,
        tab: &TabId,
        kind: MouseEventKind,
        button: MouseButton,
        click_count: u32,
    ) -> Result<(), BrowserError> {
        let at = self.cursor_position();
        let event = MouseEvent {
            kind,
            x: at.x,
            y: at.y,
            button: Some(button),
            click_count,
            modifiers: self.held_modifiers(),
        };
        self.call(self.driver.dispatch_mouse(tab, event)).await
    }

    /// Mouse-wheel scroll at the cursor, in pixels.
    pub async fn scroll(&self, delta_x: i32, delta_y: i32) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        let at = self.cursor_position();
        let event = MouseEvent {
            kind: MouseEventKind::Wheel {
                delta_x: f64::from(delta_x),
                delta_y: f64::from(delta_y),
            },
            x: at.x,
            y: at.y,
            button: None,
            click_count: 0,
            modifiers: self.held_modifiers(),
        };
        self.call(self.driver.dispatch_mouse(&tab, event)).await
    }

    /// Press at the first point, move through the rest, release. Empty is a no-op.
    pub async fn drag(&self, path: &[Position]) -> Result<(), BrowserError> {
        let Some((first, rest)) = path.split_first() else {
            return Ok(());
        };
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.move_locked(&tab, *first).await?;
        self.button_locked(&tab, MouseEventKind::Press, MouseButton::Left, 1)
            .await?;
        for point in rest {
            self.move_locked(&tab, *point).await?;
        }
        self.button_locked(&tab, MouseEventKind::Release, MouseButton::Left, 1)
            .await
    }

    // ---- keyboard ----

    /// Type text with human timing, occasionally fixing a typo.
    pub async fn type_text(&self, text: &str) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        let sequence = human::typing_sequence(text);
        for step in &sequence {
            match step.action {
                TypingAction::Type => self.type_char_locked(&tab, &step.key).await?,
                TypingAction::Press => self.press_locked(&tab, &[step.key.clone()]).await?,
            }
            tokio::time::sleep(step.delay).await;
        }
        Ok(())
    }

    async fn type_char_locked(&self, tab: &TabId, text: &str) -> Result<(), BrowserError> {
        if text == "\n" || text == "\r" {
            return self.press_locked(tab, &["Enter".to_string()]).await;
        }
        let definition = keys::key_definition(text);
        if definition.key_code == 0 {
            return self.call(self.driver.insert_text(tab, text)).await;
        }
        let modifiers = self.held_modifiers();
        for kind in [KeyEventKind::Down, KeyEventKind::Up] {
            let event = KeyEvent {
                kind,
                key: definition.key.clone(),
                code: definition.code.clone(),
                key_code: definition.key_code,
                text: definition.text.clone(),
                modifiers,
            };
            self.call(self.driver.dispatch_key(tab, event)).await?;
        }
        Ok(())
    }

    /// Hold keys down in order. Modifiers stay applied to later pointer events
    /// until released.
    pub async fn key_down(&self, keys: &[String]) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.keys_locked(&tab, keys, KeyEventKind::Down).await
    }

    pub async fn key_up(&self, keys: &[String]) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.keys_locked(&tab, keys, KeyEventKind::Up).await
    }

    /// Press a single key, or a chord: all down in order, all up in reverse.
    pub async fn key_press(&self, keys: &[String]) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        let tab = self.ensure_active().await?;
        self.press_locked(&tab, keys).await
    }

    async fn press_locked(&self, tab: &TabId, keys: &[String]) -> Result<(), BrowserError> {
        if let [key] = keys {
            let definition = keys::key_definition(&keys::normalize_key(key));
            self.key_event_locked(tab, &definition, KeyEventKind::Down)
                .await?;
            tokio::time::sleep(human::keypress_delay()).await;
            return self
                .key_event_locked(tab, &definition, KeyEventKind::Up)
                .await;
        }
        self.keys_locked(tab, keys, KeyEventKind::Down).await?;
        tokio::time::sleep(human::keypress_delay()).await;
        let reversed: Vec<String> = keys.iter().rev().cloned().collect();
        self.keys_locked(tab, &reversed, KeyEventKind::Up).await
    }

    async fn keys_locked(
        &self,
        tab: &TabId,
        keys: &[String],
        kind: KeyEventKind,
    ) -> Result<(), BrowserError> {
        for key in keys {
            let definition = keys::key_definition(&keys::normalize_key(key));
            self.key_event_locked(tab, &definition, kind).await?;
            tokio::time::sleep(human::keypress_delay()).await;
        }
        Ok(())
    }

    async fn key_event_locked(
        &self,
        tab: &TabId,
        definition: &keys::KeyDefinition,
        kind: KeyEventKind,
    ) -> Result<(), BrowserError> {
        let modifiers = {
            let mut held = self.modifiers.lock();
            match kind {
                KeyEventKind::Down => *held |= definition.modifier,
                KeyEventKind::Up => *held &= !definition.modifier,
            }
            *held
        };
        let event = KeyEvent {
            kind,
            key: definition.key.clone(),
            code: definition.code.clone(),
            key_code: definition.key_code,
            text: definition.text.clone(),
            modifiers,
        };
        self.call(self.driver.dispatch_key(tab, event)).await
    }

    fn held_modifiers(&self) -> u32 {
        *self.modifiers.lock()
    }

    pub async fn close(&self) -> Result<(), BrowserError> {
        let _guard = self.input.lock().await;
        info!("closing browser session");
        self.call(self.driver.close()).await?;
        *self.active.lock() = None;
        Ok(())
    }

    // ---- plumbing ----

    /// The active tab, re-selected if it has gone away: tab 0 if any tab is
    /// left, otherwise a fresh tab at the fallback URL. Callers hold `input`.
    async fn ensure_active(&self) -> Result<TabId, BrowserError> {
        if let Some(id) = self.reselect_existing().await? {
            return Ok(id);
        }
        warn!(url = %self.options.fallback_url, "no tabs left, opening fallback tab");
        let tab = self
            .call(self.driver.open_tab(&self.options.fallback_url))
            .await?;
        *self.active.lock() = Some(tab.clone());
        Ok(tab)
    }

    /// Active tab for reads. Re-selects tab 0 under `input` if the active tab
    /// has gone away, but never opens one.
    async fn active_for_read(&self) -> Result<Option<TabId>, BrowserError> {
        let Some(current) = self.active.lock().clone() else {
            return Ok(None);
        };
        let tabs = self.live_tabs().await?;
        if tabs.iter().any(|t| t.id == current) {
            return Ok(Some(current));
        }
        if tabs.is_empty() {
            return Ok(None);
        }
        let _guard = self.input.lock().await;
        if self.active.lock().is_none() {
            // closed while we waited
            return Ok(None);
        }
        self.reselect_existing().await
    }

    /// Keep the active tab if it is still open, else activate tab 0. `None`
    /// when no tab is open. Callers hold `input`.
    async fn reselect_existing(&self) -> Result<Option<TabId>, BrowserError> {
        let tabs = self.live_tabs().await?;
        let current = self.active.lock().clone();
        if let Some(id) = current.filter(|id| tabs.iter().any(|t| &t.id == id)) {
            return Ok(Some(id));
        }
        let Some(first) = tabs.first() else {
            return Ok(None);
        };
        warn!(url = %first.url, "active tab gone, falling back to tab 0");
        self.call(self.driver.activate(&first.id)).await?;
        *self.active.lock() = Some(first.id.clone());
        Ok(Some(first.id.clone()))
    }

    async fn live_tabs(&self) -> Result<Vec<TabInfo>, BrowserError> {
        self.read_with_retry(|| self.driver.list_tabs()).await
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, BrowserError>>,
    ) -> Result<T, BrowserError> {
        tokio::time::timeout(self.options.call_timeout, fut)
            .await
            .map_err(|_| BrowserError::Timeout(self.options.call_timeout))?
    }

    async fn read_with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, BrowserError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BrowserError>>,
    {
        let attempts = self.options.read_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call(op()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() || attempt >= attempts => return Err(e),
                Err(e) => {
                    let backoff = self.options.retry_backoff * 2u32.pow(attempt - 1);
                    debug!(error = %e, attempt, ?backoff, "browser read failed, retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::fake::{Call, FakeDriver};
    use super::*;

    async fn session() -> (Arc<FakeDriver>, BrowserSession) {
        let driver = Arc::new(FakeDriver::new());
        let session = BrowserSession::launch(driver.clone(), SessionOptions::default())
            .await
            .unwrap();
        (driver, session)
    }

    #[tokio::test(start_paused = true)]
    async fn launch_opens_start_page_with_cursor_at_origin() {
        let (driver, session) = session().await;
        assert_eq!(driver.calls()[0], Call::Open(DEFAULT_START_URL.to_string()));
        assert_eq!(session.cursor_position(), Position::new(0, 0));
        assert_eq!(session.dimensions(), Dimensions::default());

        let current = session.current_tab().await.unwrap().unwrap();
        assert_eq!(current.index, 0);
        assert_eq!(current.url, DEFAULT_START_URL);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_out_of_range_keeps_active_tab() {
        let (_driver, session) = session().await;
        session.new_tab("https://example.com").await.unwrap();
        assert_eq!(session.current_tab().await.unwrap().unwrap().index, 1);

        let err = session.switch_to_tab(5).await.unwrap_err();
        assert!(matches!(err, BrowserError::TabOutOfRange { index: 5, count: 2 }));
        assert_eq!(session.current_tab().await.unwrap().unwrap().index, 1);

        session.switch_to_tab(0).await.unwrap();
        assert_eq!(session.current_tab().await.unwrap().unwrap().index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn back_without_history() {
        let (_driver, session) = session().await;
        assert_eq!(session.back().await.unwrap(), HistoryOutcome::NoPreviousEntry);

        session.goto("https://example.com").await.unwrap();
        assert_eq!(session.back().await.unwrap(), HistoryOutcome::Navigated);
        let current = session.current_tab().await.unwrap().unwrap();
        assert_eq!(current.url, DEFAULT_START_URL);
        assert_eq!(session.forward().await.unwrap(), HistoryOutcome::Navigated);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_active_tab_falls_back_to_first() {
        let (driver, session) = session().await;
        session.new_tab("https://example.com").await.unwrap();
        driver.close_tab(1);

        let current = session.current_tab().await.unwrap().unwrap();
        assert_eq!(current.index, 0);
        assert_eq!(current.url, DEFAULT_START_URL);
    }

    #[tokio::test(start_paused = true)]
    async fn screenshot_recovers_from_closed_active_tab() {
        let (driver, session) = session().await;
        session.new_tab("https://example.com").await.unwrap();
        driver.close_tab(1);

        assert!(!session.screenshot().await.unwrap().is_empty());
        assert!(!session.screenshot().await.unwrap().is_empty());
        assert_eq!(session.current_tab().await.unwrap().unwrap().index, 0);
        assert_eq!(session.tabs().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_never_open_a_tab() {
        let (driver, session) = session().await;
        driver.close_tab(0);

        assert!(session.current_tab().await.unwrap().is_none());
        assert!(session.screenshot().await.unwrap().is_empty());
        assert!(session.tabs().await.unwrap().is_empty());
        let opens = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Open(_)))
            .count();
        assert_eq!(opens, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn read_recovery_waits_for_in_flight_input() {
        let (driver, session) = session().await;
        let session = Arc::new(session);
        session.new_tab("https://example.com").await.unwrap();
        driver.close_tab(1);

        let activations = || {
            driver
                .calls()
                .iter()
                .filter(|c| matches!(c, Call::Activate(_)))
                .count()
        };
        let before = activations();

        let guard = session.input.lock().await;
        let reader = tokio::spawn({
            let session = session.clone();
            async move { session.current_tab().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!reader.is_finished());
        assert_eq!(activations(), before);

        drop(guard);
        let current = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(current.index, 0);
        assert_eq!(activations(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_tab_closed_opens_fallback() {
        let (driver, session) = session().await;
        driver.close_tab(0);

        session.goto("https://example.com").await.unwrap();
        assert!(driver.calls().contains(&Call::Open(DEFAULT_FALLBACK_URL.to_string())));
        let tabs = session.tabs().await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].url, "https://example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn move_walks_path_and_updates_cursor() {
        let (driver, session) = session().await;
        session.move_to(300, 200).await.unwrap();
        assert_eq!(session.cursor_position(), Position::new(300, 200));

        let moves = driver.mouse_events();
        assert!(moves.len() > 30);
        assert!(moves.iter().all(|e| e.kind == MouseEventKind::Move));
        let last = moves.last().unwrap();
        assert_eq!((last.x, last.y), (300, 200));
    }

    #[tokio::test(start_paused = true)]
    async fn click_presses_and_releases_at_cursor() {
        let (driver, session) = session().await;
        session.move_to(40, 60).await.unwrap();
        session.double_click().await.unwrap();

        let buttons: Vec<_> = driver
            .mouse_events()
            .into_iter()
            .filter(|e| e.kind != MouseEventKind::Move)
            .collect();
        assert_eq!(buttons.len(), 4);
        assert!(buttons.iter().all(|e| (e.x, e.y) == (40, 60)));
        assert_eq!(buttons[2].kind, MouseEventKind::Press);
        assert_eq!(buttons[2].click_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn held_modifiers_apply_to_pointer_events() {
        let (driver, session) = session().await;
        session.key_down(&["shift".to_string()]).await.unwrap();
        session.click(MouseButton::Left, 1).await.unwrap();
        session.key_up(&["shift".to_string()]).await.unwrap();
        session.click(MouseButton::Left, 1).await.unwrap();

        let presses: Vec<_> = driver
            .mouse_events()
            .into_iter()
            .filter(|e| e.kind == MouseEventKind::Press)
            .collect();
        assert_eq!(presses[0].modifiers, keys::MODIFIER_SHIFT);
        assert_eq!(presses[1].modifiers, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn chord_releases_in_reverse() {
        let (driver, session) = session().await;
        session
            .key_press(&["ctrl".to_string(), "a".to_string()])
            .await
            .unwrap();

        let events: Vec<_> = driver
            .key_events()
            .into_iter()
            .map(|e| (e.kind, e.key))
            .collect();
        assert_eq!(
            events,
            vec![
                (KeyEventKind::Down, "Control".to_string()),
                (KeyEventKind::Down, "a".to_string()),
                (KeyEventKind::Up, "a".to_string()),
                (KeyEventKind::Up, "Control".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn typed_text_arrives_intact() {
        let (driver, session) = session().await;
        session.type_text("hello world").await.unwrap();

        let mut typed = String::new();
        for event in driver.key_events() {
            if event.kind != KeyEventKind::Down {
                continue;
            }
            if event.key == "Backspace" {
                typed.pop();
            } else if let Some(text) = event.text {
                typed.push_str(&text);
            }
        }
        assert_eq!(typed, "hello world");
    }

    #[tokio::test(start_paused = true)]
    async fn drag_moves_between_press_and_release() {
        let (driver, session) = session().await;
        session.drag(&[]).await.unwrap();
        assert!(driver.mouse_events().is_empty());

        session
            .drag(&[Position::new(10, 10), Position::new(200, 120)])
            .await
            .unwrap();
        let events = driver.mouse_events();
        let press = events
            .iter()
            .position(|e| e.kind == MouseEventKind::Press)
            .unwrap();
        let release = events
            .iter()
            .position(|e| e.kind == MouseEventKind::Release)
            .unwrap();
        assert_eq!((events[press].x, events[press].y), (10, 10));
        assert_eq!((events[release].x, events[release].y), (200, 120));
        assert!(release > press + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn screenshot_retries_then_composites() {
        let (driver, session) = session().await;
        driver.failing_screenshots.store(2, Ordering::SeqCst);
        let png = session.screenshot().await.unwrap();
        assert!(!png.is_empty());
        assert!(!session.screenshot_base64().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn screenshot_without_tabs_is_empty() {
        let (driver, session) = session().await;
        driver.close_tab(0);
        assert!(session.screenshot().await.unwrap().is_empty());

        session.close().await.unwrap();
        assert_eq!(session.screenshot_base64().await.unwrap(), "");
    }
}
