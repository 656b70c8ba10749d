use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Input, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::driver::{
    BrowserDriver, HistoryDirection, HistoryOutcome, KeyEvent, KeyEventKind, MouseEvent,
    MouseEventKind, TabId, TabInfo,
};
use crate::error::BrowserError;
use crate::types::{Dimensions, MouseButton};

/// How to get hold of a Chrome instance.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    /// Explicit Chrome binary. Falls back to well-known install locations.
    pub executable: Option<PathBuf>,
    /// Persistent profile so logins survive restarts.
    pub user_data_dir: Option<PathBuf>,
    /// Attach to an already running Chrome's debugging endpoint instead of launching.
    pub attach_url: Option<String>,
    pub dimensions: Dimensions,
    pub idle_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: false,
            executable: None,
            user_data_dir: None,
            attach_url: None,
            dimensions: Dimensions::default(),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// [`BrowserDriver`] backed by Chrome over CDP.
///
/// `headless_chrome` is synchronous, so every call hops onto the blocking pool.
pub struct ChromeDriver {
    browser: Browser,
    dimensions: Dimensions,
    /// Blank tab Chrome starts with; handed out by the first `open_tab`.
    spare: Mutex<Option<TabId>>,
}

impl ChromeDriver {
    pub async fn launch(options: ChromeOptions) -> Result<Self, BrowserError> {
        tokio::task::spawn_blocking(move || Self::launch_blocking(options))
            .await
            .map_err(|e| BrowserError::Launch(format!("launch task panicked: {e}")))?
    }

    fn launch_blocking(options: ChromeOptions) -> Result<Self, BrowserError> {
        let dimensions = options.dimensions;

        if let Some(url) = &options.attach_url {
            info!(%url, "attaching to existing Chrome");
            match Browser::connect(url.clone()) {
                Ok(browser) => {
                    info!("attached to existing Chrome");
                    return Ok(Self {
                        browser,
                        dimensions,
                        spare: Mutex::new(None),
                    });
                }
                Err(e) => warn!(error = %e, "could not attach, launching a new Chrome"),
            }
        }

        if let Some(dir) = &options.user_data_dir {
            std::fs::create_dir_all(dir)
                .map_err(|e| BrowserError::Launch(format!("profile dir {dir:?}: {e}")))?;
            debug!(profile = ?dir, "using persistent profile");
        }

        let window_size: OsString =
            format!("--window-size={},{}", dimensions.width, dimensions.height).into();
        let args: Vec<&OsStr> = vec![
            OsStr::new("--no-first-run"),
            OsStr::new("--no-default-browser-check"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-infobars"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--password-store=basic"),
            window_size.as_os_str(),
        ];

        let launch = LaunchOptions {
            headless: options.headless,
            path: options.executable.clone().or_else(find_chrome),
            user_data_dir: options.user_data_dir.clone(),
            window_size: Some((dimensions.width, dimensions.height)),
            args,
            idle_browser_timeout: options.idle_timeout,
            ..Default::default()
        };

        info!(headless = options.headless, "starting Chrome");
        let browser = Browser::new(launch).map_err(|e| BrowserError::Launch(format!("{e:#}")))?;

        let spare = {
            let tabs = browser.get_tabs().lock().map_err(poisoned)?;
            tabs.first().map(|t| t.get_target_id().clone())
        };
        info!("Chrome ready");

        Ok(Self {
            browser,
            dimensions,
            spare: Mutex::new(spare),
        })
    }

    async fn with_tab<T, F>(&self, tab: &TabId, f: F) -> Result<T, BrowserError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, BrowserError> + Send + 'static,
    {
        let browser = self.browser.clone();
        let id = tab.clone();
        blocking(move || {
            let tab = find_tab(&browser, &id)?;
            f(&tab)
        })
        .await
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    async fn open_tab(&self, url: &str) -> Result<TabId, BrowserError> {
        let spare = self.spare.lock().take();
        let browser = self.browser.clone();
        let url = url.to_string();
        blocking(move || {
            let tab = match spare.and_then(|id| find_tab(&browser, &id).ok()) {
                Some(tab) => tab,
                None => browser.new_tab()?,
            };
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(tab.get_target_id().clone())
        })
        .await
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>, BrowserError> {
        let browser = self.browser.clone();
        blocking(move || {
            let tabs: Vec<Arc<Tab>> = browser.get_tabs().lock().map_err(poisoned)?.clone();
            Ok(tabs
                .iter()
                .map(|tab| TabInfo {
                    id: tab.get_target_id().clone(),
                    title: tab.get_title().unwrap_or_default(),
                    url: tab.get_url(),
                })
                .collect())
        })
        .await
    }

    async fn activate(&self, tab: &TabId) -> Result<(), BrowserError> {
        self.with_tab(tab, |tab| {
            tab.activate()?;
            Ok(())
        })
        .await
    }

    async fn navigate(&self, tab: &TabId, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        self.with_tab(tab, move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn history(
        &self,
        tab: &TabId,
        direction: HistoryDirection,
    ) -> Result<HistoryOutcome, BrowserError> {
        self.with_tab(tab, move |tab| {
            let history = tab.call_method(Page::GetNavigationHistory(None))?;
            let current = history.current_index as i64;
            let target = match direction {
                HistoryDirection::Back => current - 1,
                HistoryDirection::Forward => current + 1,
            };
            let Some(entry) = usize::try_from(target)
                .ok()
                .and_then(|i| history.entries.get(i))
            else {
                return Ok(HistoryOutcome::NoPreviousEntry);
            };
            tab.call_method(Page::NavigateToHistoryEntry { entry_id: entry.id })?;
            tab.wait_until_navigated()?;
            Ok(HistoryOutcome::Navigated)
        })
        .await
    }

    async fn reload(&self, tab: &TabId) -> Result<(), BrowserError> {
        self.with_tab(tab, |tab| {
            tab.reload(false, None)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn screenshot(&self, tab: &TabId) -> Result<Vec<u8>, BrowserError> {
        self.with_tab(tab, |tab| {
            Ok(tab.capture_screenshot(
                Page::CaptureScreenshotFormatOption::Png,
                None,
                None,
                true,
            )?)
        })
        .await
    }

    async fn dispatch_mouse(&self, tab: &TabId, event: MouseEvent) -> Result<(), BrowserError> {
        self.with_tab(tab, move |tab| {
            let (kind, delta_x, delta_y) = match event.kind {
                MouseEventKind::Move => (Input::DispatchMouseEventTypeOption::MouseMoved, None, None),
                MouseEventKind::Press => (Input::DispatchMouseEventTypeOption::MousePressed, None, None),
                MouseEventKind::Release => {
                    (Input::DispatchMouseEventTypeOption::MouseReleased, None, None)
                }
                MouseEventKind::Wheel { delta_x, delta_y } => (
                    Input::DispatchMouseEventTypeOption::MouseWheel,
                    Some(delta_x),
                    Some(delta_y),
                ),
            };
            let button = match event.button {
                Some(MouseButton::Left) => Input::MouseButton::Left,
                Some(MouseButton::Right) => Input::MouseButton::Right,
                Some(MouseButton::Middle) => Input::MouseButton::Middle,
                None => Input::MouseButton::None,
            };
            tab.call_method(Input::DispatchMouseEvent {
                Type: kind,
                x: f64::from(event.x),
                y: f64::from(event.y),
                modifiers: Some(event.modifiers),
                timestamp: None,
                button: Some(button),
                buttons: None,
                click_count: (event.click_count > 0).then_some(event.click_count),
                force: None,
                tangential_pressure: None,
                tilt_x: None,
                tilt_y: None,
                twist: None,
                delta_x,
                delta_y,
                pointer_Type: None,
            })?;
            Ok(())
        })
        .await
    }

    async fn dispatch_key(&self, tab: &TabId, event: KeyEvent) -> Result<(), BrowserError> {
        self.with_tab(tab, move |tab| {
            let kind = match event.kind {
                // keyDown with text produces input; rawKeyDown would not.
                KeyEventKind::Down => Input::DispatchKeyEventTypeOption::KeyDown,
                KeyEventKind::Up => Input::DispatchKeyEventTypeOption::KeyUp,
            };
            let text = match event.kind {
                KeyEventKind::Down => event.text.clone(),
                KeyEventKind::Up => None,
            };
            tab.call_method(Input::DispatchKeyEvent {
                Type: kind,
                modifiers: Some(event.modifiers),
                timestamp: None,
                text,
                unmodified_text: None,
                key_identifier: None,
                code: Some(event.code.clone()),
                key: Some(event.key.clone()),
                windows_virtual_key_code: Some(event.key_code),
                native_virtual_key_code: Some(event.key_code),
                auto_repeat: None,
                is_keypad: None,
                is_system_key: None,
                location: None,
                commands: None,
            })?;
            Ok(())
        })
        .await
    }

    async fn insert_text(&self, tab: &TabId, text: &str) -> Result<(), BrowserError> {
        let text = text.to_string();
        self.with_tab(tab, move |tab| {
            tab.call_method(Input::InsertText { text })?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let browser = self.browser.clone();
        blocking(move || {
            let tabs: Vec<Arc<Tab>> = browser.get_tabs().lock().map_err(poisoned)?.clone();
            for tab in tabs {
                if let Err(e) = tab.close(false) {
                    debug!(error = %e, "tab close failed");
                }
            }
            Ok(())
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, BrowserError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BrowserError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BrowserError::Driver(format!("browser task panicked: {e}")))?
}

fn find_tab(browser: &Browser, id: &TabId) -> Result<Arc<Tab>, BrowserError> {
    let tabs = browser.get_tabs().lock().map_err(poisoned)?;
    tabs.iter()
        .find(|t| t.get_target_id() == id)
        .cloned()
        .ok_or_else(|| BrowserError::TabNotFound(id.clone()))
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> BrowserError {
    BrowserError::Driver("tab list lock poisoned".to_string())
}

/// Well-known Chrome install locations. `None` lets headless_chrome search.
fn find_chrome() -> Option<PathBuf> {
    let mut candidates: Vec<PathBuf> = vec![
        PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
    ];
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(
            local
                .join("Google")
                .join("Chrome")
                .join("Application")
                .join("chrome.exe"),
        );
    }
    candidates.into_iter().find(|p| p.exists())
}
