use anyhow::{Context, Result, anyhow};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Browser connection kept alive for the whole run.
pub struct BrowserSession {
    _browser: Browser,
    pub tab: Arc<Tab>,
}

pub struct LaunchSettings {
    pub chat_url: String,
    pub debug_port: u16,
    pub chrome_path: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
}

impl BrowserSession {
    /// Attach to a Chrome already listening on the DevTools port, otherwise
    /// launch one with a persistent profile. Either way, end up on the chat tab.
    pub fn launch(settings: &LaunchSettings) -> Result<Self> {
        info!(port = settings.debug_port, "attaching to existing Chrome");
        let browser = match attach(settings.debug_port) {
            Ok(browser) => {
                info!("attached to existing Chrome");
                browser
            }
            Err(e) => {
                warn!("could not attach ({e:#}), launching Chrome");
                launch_new(settings)?
            }
        };

        let tab = chat_tab(&browser, &settings.chat_url)?;
        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

fn attach(port: u16) -> Result<Browser> {
    let version: serde_json::Value =
        reqwest::blocking::get(format!("http://127.0.0.1:{port}/json/version"))?
            .error_for_status()?
            .json()?;
    let ws_url = version["webSocketDebuggerUrl"]
        .as_str()
        .ok_or_else(|| anyhow!("DevTools endpoint gave no webSocketDebuggerUrl"))?;
    Browser::connect(ws_url.to_string())
}

fn launch_new(settings: &LaunchSettings) -> Result<Browser> {
    let profile = match &settings.profile_dir {
        Some(dir) => dir.clone(),
        None => default_profile_dir()?,
    };
    std::fs::create_dir_all(&profile)
        .with_context(|| format!("creating profile dir {}", profile.display()))?;
    info!(profile = %profile.display(), "using persistent profile");

    let options = LaunchOptions {
        headless: false,
        path: settings.chrome_path.clone().or_else(find_chrome),
        user_data_dir: Some(profile),
        args: vec![
            std::ffi::OsStr::new("--no-first-run"),
            std::ffi::OsStr::new("--no-default-browser-check"),
            std::ffi::OsStr::new("--restore-last-session"),
            std::ffi::OsStr::new("--password-store=basic"),
        ],
        idle_browser_timeout: std::time::Duration::from_secs(60 * 60 * 24),
        ..Default::default()
    };

    Browser::new(options).map_err(|e| anyhow!("Browser launch failed: {e}"))
}

/// Reuse a tab already showing the chat site, else open one.
fn chat_tab(browser: &Browser, chat_url: &str) -> Result<Arc<Tab>> {
    let origin = origin_of(chat_url);
    let existing = {
        let tabs = browser
            .get_tabs()
            .lock()
            .map_err(|_| anyhow!("tab list lock poisoned"))?;
        tabs.iter().find(|t| t.get_url().starts_with(origin)).cloned()
    };

    if let Some(tab) = existing {
        info!(url = %tab.get_url(), "using open chat tab");
        return Ok(tab);
    }

    info!(url = chat_url, "opening chat tab");
    let tab = browser.new_tab()?;
    tab.navigate_to(chat_url)?;
    tab.wait_until_navigated()?;
    Ok(tab)
}

/// `https://host/path` -> `https://host`
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}

fn default_profile_dir() -> Result<PathBuf> {
    let local = dirs::data_local_dir().ok_or_else(|| anyhow!("no local data directory"))?;
    Ok(local.join("autocontinue").join("profile"))
}

fn find_chrome() -> Option<PathBuf> {
    let candidates = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    // None lets headless_chrome run its own lookup
    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}
