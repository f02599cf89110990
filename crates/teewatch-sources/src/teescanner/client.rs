use crate::error::FetchError;
use crate::teescanner::parser::{
    listing_probe_js, listing_url, parse_listing, parse_page_state, PageState, EXTRACT_LISTING_JS,
};
use crate::traits::PageFetcher;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use chromiumoxide::{Browser, BrowserConfig, Page};
use chrono::NaiveDate;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teewatch_config::SourceConfig;
use teewatch_models::RawRecord;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use which::which;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

type Closer<T> = Box<dyn FnOnce(T) -> BoxFuture<'static, ()> + Send>;

/// Closes a resource in the background if it is dropped before [`CloseOnDrop::close`],
/// as happens to a page whose fetch was cancelled by the scheduler's timeout
struct CloseOnDrop<T: Send + 'static> {
    armed: Option<(T, Closer<T>)>,
}

impl<T: Send + 'static> CloseOnDrop<T> {
    fn new(inner: T, closer: impl FnOnce(T) -> BoxFuture<'static, ()> + Send + 'static) -> Self {
        Self {
            armed: Some((inner, Box::new(closer))),
        }
    }

    async fn close(mut self) {
        if let Some((inner, closer)) = self.armed.take() {
            closer(inner).await;
        }
    }
}

impl<T: Send + 'static> Drop for CloseOnDrop<T> {
    fn drop(&mut self) {
        let Some((inner, closer)) = self.armed.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Closing abandoned page in the background");
                handle.spawn(closer(inner));
            }
            Err(_) => warn!("No runtime left to close an abandoned page"),
        }
    }
}

fn close_page(page: Page) -> BoxFuture<'static, ()> {
    async move {
        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
    }
    .boxed()
}

struct BrowserSession {
    browser: Browser,
    handler_task: tokio::task::JoinHandle<()>,
}

/// Loads teescanner listing pages in headless Chromium and extracts course blocks
pub struct TeescannerFetcher {
    config: SourceConfig,
    user_data_dir: PathBuf,
    session: RwLock<Option<Arc<BrowserSession>>>,
}

impl TeescannerFetcher {
    /// The browser is launched lazily on the first fetch
    pub fn new(config: SourceConfig, user_data_dir: PathBuf) -> Self {
        Self {
            config,
            user_data_dir,
            session: RwLock::new(None),
        }
    }

    async fn browser_session(&self) -> Result<Arc<BrowserSession>, FetchError> {
        {
            let guard = self.session.read().await;
            if let Some(session) = guard.as_ref() {
                if !session.handler_task.is_finished() {
                    return Ok(session.clone());
                }
            }
        }

        let mut guard = self.session.write().await;
        // Another fetch may have relaunched while we waited for the lock
        if let Some(session) = guard.as_ref() {
            if !session.handler_task.is_finished() {
                return Ok(session.clone());
            }
            warn!(operation = "browser_relaunch", "Browser handler ended, relaunching Chromium");
        }

        let session = Arc::new(
            Self::launch_browser(&self.config, &self.user_data_dir)
                .await
                .map_err(|e| FetchError::fatal(format!("Failed to launch browser: {}", e)))?,
        );
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn launch_browser(config: &SourceConfig, user_data_dir: &Path) -> Result<BrowserSession> {
        tokio::fs::create_dir_all(user_data_dir).await?;

        let chrome_path = match Self::find_system_chromium(config) {
            Some(path) => path,
            None => {
                // Based on: https://github.com/mattsse/chromiumoxide?tab=readme-ov-file#fetcher
                info!("No system Chromium found, downloading via BrowserFetcher...");
                let download_path = user_data_dir
                    .parent()
                    .ok_or_else(|| anyhow!("Could not determine parent directory"))?
                    .join("chromium_downloads");
                tokio::fs::create_dir_all(&download_path).await?;

                let fetcher = BrowserFetcher::new(
                    BrowserFetcherOptions::builder()
                        .with_path(&download_path)
                        .build()
                        .map_err(|e| anyhow!("Failed to create BrowserFetcherOptions: {}", e))?,
                );
                let revision = fetcher
                    .fetch()
                    .await
                    .map_err(|e| anyhow!("Failed to fetch Chromium: {}", e))?;
                info!("Chromium downloaded to: {:?}", revision.executable_path);
                revision.executable_path
            }
        };

        let browser_config = Self::build_browser_config(config, chrome_path, user_data_dir)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        let handler_task = tokio::spawn(async move {
            let mut error_count = 0;
            const MAX_ERRORS: usize = 10;

            while let Some(event) = handler.next().await {
                match event {
                    Ok(_) => error_count = 0,
                    Err(e) => {
                        error_count += 1;
                        warn!("Browser handler error (count: {}/{}): {:?}", error_count, MAX_ERRORS, e);
                        if error_count >= MAX_ERRORS {
                            error!(
                                "Browser handler received {} consecutive errors. Browser process may have crashed.",
                                error_count
                            );
                            break;
                        }
                    }
                }
            }
            debug!("Browser handler task ended");
        });

        info!(operation = "browser_launch", "Chromium launched");
        Ok(BrowserSession { browser, handler_task })
    }

    fn build_browser_config(config: &SourceConfig, chrome_path: PathBuf, user_data_dir: &Path) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(user_data_dir)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-gpu")
            .arg("--disable-notifications")
            .arg("--log-level=3")
            .arg("--disable-crash-reporter")
            .arg("--window-size=1280,900");

        if !config.headless {
            builder = builder.with_head();
        }

        builder
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))
    }

    fn find_system_chromium(config: &SourceConfig) -> Option<PathBuf> {
        if let Some(path) = &config.chrome_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("Configured chrome_path {:?} does not exist, searching PATH", path);
        }

        for name in ["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"] {
            if let Ok(path) = which(name) {
                return Some(path);
            }
        }

        let known_paths = [
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        ];
        known_paths
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    async fn fetch_listing(&self, browser: &Browser, play_date: NaiveDate) -> Result<Vec<RawRecord>, FetchError> {
        let url = listing_url(&self.config.base_url, &self.config.tab, play_date);
        info!(operation = "page_load", play_date = %play_date, url = %url, "Loading listing page");

        let page = browser
            .new_page(url.as_str())
            .await
            .map_err(|e| FetchError::transient(format!("Failed to open {}: {}", url, e)))?;

        // Closed on every path, including a cancelled fetch
        let guard = CloseOnDrop::new(page.clone(), close_page);
        let result = self.extract_from_page(&page, play_date).await;
        guard.close().await;

        result
    }

    async fn extract_from_page(&self, page: &Page, play_date: NaiveDate) -> Result<Vec<RawRecord>, FetchError> {
        if !self.wait_for_listing(page).await? {
            info!(play_date = %play_date, "No course listed for this date");
            return Ok(Vec::new());
        }
        let scrolls = self.scroll_to_end(page).await?;

        let evaluation = page
            .evaluate(EXTRACT_LISTING_JS)
            .await
            .map_err(|e| FetchError::transient(format!("Listing extraction failed: {}", e)))?;
        let value: serde_json::Value = evaluation
            .into_value()
            .map_err(|e| FetchError::transient(format!("Listing extraction returned invalid JSON: {}", e)))?;

        let records = parse_listing(value, play_date).map_err(|e| FetchError::transient(e.to_string()))?;
        debug!(play_date = %play_date, scrolls, records = records.len(), "Listing extracted");
        Ok(records)
    }

    /// Wait for the first course block. `Ok(false)` means the page finished loading without one.
    async fn wait_for_listing(&self, page: &Page) -> Result<bool, FetchError> {
        let timeout = Duration::from_secs(self.config.wait_timeout_secs);
        let probe = listing_probe_js();
        let start = Instant::now();

        loop {
            let state = match page.evaluate(probe.as_str()).await {
                Ok(result) => result
                    .into_value::<serde_json::Value>()
                    .map(|v| parse_page_state(&v))
                    .unwrap_or(PageState::Loading),
                Err(_) => PageState::Loading,
            };
            if state == PageState::Listing {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return match state {
                    PageState::LoadedEmpty => Ok(false),
                    _ => Err(FetchError::transient(format!(
                        "Listing page did not finish loading within {}s",
                        self.config.wait_timeout_secs
                    ))),
                };
            }
            sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Scroll until the page height stops growing or the scroll budget is spent; returns the number of scrolls
    async fn scroll_to_end(&self, page: &Page) -> Result<u32, FetchError> {
        let pause = Duration::from_millis(self.config.scroll_pause_ms);
        let deadline = Instant::now() + Duration::from_secs(self.config.scroll_budget_secs);
        let mut last_height = Self::scroll_height(page).await?;

        for scroll in 0..self.config.max_scrolls {
            if Instant::now() >= deadline {
                warn!(
                    scrolls = scroll,
                    budget_secs = self.config.scroll_budget_secs,
                    "Scroll budget spent, extracting what is loaded"
                );
                return Ok(scroll);
            }
            page.evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
                .map_err(|e| FetchError::transient(format!("Scroll failed: {}", e)))?;
            sleep(pause).await;

            let new_height = Self::scroll_height(page).await?;
            if new_height <= last_height {
                return Ok(scroll + 1);
            }
            last_height = new_height;
        }

        warn!(
            max_scrolls = self.config.max_scrolls,
            "Listing kept growing after the scroll limit, extracting what is loaded"
        );
        Ok(self.config.max_scrolls)
    }

    async fn scroll_height(page: &Page) -> Result<f64, FetchError> {
        page.evaluate("document.body.scrollHeight")
            .await
            .map_err(|e| FetchError::transient(format!("Failed to read page height: {}", e)))?
            .into_value::<f64>()
            .map_err(|e| FetchError::transient(format!("Unexpected page height value: {}", e)))
    }
}

#[async_trait]
impl PageFetcher for TeescannerFetcher {
    fn source_name(&self) -> &str {
        "teescanner"
    }

    async fn fetch(&self, play_date: NaiveDate) -> Result<Vec<RawRecord>, FetchError> {
        let session = self.browser_session().await?;
        let result = self.fetch_listing(&session.browser, play_date).await;

        // Politeness pause between page loads
        sleep(Duration::from_millis(self.config.date_pause_ms)).await;
        result
    }

    async fn shutdown(&self) -> Result<(), FetchError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };

        info!("Shutting down browser instance");
        match Arc::try_unwrap(session) {
            Ok(mut session) => {
                if let Err(e) = session.browser.close().await {
                    warn!("Failed to close browser cleanly: {}", e);
                }
                let _ = tokio::time::timeout(Duration::from_secs(2), session.handler_task).await;
            }
            Err(_) => {
                // A fetch still holds the session; Chromium is closed when it drops
                warn!("Browser still in use during shutdown, leaving it to close on drop");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn report_to(tx: oneshot::Sender<&'static str>) -> impl FnOnce(&'static str) -> BoxFuture<'static, ()> + Send + 'static {
        move |name| {
            async move {
                let _ = tx.send(name);
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_cancelled_fetch_still_closes_page() {
        let (tx, rx) = oneshot::channel();
        let fetch = async move {
            let _guard = CloseOnDrop::new("tab-1", report_to(tx));
            std::future::pending::<()>().await;
        };

        assert!(tokio::time::timeout(Duration::from_millis(10), fetch).await.is_err());
        assert_eq!(rx.await.unwrap(), "tab-1");
    }

    #[tokio::test]
    async fn test_close_runs_once_on_normal_path() {
        let (tx, mut rx) = oneshot::channel();
        let guard = CloseOnDrop::new("tab-2", report_to(tx));

        guard.close().await;
        assert_eq!(rx.try_recv().unwrap(), "tab-2");
    }
}
