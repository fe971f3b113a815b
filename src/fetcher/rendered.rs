//! Headless browser page source
//!
//! Pages are rendered in a Chromium instance driven through chromiumoxide.
//! Each fetch launches its own browser on a dedicated current-thread runtime
//! and tears both down before returning, so nothing outlives the call.

use super::{FetchBudget, FetchError, PageSource};
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// Page source that executes client-side script before reading the HTML.
pub(crate) struct RenderedSource {
    chrome_path: Option<PathBuf>,
}

impl RenderedSource {
    /// Creates a source; without a path, chromiumoxide locates Chromium itself.
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }

    fn browser_config(&self) -> Result<BrowserConfig, FetchError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-renderer-backgrounding")
            .arg("--blink-settings=imagesEnabled=false");

        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| FetchError::Render(format!("Invalid browser config: {}", e)))
    }
}

impl PageSource for RenderedSource {
    fn fetch_html(&self, url: &Url, budget: FetchBudget) -> Result<String, FetchError> {
        let config = self.browser_config()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FetchError::Render(format!("Failed to start runtime: {}", e)))?;

        // Dropping the runtime afterwards cancels whatever the timeout left behind
        runtime.block_on(async {
            let render = render_page(config, url, budget.settle);
            match tokio::time::timeout(budget.timeout, render).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(budget.timeout)),
            }
        })
    }
}

/// Launches a browser, renders one page and shuts the browser down again.
async fn render_page(
    config: BrowserConfig,
    url: &Url,
    settle: Duration,
) -> Result<String, FetchError> {
    let mut session = BrowserSession::launch(config).await?;
    let result = session.render(url, settle).await;
    session.shutdown().await;
    result
}

/// A running browser together with its CDP event loop.
///
/// Dropping the session stops the event loop; the browser kills its child
/// process when dropped. This holds on every path, including a timeout that
/// abandons the future mid-render.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: BrowserConfig) -> Result<Self, FetchError> {
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Render(format!("Failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self { browser, handler })
    }

    async fn render(&mut self, url: &Url, settle: Duration) -> Result<String, FetchError> {
        let page = self
            .browser
            .new_page(url.as_str())
            .await
            .map_err(|e| FetchError::Render(format!("Navigation failed: {}", e)))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| FetchError::Render(format!("Navigation failed: {}", e)))?;

        // Let client-side script fill in the content
        tokio::time::sleep(settle).await;

        let html = page
            .content()
            .await
            .map_err(|e| FetchError::Render(format!("Failed to read HTML: {}", e)))?;

        debug!("Rendered {} ({} bytes)", url, html.len());
        Ok(html)
    }

    async fn shutdown(mut self) {
        // Errors here only mean the browser is already gone
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
