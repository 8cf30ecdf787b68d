use crate::capture::traits::PageCapturer;
use crate::capture::types::CapturedPage;
use anyhow::{Context, Result};
use headless_chrome::protocol::cdp::Page;
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::time::Duration;
use tracing::{debug, info, warn};

const WINDOW_SIZE: (u32, u32) = (1920, 1080);

/// Screenshot capturer using headless Chrome
pub struct ChromeCapturer {
    browser: Browser,
    wait: Duration,
}

impl ChromeCapturer {
    /// Launch headless Chrome with a 1920x1080 window
    pub fn new(wait: Duration) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some(WINDOW_SIZE))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self { browser, wait })
    }
}

impl ChromeCapturer {
    fn snapshot(&self, tab: &Tab, url: &str) -> Result<CapturedPage> {
        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;
        tab.wait_for_element_with_custom_timeout("body", self.wait)
            .with_context(|| format!("Page body never appeared for {}", url))?;

        let dims = tab.evaluate(
            "JSON.stringify([document.body.scrollWidth, document.body.scrollHeight])",
            false,
        )?;
        let (width, height) = dims
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str::<(f64, f64)>(s).ok())
            .unwrap_or((WINDOW_SIZE.0 as f64, WINDOW_SIZE.1 as f64));
        debug!("Document size for {}: {}x{}", url, width, height);

        // Grow the window to the whole document so content below the fold is rendered
        let (width, height) = (width.max(1.0), height.max(1.0));
        tab.set_bounds(Bounds::Normal {
            left: Some(0),
            top: Some(0),
            width: Some(width),
            height: Some(height),
        })
        .context("Failed to resize window to the document")?;

        let screenshot = tab
            .capture_screenshot(
                Page::CaptureScreenshotFormatOption::Png,
                None,
                Some(Page::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width,
                    height,
                    scale: 1.0,
                }),
                true,
            )
            .context("Failed to capture screenshot")?;

        let html_result = tab.evaluate("document.documentElement.outerHTML", false)?;
        let html = match html_result.value {
            Some(value) => value.as_str().unwrap_or("").to_string(),
            None => {
                warn!("Could not get HTML from {}", url);
                String::new()
            }
        };

        Ok(CapturedPage {
            url: url.to_string(),
            screenshot,
            html,
        })
    }
}

impl PageCapturer for ChromeCapturer {
    fn capture(&self, url: &str) -> Result<CapturedPage> {
        info!("Opening {}", url);
        let tab = self.browser.new_tab().context("Failed to open tab")?;

        let page = closing_after(|| self.snapshot(&tab, url), || tab.close(true).map(|_| ()))?;

        info!(
            "Captured {} ({} bytes PNG, {} bytes HTML)",
            url,
            page.screenshot.len(),
            page.html.len()
        );
        Ok(page)
    }

    fn capturer_name(&self) -> &'static str {
        "chrome"
    }
}

/// Run `work`, then `close` whether or not `work` succeeded; a close failure is only logged
fn closing_after<T, E>(
    work: impl FnOnce() -> Result<T>,
    close: impl FnOnce() -> std::result::Result<(), E>,
) -> Result<T>
where
    E: std::fmt::Display,
{
    let result = work();
    if let Err(err) = close() {
        debug!("Tab close failed: {}", err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn tab_closes_when_navigation_fails() {
        let closed = Cell::new(false);
        let result: Result<()> = closing_after(
            || Err(anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED")),
            || {
                closed.set(true);
                Ok::<(), anyhow::Error>(())
            },
        );
        assert!(result.is_err());
        assert!(closed.get());
    }

    #[test]
    fn close_failure_keeps_the_captured_value() {
        let result = closing_after(|| Ok(42), || Err("target closed"));
        assert_eq!(result.unwrap(), 42);
    }
}
