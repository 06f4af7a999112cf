use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::errors::{LocatorError, LocatorResult};
use crate::page::PageSession;
use crate::types::{ElementSnapshot, QueryLanguage, Selector, ViewportSize};

/// Captures every element matching `arguments[0]` (language) and
/// `arguments[1]` (expression) in document order.
const SNAPSHOT_SCRIPT: &str = r#"
    const [language, expression] = arguments;
    let nodes = [];
    if (language === 'xpath') {
        const result = document.evaluate(expression, document, null,
            XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
        for (let i = 0; i < result.snapshotLength; i++) {
            const node = result.snapshotItem(i);
            if (node.nodeType === Node.ELEMENT_NODE) nodes.push(node);
        }
    } else {
        nodes = Array.from(document.querySelectorAll(expression));
    }

    const indexOfType = (el) => {
        let index = 1;
        for (let sib = el.previousElementSibling; sib; sib = sib.previousElementSibling) {
            if (sib.tagName === el.tagName) index++;
        }
        return index;
    };

    const labelOf = (el) => {
        if (el.labels && el.labels.length) return el.labels[0].innerText.trim();
        const ref = el.getAttribute('aria-labelledby');
        if (ref) {
            const target = document.getElementById(ref.split(/\s+/)[0]);
            if (target) return target.innerText.trim();
        }
        return null;
    };

    const textOf = (el) => {
        const tag = el.tagName.toLowerCase();
        if (tag === 'input' && ['submit', 'button', 'reset'].includes((el.type || '').toLowerCase())) {
            return el.value || '';
        }
        return (el.innerText || el.textContent || '').trim().slice(0, 500);
    };

    return nodes.map((el) => {
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        const attributes = {};
        for (const attr of el.attributes) attributes[attr.name] = attr.value;

        const ancestors = [];
        for (let p = el.parentElement; p; p = p.parentElement) {
            ancestors.unshift({
                tag: p.tagName.toLowerCase(),
                id: p.id || null,
                classes: Array.from(p.classList),
                index_of_type: indexOfType(p),
            });
        }

        return {
            tag: el.tagName.toLowerCase(),
            attributes,
            text: textOf(el),
            bounds: { x: rect.x, y: rect.y, width: rect.width, height: rect.height },
            index_of_type: indexOfType(el),
            ancestors,
            visible: rect.width > 0 && rect.height > 0
                && style.visibility !== 'hidden' && style.display !== 'none',
            label: labelOf(el),
        };
    });
"#;

/// Browser instance for WebDriver automation
pub struct Browser {
    pub(crate) client: Client,
    browser_type: BrowserType,
    _profile_dir: Option<TempDir>,
}

/// Supported browser types
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Default WebDriver URL for this browser type
    pub fn default_webdriver_url(&self) -> String {
        match self {
            BrowserType::Firefox => "http://localhost:4444".to_string(),
            BrowserType::Chrome => {
                // chromedriver may have picked another port; its log says which
                for log_file in &["/tmp/chromedriver_new.log", "/tmp/chromedriver.log"] {
                    if let Ok(log) = std::fs::read_to_string(log_file)
                        && let Some(line) = log
                            .lines()
                            .find(|l| l.contains("ChromeDriver was started successfully on port"))
                        && let Some(port) = line
                            .split("port ")
                            .nth(1)
                            .and_then(|s| s.trim_end_matches('.').parse::<u16>().ok())
                    {
                        return format!("http://localhost:{port}");
                    }
                }
                "http://localhost:9515".to_string()
            }
        }
    }

    fn driver_name(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "geckodriver",
            BrowserType::Chrome => "chromedriver",
        }
    }
}

impl Browser {
    /// Connect to a running WebDriver and open a new session
    ///
    /// # Arguments
    /// * `browser_type` - Firefox or Chrome
    /// * `webdriver_url` - Driver endpoint; the browser's default when `None`
    /// * `viewport` - Optional viewport dimensions
    /// * `headless` - Whether to run in headless mode
    pub async fn connect(
        browser_type: BrowserType,
        webdriver_url: Option<String>,
        viewport: Option<ViewportSize>,
        headless: bool,
    ) -> Result<Self> {
        info!("Connecting to {:?} WebDriver", browser_type);
        let webdriver_url = webdriver_url.unwrap_or_else(|| browser_type.default_webdriver_url());

        if !Self::is_webdriver_running(&webdriver_url).await {
            let driver_name = browser_type.driver_name();
            anyhow::bail!(
                "Cannot connect to {} WebDriver at {}.\n\
                Please ensure {} is running:\n\
                  For Firefox: geckodriver --port 4444\n\
                  For Chrome: chromedriver --port 9515",
                driver_name,
                webdriver_url,
                driver_name
            );
        }

        let mut caps = serde_json::Map::new();
        let mut profile_dir = None;

        match &browser_type {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if headless {
                    args.push("--headless".to_string());
                }
                if let Some(vp) = &viewport {
                    args.push(format!("--width={}", vp.width));
                    args.push(format!("--height={}", vp.height));
                }
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                if let Some(vp) = &viewport {
                    args.push(format!("--window-size={},{}", vp.width, vp.height));
                }

                // Chrome refuses to share a user data dir between sessions
                let dir = tempfile::Builder::new()
                    .prefix("locprobe-chrome-")
                    .tempdir()
                    .context("Failed to create Chrome profile directory")?;
                args.push(format!("--user-data-dir={}", dir.path().display()));
                profile_dir = Some(dir);

                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }

        debug!("Connecting to WebDriver at {}", webdriver_url);
        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        if let Some(vp) = viewport {
            debug!("Setting viewport to {}x{}", vp.width, vp.height);
            if let Err(e) = client.set_window_size(vp.width, vp.height).await {
                debug!("Note: Could not set window size: {}", e);
            }
        }

        Ok(Browser {
            client,
            browser_type,
            _profile_dir: profile_dir,
        })
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url.trim_end_matches('/'));

        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.client
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {}", url))?;

        // Wait for the page to be ready; avoids stale references right after load
        let wait_script = "return document.readyState === 'complete';";
        for _ in 0..20 {
            match self.client.execute(wait_script, vec![]).await {
                Ok(val) if val.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(tokio::time::Duration::from_millis(100)).await,
            }
        }
        Ok(())
    }

    async fn first(&self, selector: &Selector) -> LocatorResult<fantoccini::elements::Element> {
        self.client
            .find(locator(selector))
            .await
            .map_err(|e| cmd_error(e, selector))
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

fn locator(selector: &Selector) -> Locator<'_> {
    match selector.language {
        QueryLanguage::Css => Locator::Css(&selector.expression),
        QueryLanguage::XPath => Locator::XPath(&selector.expression),
    }
}

/// Map a driver error for `selector` onto the engine's error kinds
fn cmd_error(error: CmdError, selector: &Selector) -> LocatorError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if error.is_miss() {
        LocatorError::NotFound(selector.to_string())
    } else if lower.contains("stale element") {
        LocatorError::StaleReference(format!("{}: {}", selector, message))
    } else if lower.contains("invalid selector") || lower.contains("syntaxerror") {
        LocatorError::InvalidSelector(format!("{}: {}", selector, message))
    } else {
        LocatorError::Driver(anyhow::Error::new(error).context(format!("While querying {}", selector)))
    }
}

#[async_trait]
impl PageSession for Browser {
    async fn goto(&self, url: &str) -> LocatorResult<()> {
        Ok(self.navigate(url).await?)
    }

    async fn current_url(&self) -> LocatorResult<String> {
        let url = self
            .client
            .current_url()
            .await
            .context("Failed to read current URL")?;
        Ok(url.to_string())
    }

    async fn count(&self, selector: &Selector) -> LocatorResult<usize> {
        match self.client.find_all(locator(selector)).await {
            Ok(elements) => Ok(elements.len()),
            Err(e) if e.is_miss() => Ok(0),
            Err(e) => Err(cmd_error(e, selector)),
        }
    }

    async fn snapshots(&self, selector: &Selector) -> LocatorResult<Vec<ElementSnapshot>> {
        let language = match selector.language {
            QueryLanguage::Css => "css",
            QueryLanguage::XPath => "xpath",
        };
        let value = self
            .client
            .execute(SNAPSHOT_SCRIPT, vec![json!(language), json!(selector.expression)])
            .await
            .map_err(|e| cmd_error(e, selector))?;
        let snapshots: Vec<ElementSnapshot> = serde_json::from_value(value)
            .with_context(|| format!("Unexpected snapshot payload for {}", selector))?;
        debug!("{} matched {} elements", selector, snapshots.len());
        Ok(snapshots)
    }

    async fn fill(&self, selector: &Selector, value: &str) -> LocatorResult<()> {
        let element = self.first(selector).await?;
        debug!("Filling {}", selector);
        element.clear().await.map_err(|e| cmd_error(e, selector))?;
        element
            .send_keys(value)
            .await
            .map_err(|e| cmd_error(e, selector))
    }

    async fn click(&self, selector: &Selector) -> LocatorResult<()> {
        let element = self.first(selector).await?;
        debug!("Clicking {}", selector);
        element.click().await.map_err(|e| cmd_error(e, selector))?;
        Ok(())
    }

    async fn contains_text(&self, text: &str) -> LocatorResult<bool> {
        let value = self
            .client
            .execute(
                "return document.body ? document.body.innerText.includes(arguments[0]) : false;",
                vec![json!(text)],
            )
            .await
            .context("Failed to read page text")?;
        Ok(value.as_bool().unwrap_or(false))
    }
}
