use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use locprobe::{
    Browser, BrowserType, Credentials, EngineConfig, LocatorEngine, LocatorError, LoginRequest,
    PageOptions, PageSession, Selector, Session, SuccessIndicator, ViewportSize,
};

/// Browser and engine flags shared by every subcommand
#[derive(clap::Args, Debug, Clone)]
pub struct BrowserArgs {
    /// Browser to use (firefox or chrome)
    #[arg(short, long, default_value = "firefox")]
    pub browser: String,

    /// WebDriver endpoint (defaults to the browser's usual port)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Set viewport size (WIDTHxHEIGHT, e.g., 1920x1080)
    #[arg(long)]
    pub viewport: Option<String>,

    /// Run browser with a visible window
    #[arg(long)]
    pub no_headless: bool,

    /// Engine configuration file (defaults to ~/.locprobe/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum wait in milliseconds
    #[arg(long)]
    pub wait: Option<u64>,
}

impl BrowserArgs {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait.map(Duration::from_millis)
    }
}

/// How success is recognised after submitting
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SuccessArgs {
    /// Element that appears on success
    #[arg(long)]
    pub success_element: Option<String>,

    /// Text the URL contains on success
    #[arg(long)]
    pub success_url: Option<String>,

    /// Text that appears on the page on success
    #[arg(long)]
    pub success_text: Option<String>,
}

impl SuccessArgs {
    pub fn indicator(&self) -> Result<Option<SuccessIndicator>> {
        if let Some(element) = &self.success_element {
            return Ok(Some(SuccessIndicator::ElementPresent(Selector::parse(
                element,
            )?)));
        }
        if let Some(fragment) = &self.success_url {
            return Ok(Some(SuccessIndicator::UrlContains(fragment.clone())));
        }
        Ok(self.success_text.clone().map(SuccessIndicator::TextPresent))
    }
}

/// Log in before the operation; the requested page is reopened afterwards
#[derive(clap::Args, Debug, Clone, Default)]
pub struct LoginArgs {
    /// Login page to authenticate on first
    #[arg(long, requires_all = ["username", "password"])]
    pub login_url: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,
}

impl LoginArgs {
    pub fn options(&self, browser: &BrowserArgs) -> Result<PageOptions> {
        let login = match (&self.login_url, &self.username, &self.password) {
            (Some(url), Some(username), Some(password)) => Some(LoginRequest::new(
                url.clone(),
                Credentials {
                    username: username.clone(),
                    password: password.clone(),
                },
                browser.wait_timeout().unwrap_or(DEFAULT_LOGIN_WAIT),
            )),
            (None, _, _) => None,
            _ => anyhow::bail!("--login-url requires --username and --password"),
        };
        Ok(PageOptions {
            wait_timeout: browser.wait_timeout(),
            need_login: login.is_some(),
            login,
            cancel: cancel_on_ctrl_c(),
        })
    }
}

const DEFAULT_LOGIN_WAIT: Duration = Duration::from_secs(10);

pub fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::load_default(),
    }
}

/// Load the engine, connect a browser and open `url`
pub async fn open(args: &BrowserArgs, url: &str) -> Result<(LocatorEngine, Session<Browser>)> {
    let engine = LocatorEngine::new(load_config(args.config.as_ref())?);
    let browser_type: BrowserType = args.browser.parse()?;
    let viewport = args
        .viewport
        .as_deref()
        .map(ViewportSize::parse)
        .transpose()?;

    let browser = Browser::connect(
        browser_type,
        args.webdriver_url.clone(),
        viewport,
        !args.no_headless,
    )
    .await
    .map_err(LocatorError::Driver)?;

    if !url.is_empty()
        && let Err(e) = browser.goto(url).await
    {
        close(Session::new(browser)).await;
        return Err(e.into());
    }
    Ok((engine, Session::new(browser)))
}

/// Close the browser, logging rather than failing
pub async fn close(session: Session<Browser>) {
    if let Err(e) = session.into_page().close().await {
        debug!("Failed to close browser: {}", e);
    }
}

/// Token cancelled on Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}
