use anyhow::Result;
use std::time::Duration;
use tracing::info;

use locprobe::{Credentials, LoginLocators, LoginRequest, OutputFormat, Selector};

use crate::commands::utils::{self, BrowserArgs, SuccessArgs};

pub struct AuthenticateArgs {
    pub url: String,
    pub username: String,
    pub password: String,
    pub username_locator: Option<String>,
    pub password_locator: Option<String>,
    pub submit_locator: Option<String>,
    pub success: SuccessArgs,
    pub format: OutputFormat,
    pub browser: BrowserArgs,
}

fn parse_optional(raw: &Option<String>) -> Result<Option<Selector>> {
    Ok(raw.as_deref().map(Selector::parse).transpose()?)
}

pub async fn handle_authenticate(args: AuthenticateArgs) -> Result<()> {
    let locators = LoginLocators {
        username: parse_optional(&args.username_locator)?,
        password: parse_optional(&args.password_locator)?,
        submit: parse_optional(&args.submit_locator)?,
    };
    let timeout = args
        .browser
        .wait_timeout()
        .unwrap_or_else(|| Duration::from_secs(10));
    let mut request = LoginRequest::new(
        args.url.clone(),
        Credentials {
            username: args.username.clone(),
            password: args.password.clone(),
        },
        timeout,
    )
    .with_locators(locators);
    if let Some(indicator) = args.success.indicator()? {
        request = request.with_success(indicator);
    }
    info!("Authenticating {} at {}", args.username, args.url);

    // login navigates itself
    let (engine, mut session) = utils::open(&args.browser, "").await?;
    let result = engine
        .authenticate(&mut session, &request, &utils::cancel_on_ctrl_c())
        .await;
    let state = session.auth_state().clone();
    utils::close(session).await;
    result?;

    match args.format {
        OutputFormat::Json => utils::print_json(&state)?,
        OutputFormat::Simple => println!("Authenticated as {}", args.username),
    }
    Ok(())
}
