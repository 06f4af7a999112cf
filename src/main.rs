#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::authenticate::AuthenticateArgs;
use commands::find::FindArgs;
use commands::utils::{BrowserArgs, LoginArgs, SuccessArgs};
use locprobe::{LocatorError, OutputFormat};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_COMMAND_ERROR: i32 = 1;

#[derive(Parser)]
#[command(name = "locprobe")]
#[command(about = "Resilient locator synthesis and scoring for browser UI tests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Locate an element and rank every way to address it
    Find {
        /// URL to open
        url: String,

        /// Description ("the login button"), CSS selector or xpath=...
        target: Option<String>,

        /// Approximate position instead of a target (x,y,width,height)
        #[arg(long, conflicts_with = "target")]
        region: Option<String>,

        #[command(flatten)]
        login: LoginArgs,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Ranked locators for the element a CSS selector matches now
    Dynamic {
        /// URL to open
        url: String,

        /// CSS selector for the element
        selector: String,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Score an existing locator for robustness
    Evaluate {
        /// URL to open
        url: String,

        /// Locator (css=..., xpath=..., id=..., name=... or bare)
        locator: String,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Map the fields of the first form on the page
    DetectForm {
        /// URL to open
        url: String,

        /// Only consider controls inside this element
        #[arg(long)]
        scope: Option<String>,

        #[command(flatten)]
        login: LoginArgs,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Fill form fields and optionally submit
    FillForm {
        /// URL to open
        url: String,

        /// FIELD=>VALUE, where FIELD is a detected key (email, name_2) or a locator
        #[arg(long = "field", required = true)]
        fields: Vec<String>,

        /// Submit afterwards, with the detected submit control unless a locator is given
        #[arg(long, num_args = 0..=1)]
        submit: Option<Option<String>>,

        #[command(flatten)]
        success: SuccessArgs,

        #[command(flatten)]
        login: LoginArgs,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Log in through a login form
    Authenticate {
        /// Login page URL
        url: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        /// Locator for the username field (detected when omitted)
        #[arg(long)]
        username_locator: Option<String>,

        /// Locator for the password field (detected when omitted)
        #[arg(long)]
        password_locator: Option<String>,

        /// Locator for the submit control (detected when omitted)
        #[arg(long)]
        submit_locator: Option<String>,

        #[command(flatten)]
        success: SuccessArgs,

        /// Output format
        #[arg(short, long, default_value = "json")]
        format: OutputFormat,

        #[command(flatten)]
        browser: BrowserArgs,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            let exit_code = err
                .downcast_ref::<LocatorError>()
                .map(LocatorError::exit_code)
                .unwrap_or(EXIT_COMMAND_ERROR);

            // JSON error on stdout for programmatic consumption
            let error_json = json!({
                "error": true,
                "message": format!("{:#}", err),
                "exit_code": exit_code
            });
            println!(
                "{}",
                serde_json::to_string(&error_json).unwrap_or_else(|_| "{}".to_string())
            );

            eprintln!("Error: {:#}", err);
            std::process::exit(exit_code);
        }
    }
}

async fn run() -> Result<()> {
    // Logs go to stderr so JSON output on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locprobe=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Find {
            url,
            target,
            region,
            login,
            format,
            browser,
        } => {
            commands::find::handle_find(FindArgs {
                url,
                target,
                region,
                login,
                format,
                browser,
            })
            .await?
        }

        Commands::Dynamic {
            url,
            selector,
            format,
            browser,
        } => commands::find::handle_dynamic(url, selector, format, browser).await?,

        Commands::Evaluate {
            url,
            locator,
            format,
            browser,
        } => commands::evaluate::handle_evaluate(url, locator, format, browser).await?,

        Commands::DetectForm {
            url,
            scope,
            login,
            format,
            browser,
        } => commands::form::handle_detect_form(url, scope, login, format, browser).await?,

        Commands::FillForm {
            url,
            fields,
            submit,
            success,
            login,
            browser,
        } => {
            commands::form::handle_fill_form(url, fields, submit, success, login, browser).await?
        }

        Commands::Authenticate {
            url,
            username,
            password,
            username_locator,
            password_locator,
            submit_locator,
            success,
            format,
            browser,
        } => {
            commands::authenticate::handle_authenticate(AuthenticateArgs {
                url,
                username,
                password,
                username_locator,
                password_locator,
                submit_locator,
                success,
                format,
                browser,
            })
            .await?
        }
    }

    Ok(())
}
