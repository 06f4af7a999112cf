use anyhow::Result;
use tracing::info;

use locprobe::{BoundingBox, OutputFormat, RankedLocatorSet, Target};

use crate::commands::utils::{self, BrowserArgs, LoginArgs};

pub struct FindArgs {
    pub url: String,
    pub target: Option<String>,
    pub region: Option<String>,
    pub login: LoginArgs,
    pub format: OutputFormat,
    pub browser: BrowserArgs,
}

pub async fn handle_find(args: FindArgs) -> Result<()> {
    let target = match (&args.target, &args.region) {
        (_, Some(region)) => Target::Region(BoundingBox::parse(region)?),
        (Some(target), None) => Target::infer(target),
        (None, None) => anyhow::bail!("Provide a target or --region x,y,width,height"),
    };
    info!("Finding locators for {} on {}", target, args.url);
    let options = args.login.options(&args.browser)?;

    let (engine, mut session) = utils::open(&args.browser, &args.url).await?;
    let result = engine.find_locator(&mut session, &target, options).await;
    utils::close(session).await;
    let report = result?;

    match args.format {
        OutputFormat::Json => utils::print_json(&report)?,
        OutputFormat::Simple => {
            println!("{} -> <{}>", report.target, report.snapshot.tag);
            print_ranked(&report.locators);
        }
    }
    Ok(())
}

pub async fn handle_dynamic(
    url: String,
    selector: String,
    format: OutputFormat,
    browser: BrowserArgs,
) -> Result<()> {
    info!("Generating locators for {} on {}", selector, url);
    let (engine, session) = utils::open(&browser, &url).await?;
    let result = engine
        .find_dynamic_locators(
            &session,
            &selector,
            browser.wait_timeout(),
            &utils::cancel_on_ctrl_c(),
        )
        .await;
    utils::close(session).await;
    let locators = result?;

    match format {
        OutputFormat::Json => utils::print_json(&locators)?,
        OutputFormat::Simple => print_ranked(&locators),
    }
    Ok(())
}

pub fn print_ranked(locators: &RankedLocatorSet) {
    for (i, candidate) in locators.iter().enumerate() {
        let shared = match candidate.match_count {
            Some(count) if count != 1 => format!("  ({} matches)", count),
            _ => String::new(),
        };
        println!(
            "[{}] {:>3}  {:<24} {}{}",
            i, candidate.score, candidate.strategy, candidate.selector, shared
        );
    }
    for suggestion in &locators.suggestions {
        println!("  hint: {}", suggestion);
    }
}
