use anyhow::Result;
use tracing::info;

use locprobe::OutputFormat;

use crate::commands::utils::{self, BrowserArgs};

pub async fn handle_evaluate(
    url: String,
    locator: String,
    format: OutputFormat,
    browser: BrowserArgs,
) -> Result<()> {
    info!("Evaluating {} on {}", locator, url);
    let (engine, session) = utils::open(&browser, &url).await?;
    let result = engine
        .evaluate_robustness(
            &session,
            &locator,
            browser.wait_timeout(),
            &utils::cancel_on_ctrl_c(),
        )
        .await;
    utils::close(session).await;
    let report = result?;

    match format {
        OutputFormat::Json => utils::print_json(&report)?,
        OutputFormat::Simple => {
            println!(
                "{}: score {} ({}), {} match(es), {}",
                report.expression,
                report.score,
                report.strategy,
                report.match_count,
                if report.is_robust { "robust" } else { "fragile" }
            );
            for suggestion in &report.suggestions {
                println!("  hint: {}", suggestion);
            }
        }
    }
    Ok(())
}
