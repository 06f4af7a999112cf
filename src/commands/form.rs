use anyhow::Result;
use tracing::info;

use locprobe::{FieldInput, OutputFormat, Selector};

use crate::commands::find::print_ranked;
use crate::commands::utils::{self, BrowserArgs, LoginArgs, SuccessArgs};

pub async fn handle_detect_form(
    url: String,
    scope: Option<String>,
    login: LoginArgs,
    format: OutputFormat,
    browser: BrowserArgs,
) -> Result<()> {
    info!("Detecting form on {}", url);
    let scope = scope.as_deref().map(Selector::parse).transpose()?;
    let options = login.options(&browser)?;
    let (engine, mut session) = utils::open(&browser, &url).await?;
    let result = engine
        .detect_form(&mut session, scope.as_ref(), options)
        .await;
    utils::close(session).await;
    let form = result?;

    match format {
        OutputFormat::Json => utils::print_json(&form)?,
        OutputFormat::Simple => {
            for field in form.fields.iter().chain(&form.unknown) {
                println!(
                    "{} ({:?}{}){}",
                    field.key,
                    field.kind,
                    if field.required { ", required" } else { "" },
                    field
                        .label
                        .as_deref()
                        .map(|l| format!(": {}", l))
                        .unwrap_or_default()
                );
                print_ranked(&field.locators);
            }
        }
    }
    Ok(())
}

/// Parse `FIELD=>VALUE`
pub fn parse_field(raw: &str) -> Result<FieldInput> {
    let (field, value) = raw
        .split_once("=>")
        .ok_or_else(|| anyhow::anyhow!("Invalid field '{}'. Use FIELD=>VALUE", raw))?;
    let field = field.trim();
    if field.is_empty() {
        anyhow::bail!("Invalid field '{}'. Use FIELD=>VALUE", raw);
    }
    Ok(FieldInput::new(field, value))
}

pub async fn handle_fill_form(
    url: String,
    fields: Vec<String>,
    submit: Option<Option<String>>,
    success: SuccessArgs,
    login: LoginArgs,
    browser: BrowserArgs,
) -> Result<()> {
    let inputs = fields
        .iter()
        .map(String::as_str)
        .map(parse_field)
        .collect::<Result<Vec<_>>>()?;
    let indicator = success.indicator()?;
    let submit = submit.map(|s| s.unwrap_or_default());
    info!("Filling {} fields on {}", inputs.len(), url);
    let options = login.options(&browser)?;

    let (engine, mut session) = utils::open(&browser, &url).await?;
    let result = engine
        .fill_form(
            &mut session,
            &inputs,
            submit.as_deref(),
            indicator.as_ref(),
            options,
        )
        .await;
    utils::close(session).await;
    result?;

    println!("Form filled");
    Ok(())
}
