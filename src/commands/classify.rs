//! Implementation of the `drover classify` command.

use crate::cli::ClassifyArgs;
use anyhow::{Context, Result};
use drover::provider::ProviderKind;

/// Execute the `drover classify` command.
pub fn cmd_classify(args: ClassifyArgs) -> Result<()> {
    let provider: ProviderKind = args.provider.parse()?;
    let classification = provider
        .provider()
        .classify_failure(&args.text, args.exit_code);
    let json = serde_json::to_string_pretty(&classification)
        .context("failed to serialize classification")?;
    println!("{}", json);
    Ok(())
}
