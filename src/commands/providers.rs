//! Implementation of the `drover providers` command.

use crate::cli::ProvidersArgs;
use anyhow::Result;
use drover::config::Config;
use drover::provider::ProviderKind;

/// Execute the `drover providers` command.
///
/// Lists each provider with the command it will run, taking the project's
/// overrides into account when `--project` is given.
pub fn cmd_providers(args: ProvidersArgs) -> Result<()> {
    let config = match args.project {
        Some(project) => Config::load_for_project(&project)?,
        None => Config::default(),
    };

    for kind in ProviderKind::ALL {
        let provider = kind.provider();
        let profile = config.provider_profile(kind);
        let command = profile
            .and_then(|p| p.command.as_deref())
            .unwrap_or(provider.default_command());

        println!("{:<8} {}", kind.name(), command);
        if let Some(profile) = profile {
            if !profile.args.is_empty() {
                println!("         args: {}", profile.args);
            }
            let mut env: Vec<_> = profile.environment.keys().collect();
            env.sort();
            if !env.is_empty() {
                println!(
                    "         env:  {}",
                    env.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
                );
            }
        }
    }
    Ok(())
}
