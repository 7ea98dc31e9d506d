//! sim-deck CLI
//!
//! Offline tooling for sim-deck catalogs.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sim_deck_config::{ButtonAction, Config, Profile};
use sim_deck_daemon::catalog::check_profile;
use sim_deck_daemon::keys::{resolve_combo, special_key_names};

#[derive(Parser, Debug)]
#[command(name = "sim-deck")]
#[command(about = "Catalog tooling for the sim-deck touch deck")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/sim-deck/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file and resolve every combo
    Validate,

    /// List the buttons and macros of a profile
    Buttons {
        /// Profile to list (defaults to the active profile)
        #[arg(short, long)]
        profile: Option<String>,
    },

    /// List the named keys usable in combos
    Keys,

    /// Show how a combo resolves to keys
    Resolve {
        /// Combo string, e.g. "lctrl+home"
        combo: String,
    },
}

fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Expand tilde in config path
    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate => cmd_validate(&config_path),
        Commands::Buttons { profile } => cmd_buttons(&config_path, profile.as_deref()),
        Commands::Keys => cmd_keys(),
        Commands::Resolve { combo } => cmd_resolve(&combo),
    }
}

fn load(config_path: &Path) -> miette::Result<Config> {
    tracing::debug!("Parsing {}", config_path.display());
    sim_deck_config::parse_config(config_path).map_err(miette::Report::new)
}

fn cmd_validate(config_path: &Path) -> miette::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = load(config_path)?;

    let mut problem_count = 0;
    for profile in &config.profiles {
        println!(
            "  {} ({} button(s), {} macro(s))",
            profile.name,
            profile.buttons.len(),
            profile.macros.len()
        );
        for problem in check_profile(profile) {
            println!("    error: {}", problem);
            problem_count += 1;
        }
    }

    if problem_count > 0 {
        return Err(miette::miette!(
            "{} combo(s) do not resolve to keys",
            problem_count
        ));
    }

    println!("Configuration is valid!");
    println!("  Profiles: {}", config.profiles.len());
    println!("  Backend: {}", config.global.backend);
    println!("  Listen: {}", config.global.listen);
    println!(
        "  Token: {}",
        if config.global.token.is_empty() { "none (API is open)" } else { "set" }
    );
    Ok(())
}

fn cmd_buttons(config_path: &Path, profile: Option<&str>) -> miette::Result<()> {
    let config = load(config_path)?;

    let profile: &Profile = match profile {
        Some(name) => config
            .profile(name)
            .ok_or_else(|| miette::miette!("No profile named '{}'", name))?,
        None => config
            .default_profile()
            .ok_or_else(|| miette::miette!("Configuration defines no profiles"))?,
    };

    println!("Profile: {}\n", profile.name);

    println!("Buttons:");
    for button in &profile.buttons {
        let action = match &button.action {
            ButtonAction::Combo(combo) => format!("combo {}", combo),
            ButtonAction::Macro(name) => format!("macro {}", name),
        };
        println!("  {:<16} {:<24} {}", button.id, button.label, action);
    }

    if !profile.macros.is_empty() {
        let mut names: Vec<&String> = profile.macros.keys().collect();
        names.sort();

        println!("\nMacros:");
        for name in names {
            let macro_def = &profile.macros[name];
            println!("  {}", name);
            for (i, step) in macro_def.steps.iter().enumerate() {
                if step.delay.is_zero() {
                    println!("    {}. {}", i + 1, step.combo);
                } else {
                    println!("    {}. {} (then wait {:?})", i + 1, step.combo, step.delay);
                }
            }
        }
    }

    Ok(())
}

fn cmd_keys() -> miette::Result<()> {
    println!("Named keys:");
    for name in special_key_names() {
        println!("  {}", name);
    }
    println!("\nAny other single printable character is typed as-is; write '+' as 'plus'.");
    Ok(())
}

fn cmd_resolve(combo: &str) -> miette::Result<()> {
    let keys = resolve_combo(combo).map_err(|e| miette::miette!("'{}': {}", combo, e))?;

    let pressed: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    println!("press:   {}", pressed.join(" -> "));
    let released: Vec<String> = keys.iter().rev().map(|k| k.to_string()).collect();
    println!("release: {}", released.join(" -> "));
    Ok(())
}
