// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow, bail};
use config::Config;
use parkpay_app::AppState;
use parkpay_db::SessionStore;
use runtime::ApiRuntime;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    match options.action {
        CliAction::Help => {
            print_help();
            return Ok(());
        }
        CliAction::PrintConfigPath => {
            println!("{}", options.config_path.display());
            return Ok(());
        }
        CliAction::PrintExampleConfig => {
            print!("{}", Config::example_config(&options.config_path));
            return Ok(());
        }
        CliAction::PrintDbPath | CliAction::Launch => {}
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `parkpay --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.action == CliAction::PrintDbPath {
        println!("{}", db_path.display());
        return Ok(());
    }

    let log_file = config.log_file()?;
    logging::init(config.log_level(), &log_file)?;
    info!(
        config = %options.config_path.display(),
        db = %db_path.display(),
        demo = options.demo,
        "starting parkpay"
    );

    let store = SessionStore::open(&db_path).with_context(|| {
        format!(
            "open session store {} -- if this path is wrong, set [storage].db_path or PARKPAY_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;
    if options.demo {
        store.seed_demo_session()?;
    }

    let client = parkpay_api::Client::new(
        config.api_base_url(),
        &config.api_key(),
        config.api_timeout()?,
    )
    .with_context(|| {
        format!(
            "invalid [api] config in {}; fix base_url/timeout values",
            options.config_path.display()
        )
    })?;
    if !client.has_api_key() {
        warn!("no API key configured; set [api].api_key or PARKPAY_API_KEY");
    }
    if options.check_only {
        println!("config, session store, and API settings look good");
        return Ok(());
    }

    let mut state = AppState::default();
    let mut runtime = ApiRuntime::new(&store, client, config.history_policy());
    parkpay_tui::run_app(&mut state, &mut runtime)
}

/// What to do instead of, or before, launching the TUI. Print flags exit
/// early; the first one given wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliAction {
    Launch,
    Help,
    PrintConfigPath,
    PrintDbPath,
    PrintExampleConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    action: CliAction,
    demo: bool,
    check_only: bool,
}

impl CliOptions {
    fn request(&mut self, action: CliAction) {
        if self.action == CliAction::Launch || action == CliAction::Help {
            self.action = action;
        }
    }
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        action: CliAction::Launch,
        demo: false,
        check_only: false,
    };
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let path = iter.next().ok_or_else(|| {
                    anyhow!("--config requires a file path, for example --config ~/parkpay.toml")
                })?;
                options.config_path = PathBuf::from(path.as_ref());
            }
            "--print-config-path" => options.request(CliAction::PrintConfigPath),
            "--print-path" => options.request(CliAction::PrintDbPath),
            "--print-example-config" => options.request(CliAction::PrintExampleConfig),
            "--help" | "-h" => options.request(CliAction::Help),
            "--demo" => options.demo = true,
            "--check" => options.check_only = true,
            unknown => {
                bail!("unknown argument {unknown:?}; run with --help to see supported options")
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("parkpay: parking payments and subscriptions in the terminal");
    println!();
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved session store path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Launch signed in to a demo account (in-memory)");
    println!("  --check                  Validate config, session store, and API settings");
    println!("  --help                   Show this help");
    println!();
    println!("Logs go to [logging].file; PARKPAY_LOG overrides the level filter.");
}

#[cfg(test)]
mod tests {
    use super::{CliAction, CliOptions, parse_cli_args};
    use anyhow::Result;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/parkpay-config.toml")
    }

    #[test]
    fn no_arguments_launch_with_the_default_config() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                action: CliAction::Launch,
                demo: false,
                check_only: false,
            }
        );
        Ok(())
    }

    #[test]
    fn config_flag_overrides_the_path() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/parkpay.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/parkpay.toml"));
        Ok(())
    }

    #[test]
    fn config_flag_without_value_fails() {
        let error = parse_cli_args(vec!["--config"], default_options_path())
            .expect_err("missing config value should fail");
        assert!(error.to_string().contains("--config requires a file path"));
    }

    #[test]
    fn unknown_argument_points_at_help() {
        let error = parse_cli_args(vec!["--pay"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn demo_and_check_combine_with_a_print_action() -> Result<()> {
        let options = parse_cli_args(
            vec!["--demo", "--check", "--print-path"],
            default_options_path(),
        )?;
        assert_eq!(options.action, CliAction::PrintDbPath);
        assert!(options.demo);
        assert!(options.check_only);
        Ok(())
    }

    #[test]
    fn first_print_flag_wins() -> Result<()> {
        let options = parse_cli_args(
            vec!["--print-example-config", "--print-config-path"],
            default_options_path(),
        )?;
        assert_eq!(options.action, CliAction::PrintExampleConfig);
        Ok(())
    }

    #[test]
    fn help_wins_over_everything() -> Result<()> {
        let long = parse_cli_args(vec!["--print-path", "--help"], default_options_path())?;
        assert_eq!(long.action, CliAction::Help);

        let short = parse_cli_args(vec!["-h"], default_options_path())?;
        assert_eq!(short.action, CliAction::Help);
        Ok(())
    }
}
