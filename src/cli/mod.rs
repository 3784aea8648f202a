use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;

use crate::engine::{Engine, EngineOptions, PollRequest};
use crate::poll::PollLimits;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "bhpoll",
    version,
    about = "BloodHound Enterprise の所見を SOAR のコンテナ/アーティファクトとして取り込む"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Per-request timeout in seconds; overrides `poll.request_timeout_secs`.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    TestConnectivity,
    Poll(PollArgs),
    Asset(AssetArgs),
    PathExists(PathExistsArgs),
    ObjectId(ObjectIdArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct PollArgs {
    #[arg(long)]
    pub max_containers: Option<u64>,
    #[arg(long)]
    pub max_artifacts: Option<u64>,
    /// Write into an in-memory case store instead of SOAR.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct AssetArgs {
    pub object_id: String,
}

#[derive(Debug, Args)]
pub struct PathExistsArgs {
    #[arg(long)]
    pub start: String,
    #[arg(long)]
    pub end: String,
}

#[derive(Debug, Args)]
pub struct ObjectIdArgs {
    pub name: String,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Serialize)]
struct PathExistsOutput<'a> {
    start_node: &'a str,
    end_node: &'a str,
    exists: bool,
}

#[derive(Debug, Serialize)]
struct ObjectIdOutput<'a> {
    name: &'a str,
    object_id: Option<&'a str>,
}

pub fn run() -> Result<()> {
    // Must run before any thread is spawned.
    let local_offset = crate::signer::local_offset();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let env_config_path = std::env::var_os("BHPOLL_CONFIG").map(PathBuf::from);
    let cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        &home_dir,
    )
    .map_err(crate::exit::invalid_args_err)?;

    let ui_cfg = UiConfig {
        color: stdout_is_tty && !cli.no_color,
        stderr_is_tty,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let timeout_secs = cli.timeout.unwrap_or(cfg.poll.request_timeout_secs);
    if timeout_secs == 0 {
        return Err(crate::exit::invalid_args(
            "--timeout は 0 より大きい必要があります",
        ));
    }
    let limits = PollLimits {
        max_containers: cfg.poll.max_containers,
        max_artifacts: cfg.poll.max_artifacts,
    };
    let engine_opts = EngineOptions {
        timeout: Duration::from_secs(timeout_secs),
        show_progress: ui_cfg.stderr_is_tty && !ui_cfg.quiet && !cli.json,
        local_offset,
    };

    match cli.command {
        Commands::TestConnectivity => {
            let engine = Engine::new(cfg, home_dir, engine_opts);
            let version = engine.test_connectivity()?;
            if cli.json {
                write_json(&version)?;
            } else {
                crate::ui::print_connectivity(&version, &ui_cfg);
            }
        }
        Commands::Poll(args) => {
            let limits = PollLimits {
                max_containers: args.max_containers.or(limits.max_containers),
                max_artifacts: args.max_artifacts.or(limits.max_artifacts),
            };
            let engine = Engine::new(cfg, home_dir, engine_opts);
            let report = engine.poll(PollRequest {
                limits,
                dry_run: args.dry_run,
            })?;
            if cli.json {
                write_json(&report)?;
            } else {
                if report.dry_run && !ui_cfg.quiet {
                    println!("dry-run: SOAR には書き込んでいません");
                }
                crate::ui::print_poll_summary(&report.summary, Some(&report.log_path), &ui_cfg);
            }
        }
        Commands::Asset(args) => {
            let object_id = non_empty(&args.object_id, "asset: OBJECT_ID")?;
            let engine = Engine::new(cfg, home_dir, engine_opts);
            let info = engine.asset(object_id)?;
            if cli.json {
                write_json(&info)?;
            } else {
                crate::ui::print_asset(object_id, info.as_ref(), &ui_cfg);
            }
        }
        Commands::PathExists(args) => {
            let start = non_empty(&args.start, "path-exists: --start")?;
            let end = non_empty(&args.end, "path-exists: --end")?;
            let engine = Engine::new(cfg, home_dir, engine_opts);
            let exists = engine.path_exists(start, end)?;
            if cli.json {
                write_json(&PathExistsOutput {
                    start_node: start,
                    end_node: end,
                    exists,
                })?;
            } else {
                crate::ui::print_path_exists(start, end, exists, &ui_cfg);
            }
        }
        Commands::ObjectId(args) => {
            let name = non_empty(&args.name, "object-id: NAME")?;
            let engine = Engine::new(cfg, home_dir, engine_opts);
            let object_id = engine.object_id(name)?;
            if cli.json {
                write_json(&ObjectIdOutput {
                    name,
                    object_id: object_id.as_deref(),
                })?;
            } else {
                crate::ui::print_object_id(name, object_id.as_deref(), &ui_cfg);
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "bhpoll", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                let shown = cfg.masked();
                if cli.json {
                    write_json(&shown)?;
                } else {
                    println!("{}", toml::to_string_pretty(&shown)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: `bhpoll config --show` を使用してください");
            }
        }
    }

    Ok(())
}


/// stderr only; stdout stays parseable under `--json`.
fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn non_empty<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(crate::exit::invalid_args(format!("{what} は空にできません")));
    }
    Ok(value)
}

fn write_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish を指定してください）"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_poll_limits_and_global_flags() {
        let cli = Cli::try_parse_from([
            "bhpoll",
            "poll",
            "--max-containers",
            "3",
            "--dry-run",
            "--json",
            "--timeout",
            "5",
        ])
        .expect("parse");
        assert!(cli.json);
        assert_eq!(cli.timeout, Some(5));
        let Commands::Poll(args) = cli.command else {
            panic!("expected poll");
        };
        assert_eq!(args.max_containers, Some(3));
        assert_eq!(args.max_artifacts, None);
        assert!(args.dry_run);
    }

    #[test]
    fn path_exists_requires_both_nodes() {
        assert!(Cli::try_parse_from(["bhpoll", "path-exists", "--start", "a"]).is_err());
        let cli = Cli::try_parse_from(["bhpoll", "path-exists", "--start", "a", "--end", "b"])
            .expect("parse");
        assert!(matches!(cli.command, Commands::PathExists(_)));
    }

    #[test]
    fn parse_shell_rejects_unknown_shells_as_invalid_args() {
        assert_eq!(parse_shell(" ZSH ").expect("zsh"), clap_complete::Shell::Zsh);
        let err = parse_shell("powershell").unwrap_err();
        assert_eq!(crate::exit::exit_code(&err), 2);
    }

    #[test]
    fn non_empty_trims_and_rejects_blank() {
        assert_eq!(non_empty("  S-1 ", "x").expect("value"), "S-1");
        assert!(non_empty("   ", "x").is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
