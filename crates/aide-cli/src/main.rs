use aide_core::prelude::ApplyOptions;
use aide_core::{telemetry, AideConfig, ApplyRequest, IdeBackend};
use aide_types::{CorrelationId, Plan};
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::path::{Path, PathBuf};

fn cli() -> Command {
    let root = Arg::new("root")
        .long("root")
        .value_parser(value_parser!(PathBuf))
        .help("Workspace root (overrides the config file)");
    let plan = Arg::new("plan")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Plan JSON file");

    Command::new("aide")
        .version(aide_core::VERSION)
        .about("Validate and apply AI edit plans against a workspace")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML or YAML configuration file"),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a plan without touching the workspace")
                .arg(root.clone())
                .arg(plan.clone()),
        )
        .subcommand(
            Command::new("apply")
                .about("Apply a plan as one transaction")
                .arg(root.clone())
                .arg(plan)
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Validate and simulate only"),
                )
                .arg(
                    Arg::new("no-backups")
                        .long("no-backups")
                        .action(ArgAction::SetTrue)
                        .help("Skip backups; failures cannot be rolled back"),
                )
                .arg(
                    Arg::new("no-format")
                        .long("no-format")
                        .action(ArgAction::SetTrue)
                        .help("Do not run the formatter on written files"),
                )
                .arg(
                    Arg::new("only")
                        .long("only")
                        .action(ArgAction::Append)
                        .help("Apply only this change path (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("tree")
                .about("Print the file tree")
                .arg(root.clone())
                .arg(
                    Arg::new("depth")
                        .long("depth")
                        .value_parser(value_parser!(usize))
                        .help("Maximum depth (capped by configuration)"),
                )
                .arg(Arg::new("path").help("Start directory (default: workspace root)")),
        )
        .subcommand(
            Command::new("meta")
                .about("Print metadata for one path")
                .arg(root)
                .arg(Arg::new("path").required(true).help("Workspace-relative path")),
        )
}

fn load_config(matches: &ArgMatches, args: &ArgMatches) -> anyhow::Result<AideConfig> {
    let config_path = args
        .get_one::<PathBuf>("config")
        .or_else(|| matches.get_one::<PathBuf>("config"));
    let mut config = match config_path {
        Some(path) => AideConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            let mut config = AideConfig::new();
            config.apply_environment_override(std::env::var(aide_core::ENV_VAR).ok().as_deref())?;
            config
        }
    };
    if let Some(root) = args.get_one::<PathBuf>("root") {
        config.workspace_root = root.clone();
    }
    Ok(config)
}

fn read_plan(path: &Path) -> anyhow::Result<Plan> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading plan {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing plan {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn apply_options(args: &ArgMatches) -> ApplyOptions {
    ApplyOptions {
        create_backups: !args.get_flag("no-backups"),
        format_on_save: !args.get_flag("no-format"),
        dry_run: args.get_flag("dry-run"),
    }
}

/// Run one subcommand; returns whether it succeeded
async fn run(matches: &ArgMatches) -> anyhow::Result<bool> {
    let Some((name, args)) = matches.subcommand() else {
        anyhow::bail!("no subcommand given");
    };
    let config = load_config(matches, args)?;
    telemetry::init(config.environment).ok();
    let backend = IdeBackend::from_config(&config)
        .with_context(|| format!("opening workspace {}", config.workspace_root.display()))?;
    let cid = CorrelationId::new();

    match name {
        "validate" => {
            let plan = read_plan(args.get_one::<PathBuf>("plan").context("plan path required")?)?;
            let submission = backend.submit_plan(plan, &cid).await;
            print_json(&submission.validation)?;
            Ok(submission.validation.valid)
        }
        "apply" => {
            let plan = read_plan(args.get_one::<PathBuf>("plan").context("plan path required")?)?;
            let submission = backend.submit_plan(plan, &cid).await;
            let mut request = ApplyRequest::new(submission.plan.id).with_options(apply_options(args));
            if let Some(only) = args.get_many::<String>("only") {
                request = request.with_selected_files(only.cloned());
            }
            let result = match backend.apply_plan(request, &cid).await {
                Ok(result) => result,
                Err(err) => {
                    print_json(&backend.error_response(&err, &cid))?;
                    return Ok(false);
                }
            };
            print_json(&result)?;
            Ok(result.success)
        }
        "tree" => {
            let start = args.get_one::<String>("path").map_or("", String::as_str);
            let depth = args.get_one::<usize>("depth").copied();
            match backend.file_tree(start, depth).await {
                Ok(tree) => print_json(&tree).map(|()| true),
                Err(err) => print_json(&backend.error_response(&err, &cid)).map(|()| false),
            }
        }
        "meta" => {
            let path = args.get_one::<String>("path").context("path required")?;
            match backend.file_metadata(path).await {
                Ok(meta) => print_json(&meta).map(|()| true),
                Err(err) => print_json(&backend.error_response(&err, &cid)).map(|()| false),
            }
        }
        other => anyhow::bail!("unknown subcommand {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    let ok = run(&matches).await?;
    std::process::exit(if ok { 0 } else { 1 });
}
