//! Oracle-driven task orchestrator.
//!
//! Plans an objective into `.taskloop/plan.json`, then drives the plan to
//! completion one verified step at a time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use taskloop::core::plan::TaskPlan;
use taskloop::core::selector::peek_eligible;
use taskloop::exit_codes;
use taskloop::io::config::{Config, load_config, write_config};
use taskloop::io::journal::Journal;
use taskloop::io::oracle::CommandOracle;
use taskloop::io::plan_store::{load_plan, write_plan};
use taskloop::io::verify::FsProbe;
use taskloop::orchestrator::Orchestrator;
use taskloop::tools::ToolRegistry;

const CONFIG_FILE: &str = "taskloop.toml";
const PLAN_FILE: &str = ".taskloop/plan.json";
const SUMMARY_TASKS: usize = 50;

#[derive(Parser)]
#[command(
    name = "taskloop",
    version,
    about = "Plan an objective and drive it to verified completion"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `taskloop.toml` into the working directory.
    Init {
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Plan the objective (or resume a saved plan) and run the loop.
    Run {
        #[arg(short, long)]
        objective: Option<String>,
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
        /// Config file; defaults to `<workdir>/taskloop.toml`.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Resume from a saved plan instead of planning.
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Only plan the objective and save it.
    Plan {
        #[arg(short, long)]
        objective: String,
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show a saved plan, re-verified against the disk.
    Status {
        /// Defaults to `<workdir>/.taskloop/plan.json`.
        #[arg(long)]
        plan: Option<PathBuf>,
        #[arg(long, default_value = ".")]
        workdir: PathBuf,
    },
    /// Print the tool catalog as JSON.
    Tools,
}

fn main() {
    taskloop::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { workdir, force } => cmd_init(&workdir, force),
        Command::Run {
            objective,
            workdir,
            config,
            max_iterations,
            plan,
        } => cmd_run(objective, &workdir, config, max_iterations, plan),
        Command::Plan {
            objective,
            workdir,
            config,
        } => cmd_plan(&objective, &workdir, config),
        Command::Status { plan, workdir } => cmd_status(plan, &workdir),
        Command::Tools => cmd_tools(),
    }
}

fn cmd_init(workdir: &Path, force: bool) -> Result<i32> {
    let path = workdir.join(CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &Config::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    objective: Option<String>,
    workdir: &Path,
    config_path: Option<PathBuf>,
    max_iterations: Option<u32>,
    plan_path: Option<PathBuf>,
) -> Result<i32> {
    let workdir = resolve_workdir(workdir)?;
    let mut config = read_config(&workdir, config_path)?;
    if let Some(max_iterations) = max_iterations {
        config.max_iterations = max_iterations;
    }
    config.validate()?;

    let loaded = plan_path.map(|path| load_plan(&path)).transpose()?;
    let run_dir = run_workdir(loaded.as_ref(), &workdir);
    let orchestrator = build_orchestrator(&run_dir, config)?;
    let mut plan = match (loaded, objective) {
        (Some(plan), _) => plan,
        (None, Some(objective)) => orchestrator.plan(&objective, &run_dir),
        (None, None) => bail!("either --objective or --plan is required"),
    };

    let max_iterations = orchestrator.config().max_iterations;
    let result = orchestrator.run(&mut plan, max_iterations);
    write_plan(&run_dir.join(PLAN_FILE), &plan)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("serialize run result")?
    );
    Ok(exit_codes::for_termination(result.termination))
}

fn cmd_plan(objective: &str, workdir: &Path, config_path: Option<PathBuf>) -> Result<i32> {
    let workdir = resolve_workdir(workdir)?;
    let config = read_config(&workdir, config_path)?;
    config.validate()?;

    let orchestrator = build_orchestrator(&workdir, config)?;
    let plan = orchestrator.plan(objective, &workdir);
    let plan_path = workdir.join(PLAN_FILE);
    write_plan(&plan_path, &plan)?;

    for line in plan.summary_lines(SUMMARY_TASKS) {
        println!("{line}");
    }
    println!("saved {}", plan_path.display());
    Ok(exit_codes::OK)
}

fn cmd_status(plan_path: Option<PathBuf>, workdir: &Path) -> Result<i32> {
    let plan_path = plan_path.unwrap_or_else(|| workdir.join(PLAN_FILE));
    let plan = load_plan(&plan_path)?;
    let probe = FsProbe::new(&plan.working_directory);

    println!("objective: {}", plan.user_request);
    for line in plan.summary_lines(SUMMARY_TASKS) {
        println!("{line}");
    }
    println!("completion: {:.1}%", plan.completion_percentage());
    match peek_eligible(&plan) {
        Some(task) => println!("next: {} {}", task.id, task.name),
        None => println!("next: none"),
    }

    if plan.is_complete(&probe) {
        println!("verified: yes");
        Ok(exit_codes::OK)
    } else {
        println!("verified: no");
        Ok(exit_codes::PARTIAL)
    }
}

fn cmd_tools() -> Result<i32> {
    let registry = ToolRegistry::with_builtin_tools()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&registry.catalog()).context("serialize tool catalog")?
    );
    Ok(exit_codes::OK)
}

fn resolve_workdir(workdir: &Path) -> Result<PathBuf> {
    fs::canonicalize(workdir).with_context(|| format!("resolve workdir {}", workdir.display()))
}

/// A resumed plan runs where it was planned, whatever `--workdir` says.
fn run_workdir(plan: Option<&TaskPlan>, cli_workdir: &Path) -> PathBuf {
    plan.map_or_else(
        || cli_workdir.to_path_buf(),
        |plan| plan.working_directory.clone(),
    )
}

fn read_config(workdir: &Path, config_path: Option<PathBuf>) -> Result<Config> {
    let path = config_path.unwrap_or_else(|| workdir.join(CONFIG_FILE));
    load_config(&path)
}

fn build_orchestrator(workdir: &Path, config: Config) -> Result<Orchestrator<CommandOracle>> {
    let oracle = CommandOracle::from_config(&config.oracle)?;
    let registry = ToolRegistry::with_builtin_tools()?;
    let journal = Journal::from_config(workdir, &config.journal);
    let orchestrator = Orchestrator::new(oracle, registry, config);
    Ok(match journal {
        Some(journal) => orchestrator.with_journal(journal),
        None => orchestrator,
    })
}
