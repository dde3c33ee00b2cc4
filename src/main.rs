use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;

use plantpipe::config::Config;
use plantpipe::{Loader, LoaderConfig, PipelineGraph, Result, TaskNode};

/// plantpipe - validate and inspect plant reconstruction pipeline documents
#[derive(Parser, Debug)]
#[command(name = "plantpipe")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    PLANTPIPE_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG              Override the log filter"
)]
pub struct Cli {
    /// Configuration file (default: ~/.plantpipe/plantpipe.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging on stderr
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline document commands. FILE defaults to the configured default document.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Load a pipeline document and report every problem found
    Check { file: Option<PathBuf> },

    /// Print tasks in execution order
    Order {
        file: Option<PathBuf>,

        /// Print JSON instead of one task per line
        #[arg(long)]
        json: bool,
    },

    /// Print the tasks needed to produce a target task
    Plan {
        file: Option<PathBuf>,

        /// Target task (default: the last leaf task of the document)
        #[arg(short = 't', long)]
        task: Option<String>,

        /// Print tasks with their parameters as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the task dependency graph as Graphviz DOT
    Graph {
        file: Option<PathBuf>,

        /// Draw root sentinels as well
        #[arg(long)]
        with_roots: bool,

        /// Print the figure description as JSON instead of DOT
        #[arg(long)]
        json: bool,
    },

    /// Re-serialize a pipeline document in normalized form
    Fmt { file: Option<PathBuf> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    plantpipe::log::init_with_debug(cli.debug);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let loader = Loader::new(LoaderConfig::try_from(&config)?);

    match cli.command {
        Command::Check { file } => run_check(&loader, file),
        Command::Order { file, json } => run_order(&loader, file, json),
        Command::Plan { file, task, json } => run_plan(&loader, file, task, json),
        Command::Graph {
            file,
            with_roots,
            json,
        } => run_graph(&loader, file, with_roots, json),
        Command::Fmt { file } => run_fmt(&loader, file),
    }
}

fn load(loader: &Loader, file: Option<PathBuf>) -> Result<PipelineGraph> {
    match file {
        Some(path) => loader.load_file(path),
        None => loader.load_default(),
    }
}

fn task_names(tasks: &[&TaskNode]) -> Vec<String> {
    tasks.iter().map(|t| t.name.clone()).collect()
}

fn run_check(loader: &Loader, file: Option<PathBuf>) -> Result<()> {
    let graph = load(loader, file)?;
    info!(tasks = graph.node_count(), "pipeline document is valid");
    println!(
        "ok: {} task(s), {} dependency edge(s)",
        graph.node_count(),
        graph.edge_count()
    );
    if let Some(target) = graph.default_target() {
        println!("default target: {}", target.name);
    }
    Ok(())
}

fn run_order(loader: &Loader, file: Option<PathBuf>, json: bool) -> Result<()> {
    let graph = load(loader, file)?;
    let order = task_names(&graph.topological_order()?);
    if json {
        println!("{}", serde_json::to_string_pretty(&order)?);
    } else {
        for name in order {
            println!("{}", name);
        }
    }
    Ok(())
}

fn run_plan(loader: &Loader, file: Option<PathBuf>, task: Option<String>, json: bool) -> Result<()> {
    let graph = load(loader, file)?;
    let target = match task {
        Some(task) => task,
        None => match graph.default_target() {
            Some(node) => node.name.clone(),
            None => {
                println!("pipeline has no tasks");
                return Ok(());
            }
        },
    };

    let plan = graph.execution_plan(&target)?;
    info!(target = %target, steps = plan.len(), "execution plan computed");
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        for (step, node) in plan.iter().enumerate() {
            println!("{:>3}. {} ({})", step + 1, node.name, node.kind);
        }
    }
    Ok(())
}

fn run_graph(loader: &Loader, file: Option<PathBuf>, with_roots: bool, json: bool) -> Result<()> {
    let graph = load(loader, file)?;
    let figure = graph.render_dependency_figure()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&figure)?);
    } else {
        print!("{}", figure.to_dot(with_roots));
    }
    Ok(())
}

fn run_fmt(loader: &Loader, file: Option<PathBuf>) -> Result<()> {
    let graph = load(loader, file)?;
    print!("{}", graph.to_toml_string()?);
    Ok(())
}
