use std::io::{IsTerminal, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use tracing::info;

use procman::config::{self, Config, load_config, load_config_from_path};
use procman::console::Console;
use procman::display::{TerminalSampleSink, render_table};
use procman::input::ChannelLines;
use procman::logging;
use procman::session::MonitoringSession;
use procman::system::collector::SnapshotCollector;
use procman::system::kill::terminate_process;
use procman::system::platform::default_source;
use procman::system::sampler::UsageSampler;
use procman::system::snapshot::SortKey;

#[derive(Parser)]
#[command(
    name = "procman",
    about = "Console process manager: list, monitor and terminate local processes"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker threads for the monitoring session
    #[arg(long)]
    workers: Option<usize>,

    /// PIDs handled per collection thread
    #[arg(long)]
    batch_size: Option<usize>,

    /// Sampling and display interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print one process table and exit
    List {
        /// Emit JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Sort key: pid, cpu, memory, name
        #[arg(long)]
        sort: Option<String>,
    },
    /// Show live CPU and memory usage until Enter is pressed
    Monitor,
    /// Terminate a process, escalating to SIGKILL after the grace period
    Kill {
        #[arg(allow_negative_numbers = true)]
        pid: i64,
    },
    /// Print the most recent log entries
    Log {
        #[arg(long)]
        lines: Option<usize>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);
    let log_path = logging::init(&config.log)?;
    info!(log = %log_path.display(), "application started");

    let result = match cli.command {
        None => run_console(&config),
        Some(Cmd::List { json, sort }) => run_list(&config, json, sort.as_deref()),
        Some(Cmd::Monitor) => run_monitor(&config),
        Some(Cmd::Kill { pid }) => run_kill(&config, pid),
        Some(Cmd::Log { lines }) => run_log(&config, lines),
    };

    info!("application finished");
    result
}

fn load_config_for_cli(cli: &Cli) -> Config {
    let mut config = match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    };

    if let Some(workers) = cli.workers {
        config.pool.workers = workers;
    }
    if let Some(batch_size) = cli.batch_size {
        config.listing.batch_size = batch_size;
    }
    if let Some(interval) = cli.interval_ms {
        config.monitor.sample_interval_ms = interval;
        config.monitor.display_interval_ms = interval;
    }
    if let Some(ref path) = cli.log_file {
        config.log.file = Some(path.clone());
    }

    config
}

fn use_color(config: &config::GeneralConfig) -> bool {
    match config.color.as_str() {
        "always" => true,
        "never" => false,
        _ => stdout().is_terminal(),
    }
}

fn run_console(config: &Config) -> Result<()> {
    let color = use_color(&config.general);
    let input = Arc::new(ChannelLines::stdin()?);
    let sink = Arc::new(TerminalSampleSink::new(color));
    let mut console = Console::new(config, default_source(), input, sink, stdout(), color)?;
    console.run()?;
    Ok(())
}

fn run_list(config: &Config, json: bool, sort: Option<&str>) -> Result<()> {
    let collector = SnapshotCollector::new(default_source(), config.listing.batch_size);
    // A first pass gives every PID a CPU baseline.
    collector.collect()?;
    thread::sleep(config.monitor.sample_interval());
    let set = collector.collect()?;
    let key = SortKey::from_str_config(sort.unwrap_or(config.general.default_sort.as_str()));
    let rows = set.sorted(key);

    let mut out = stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, &rows)?;
        writeln!(out)?;
    } else {
        let table = render_table(&rows, config.listing.name_width, use_color(&config.general));
        out.write_all(table.as_bytes())?;
    }
    info!(count = rows.len(), sort = key.label(), "listed processes");
    Ok(())
}

fn run_monitor(config: &Config) -> Result<()> {
    let color = use_color(&config.general);
    let sampler = Arc::new(UsageSampler::new(
        default_source(),
        config.monitor.sample_interval(),
    ));
    let session = MonitoringSession::new(
        sampler,
        Arc::new(ChannelLines::stdin()?),
        Arc::new(TerminalSampleSink::new(color)),
        config.session_options(),
    )?;
    session.start()?;
    Ok(())
}

fn run_kill(config: &Config, pid: i64) -> Result<()> {
    let result = terminate_process(pid, config.kill.grace_period());
    if result.is_success() {
        println!("{}", result.message());
        Ok(())
    } else {
        Err(eyre!(result.message()))
    }
}

fn run_log(config: &Config, lines: Option<usize>) -> Result<()> {
    let path = config.log.path();
    let count = lines.unwrap_or(config.log.recent_lines);
    let entries = logging::recent_entries(&path, count)
        .map_err(|err| eyre!("unable to open log file {}: {err}", path.display()))?;
    for entry in entries {
        println!("{entry}");
    }
    Ok(())
}
