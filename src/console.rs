//! The interactive `> ` prompt.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::style::Stylize;
use tracing::{error, info, warn};

use crate::command::{Command, HELP_ENTRIES};
use crate::config::Config;
use crate::display::render_table;
use crate::input::{LineEvent, LineSource};
use crate::logging::recent_entries;
use crate::pool::PoolError;
use crate::session::{MonitoringSession, SampleSink, SessionOutcome};
use crate::system::collector::SnapshotCollector;
use crate::system::kill::terminate_process;
use crate::system::sampler::UsageSampler;
use crate::system::snapshot::SortKey;
use crate::system::source::TelemetrySource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Console<W: Write> {
    collector: SnapshotCollector,
    session: MonitoringSession,
    input: Arc<dyn LineSource>,
    out: W,
    color: bool,
    sort: SortKey,
    name_width: usize,
    grace_period: Duration,
    log_path: PathBuf,
    recent_lines: usize,
}

impl<W: Write> Console<W> {
    pub fn new(
        config: &Config,
        source: Arc<dyn TelemetrySource>,
        input: Arc<dyn LineSource>,
        sink: Arc<dyn SampleSink>,
        out: W,
        color: bool,
    ) -> Result<Self, PoolError> {
        let sampler = Arc::new(UsageSampler::new(
            Arc::clone(&source),
            config.monitor.sample_interval(),
        ));
        let session = MonitoringSession::new(
            sampler,
            Arc::clone(&input),
            sink,
            config.session_options(),
        )?;
        Ok(Console {
            collector: SnapshotCollector::new(source, config.listing.batch_size),
            session,
            input,
            out,
            color,
            sort: SortKey::from_str_config(&config.general.default_sort),
            name_width: config.listing.name_width,
            grace_period: config.kill.grace_period(),
            log_path: config.log.path(),
            recent_lines: config.log.recent_lines,
        })
    }

    pub fn into_writer(self) -> W {
        self.out
    }

    /// Reads commands until `exit` or end of input.
    pub fn run(&mut self) -> io::Result<()> {
        self.banner()?;
        // Seed per-process CPU history so the first `list` has a baseline.
        if let Err(err) = self.collector.collect() {
            warn!(error = %err, "initial process collection failed");
        }
        loop {
            write!(self.out, "> ")?;
            self.out.flush()?;
            let line = match self.input.next_line(None) {
                LineEvent::Line(line) => line,
                LineEvent::Timeout => continue,
                LineEvent::Closed => {
                    writeln!(self.out)?;
                    break;
                }
            };
            if self.handle_line(&line)? == Flow::Exit {
                break;
            }
        }
        info!("console closed");
        Ok(())
    }

    fn banner(&mut self) -> io::Result<()> {
        let title = "Process Manager";
        if self.color {
            writeln!(self.out, "{}", title.cyan().bold())?;
        } else {
            writeln!(self.out, "{title}")?;
        }
        writeln!(self.out, "{}", "=".repeat(title.len()))?;
        writeln!(self.out, "Type 'help' for a list of commands.")
    }

    pub fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(Flow::Continue),
            Err(err) => {
                warn!(input = line.trim(), "rejected command: {err}");
                writeln!(self.out, "{err}")?;
                writeln!(self.out, "Type 'help' for a list of commands.")?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            Command::List => self.list()?,
            Command::Monitor => self.monitor()?,
            Command::Kill(pid) => self.kill(pid)?,
            Command::Log => self.log()?,
            Command::Help => self.help()?,
            Command::Exit => {
                writeln!(self.out, "Exiting...")?;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn list(&mut self) -> io::Result<()> {
        info!("listing processes");
        match self.collector.collect() {
            Ok(set) => {
                let rows = set.sorted(self.sort);
                let table = render_table(&rows, self.name_width, self.color);
                self.out.write_all(table.as_bytes())
            }
            Err(err) => {
                error!(error = %err, "process listing failed");
                writeln!(self.out, "Unable to list processes: {err}")
            }
        }
    }

    fn monitor(&mut self) -> io::Result<()> {
        match self.session.start() {
            Ok(SessionOutcome::Completed) => Ok(()),
            Ok(SessionOutcome::AlreadyRunning) => {
                writeln!(self.out, "Monitoring is already running.")
            }
            Err(err) => {
                error!(error = %err, "monitoring failed");
                writeln!(self.out, "Monitoring failed: {err}")
            }
        }
    }

    fn kill(&mut self, pid: i64) -> io::Result<()> {
        let result = terminate_process(pid, self.grace_period);
        writeln!(self.out, "{}", result.message())
    }

    fn log(&mut self) -> io::Result<()> {
        match recent_entries(&self.log_path, self.recent_lines) {
            Ok(lines) => {
                writeln!(self.out, "Recent log entries:")?;
                for line in lines {
                    writeln!(self.out, "{line}")?;
                }
                Ok(())
            }
            Err(err) => {
                warn!(path = %self.log_path.display(), error = %err, "log file unreadable");
                writeln!(self.out, "Unable to open log file.")
            }
        }
    }

    fn help(&mut self) -> io::Result<()> {
        writeln!(self.out, "Available commands:")?;
        for (usage, description) in HELP_ENTRIES {
            writeln!(self.out, "  {usage:<12}{description}")?;
        }
        Ok(())
    }
}
