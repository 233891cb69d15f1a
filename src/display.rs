use std::fmt::Write as _;
use std::io::{self, Write};

use crossterm::cursor::{RestorePosition, SavePosition};
use crossterm::queue;
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{Clear, ClearType};

use crate::format::{format_percent, truncate_unicode};
use crate::session::SampleSink;
use crate::system::sampler::SystemSample;
use crate::system::snapshot::ProcessSnapshot;

pub const DEFAULT_NAME_WIDTH: usize = 30;
const PID_WIDTH: usize = 8;
const PERCENT_WIDTH: usize = 10;
const SEPARATOR_WIDTH: usize = 40;

pub fn usage_color(percent: f64) -> Color {
    if percent > 50.0 {
        Color::Red
    } else if percent > 20.0 {
        Color::Yellow
    } else {
        Color::Green
    }
}

fn percent_cell(percent: f64, color: bool) -> String {
    let cell = format!("{:<PERCENT_WIDTH$}", format_percent(percent));
    if color {
        cell.with(usage_color(percent)).to_string()
    } else {
        cell
    }
}

pub fn render_table(rows: &[ProcessSnapshot], name_width: usize, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<PID_WIDTH$}{:<PERCENT_WIDTH$}{:<PERCENT_WIDTH$}Name",
        "PID", "CPU%", "Memory%"
    );
    let _ = writeln!(out, "{}", "-".repeat(SEPARATOR_WIDTH));
    for row in rows {
        let _ = writeln!(
            out,
            "{:<PID_WIDTH$}{}{}{}",
            row.pid,
            percent_cell(row.cpu_percent, color),
            percent_cell(row.memory_percent, color),
            truncate_unicode(&row.name, name_width)
        );
    }
    out
}

pub fn render_sample(sample: &SystemSample, color: bool) -> String {
    let cpu = format!("{}%", format_percent(sample.cpu_percent));
    let memory = format!("{}%", format_percent(sample.memory_percent));
    let mut out = String::new();
    if color {
        let _ = writeln!(out, "{}", "Resource Monitoring".green().bold());
        let _ = writeln!(out, "--------------------");
        let _ = writeln!(out, "CPU Usage:    {}", cpu.bold());
        let _ = writeln!(out, "Memory Usage: {}", memory.bold());
    } else {
        let _ = writeln!(out, "Resource Monitoring");
        let _ = writeln!(out, "--------------------");
        let _ = writeln!(out, "CPU Usage:    {cpu}");
        let _ = writeln!(out, "Memory Usage: {memory}");
    }
    out
}

/// Redraws the monitoring panel in place on stdout.
pub struct TerminalSampleSink {
    color: bool,
}

impl TerminalSampleSink {
    pub fn new(color: bool) -> Self {
        TerminalSampleSink { color }
    }

    fn draw(&self, sample: &SystemSample) -> io::Result<()> {
        let mut out = io::stdout().lock();
        queue!(out, RestorePosition, Clear(ClearType::FromCursorDown))?;
        out.write_all(render_sample(sample, self.color).as_bytes())?;
        out.flush()
    }
}

impl SampleSink for TerminalSampleSink {
    fn begin(&self) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "Press Enter to stop the monitor.");
        let _ = queue!(out, SavePosition);
        let _ = out.flush();
    }

    fn render(&self, sample: &SystemSample) {
        // Losing a frame to a closed stdout is not worth ending the session.
        let _ = self.draw(sample);
    }

    fn finish(&self) {
        let _ = writeln!(io::stdout());
    }
}
