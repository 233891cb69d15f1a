use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    Timeout,
    Closed,
}

/// A line-oriented input stream that can be waited on with a timeout, so a
/// reader can give up and re-check its own state between lines.
pub trait LineSource: Send + Sync {
    /// `None` waits until a line arrives or the input closes.
    fn next_line(&self, timeout: Option<Duration>) -> LineEvent;
}

pub struct ChannelLines {
    rx: Mutex<Receiver<String>>,
}

impl ChannelLines {
    pub fn new() -> (Sender<String>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, ChannelLines { rx: Mutex::new(rx) })
    }

    /// Lines from stdin, read by a single background thread. Every consumer
    /// shares that reader, so no blocking read outlives the one who wanted it.
    pub fn stdin() -> io::Result<Self> {
        let (tx, lines) = Self::new();
        thread::Builder::new()
            .name("procman-stdin".to_string())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })?;
        Ok(lines)
    }
}

impl LineSource for ChannelLines {
    fn next_line(&self, timeout: Option<Duration>) -> LineEvent {
        let rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(line) => LineEvent::Line(line),
                Err(RecvTimeoutError::Timeout) => LineEvent::Timeout,
                Err(RecvTimeoutError::Disconnected) => LineEvent::Closed,
            },
            None => match rx.recv() {
                Ok(line) => LineEvent::Line(line),
                Err(_) => LineEvent::Closed,
            },
        }
    }
}
