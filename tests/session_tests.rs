use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use procman::input::ChannelLines;
use procman::session::{
    MonitoringSession, SampleSink, SessionOptions, SessionOutcome, SessionState,
};
use procman::system::fixture::FixtureSource;
use procman::system::sampler::{SystemSample, UsageSampler};

#[derive(Default)]
struct RecordingSink {
    begun: AtomicUsize,
    renders: AtomicUsize,
    finished: AtomicUsize,
}

impl SampleSink for RecordingSink {
    fn begin(&self) {
        self.begun.fetch_add(1, Ordering::SeqCst);
    }

    fn render(&self, _sample: &SystemSample) {
        self.renders.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tracks how many display loops are live at once. `finish` lingers so a
/// stopped session takes a while to drain.
#[derive(Default)]
struct DrainingSink {
    begun: AtomicUsize,
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl SampleSink for DrainingSink {
    fn begin(&self) {
        self.begun.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn render(&self, _sample: &SystemSample) {}

    fn finish(&self) {
        thread::sleep(Duration::from_millis(300));
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

fn session_with<S: SampleSink + 'static>(
    sink: Arc<S>,
    workers: usize,
) -> (Sender<String>, Arc<MonitoringSession>) {
    let source = Arc::new(FixtureSource::with_processes(4));
    let sampler = Arc::new(UsageSampler::new(source, Duration::from_millis(10)));
    let (tx, lines) = ChannelLines::new();
    let options = SessionOptions {
        workers,
        display_interval: Duration::from_millis(10),
        input_poll: Duration::from_millis(10),
    };
    let session = MonitoringSession::new(sampler, Arc::new(lines), sink, options).unwrap();
    (tx, Arc::new(session))
}

fn session() -> (Sender<String>, Arc<RecordingSink>, Arc<MonitoringSession>) {
    let sink = Arc::new(RecordingSink::default());
    let (tx, session) = session_with(Arc::clone(&sink), 4);
    (tx, sink, session)
}

fn wait_for_state(session: &MonitoringSession, wanted: SessionState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.state() != wanted {
        assert!(Instant::now() < deadline, "session never reached {wanted:?}");
        thread::sleep(Duration::from_millis(2));
    }
}

fn wait_until_running(session: &MonitoringSession) {
    wait_for_state(session, SessionState::Running);
}

#[test]
fn start_blocks_until_a_line_arrives() {
    let (tx, sink, session) = session();
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        tx.send(String::new()).unwrap();
        tx
    });

    let started = Instant::now();
    assert_eq!(session.start().unwrap(), SessionOutcome::Completed);
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.sampler().is_active());

    assert_eq!(sink.begun.load(Ordering::SeqCst), 1);
    assert!(sink.renders.load(Ordering::SeqCst) >= 1);
    assert_eq!(sink.finished.load(Ordering::SeqCst), 1);
    drop(sender.join().unwrap());
}

#[test]
fn second_start_while_running_is_refused() {
    let (tx, sink, session) = session();
    let runner = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.start().unwrap())
    };
    wait_until_running(&session);

    assert_eq!(session.start().unwrap(), SessionOutcome::AlreadyRunning);

    tx.send("stop".to_string()).unwrap();
    assert_eq!(runner.join().unwrap(), SessionOutcome::Completed);
    assert_eq!(sink.begun.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_from_another_thread_ends_session() {
    let (_tx, _sink, session) = session();
    let runner = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.start().unwrap())
    };
    wait_until_running(&session);

    session.stop();
    session.stop();
    assert_eq!(runner.join().unwrap(), SessionOutcome::Completed);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn stop_before_start_is_harmless() {
    let (tx, _sink, session) = session();
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);

    tx.send(String::new()).unwrap();
    assert_eq!(session.start().unwrap(), SessionOutcome::Completed);
}

#[test]
fn closed_input_ends_session() {
    let (tx, _sink, session) = session();
    drop(tx);
    assert_eq!(session.start().unwrap(), SessionOutcome::Completed);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn session_can_run_again_after_stopping() {
    let (tx, sink, session) = session();
    for _ in 0..2 {
        tx.send(String::new()).unwrap();
        assert_eq!(session.start().unwrap(), SessionOutcome::Completed);
    }
    assert_eq!(sink.begun.load(Ordering::SeqCst), 2);
    assert_eq!(sink.finished.load(Ordering::SeqCst), 2);
}

#[test]
fn undersized_pool_still_reaches_the_stop_listener() {
    for workers in [0, 1, 2, 3] {
        let sink = Arc::new(RecordingSink::default());
        let (tx, session) = session_with(sink, workers);
        assert!(session.workers() >= 4, "workers={workers}");

        let runner = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.start().unwrap())
        };
        wait_until_running(&session);
        tx.send(String::new()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while !runner.is_finished() {
            assert!(
                Instant::now() < deadline,
                "session with {workers} workers ignored Enter"
            );
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(runner.join().unwrap(), SessionOutcome::Completed);
    }
}

#[test]
fn restart_waits_for_previous_session_to_drain() {
    let sink = Arc::new(DrainingSink::default());
    let (tx, session) = session_with(Arc::clone(&sink), 4);

    let first = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.start().unwrap())
    };
    wait_until_running(&session);
    tx.send(String::new()).unwrap();
    wait_for_state(&session, SessionState::Stopping);

    // Issued while the first session's display loop is still finishing.
    let second = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.start().unwrap())
    };
    assert_eq!(first.join().unwrap(), SessionOutcome::Completed);

    wait_until_running(&session);
    tx.send(String::new()).unwrap();
    assert_eq!(second.join().unwrap(), SessionOutcome::Completed);

    assert_eq!(sink.begun.load(Ordering::SeqCst), 2);
    assert_eq!(sink.peak.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.sampler().is_active());
}
