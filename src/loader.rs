use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, warn};

pub const DEFAULT_MESSAGE: &str = "Downloading";
const TRAIL: &str = "...";
const TICK: Duration = Duration::from_millis(50);

/// Where the loading overlay is painted. Implementations are moved onto the
/// animator thread.
pub trait Surface: Send {
    fn draw(&mut self, text: &str) -> io::Result<()>;
    fn clear(&mut self) -> io::Result<()>;
    /// Non-blocking check for a user interrupt (Ctrl-C).
    fn interrupted(&mut self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("interrupted")]
    Interrupted,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Report {
    drawn: bool,
    interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct Loader {
    pub delay: Duration,
    pub interval: Duration,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            interval: Duration::from_millis(400),
        }
    }
}

impl Loader {
    pub fn new(delay: Duration, interval: Duration) -> Self {
        Self { delay, interval }
    }

    /// Runs `job` on the calling thread while a background thread animates
    /// the overlay. The animator is stopped and joined before this returns,
    /// also when `job` panics. An interrupt seen while the job ran turns the
    /// result into [`LoadError::Interrupted`].
    pub fn run<T, F>(&self, surface: Box<dyn Surface>, message: &str, job: F) -> Result<T, LoadError>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        let animator = Animator::spawn(surface, message.to_string(), self.delay, self.interval);
        let result = job();
        let report = animator.finish();
        debug!(?report, ok = result.is_ok(), "loader finished");
        if report.interrupted {
            return Err(LoadError::Interrupted);
        }
        result.map_err(LoadError::Failed)
    }
}

struct Animator {
    stop: Sender<()>,
    handle: Option<thread::JoinHandle<Report>>,
}

impl Animator {
    fn spawn(surface: Box<dyn Surface>, message: String, delay: Duration, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let mut surface = surface;
            let mut report = Report::default();
            let mut frame = 0usize;
            let mut next_frame = Instant::now() + delay;
            loop {
                match stop_rx.recv_timeout(TICK) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                if surface.interrupted() {
                    report.interrupted = true;
                }
                let now = Instant::now();
                if now >= next_frame {
                    match surface.draw(&frame_text(&message, frame)) {
                        Ok(()) => report.drawn = true,
                        Err(err) => warn!("loader draw failed: {err}"),
                    }
                    frame += 1;
                    next_frame = now + interval;
                }
            }
            if surface.interrupted() {
                report.interrupted = true;
            }
            if report.drawn {
                if let Err(err) = surface.clear() {
                    warn!("loader clear failed: {err}");
                }
            }
            report
        });
        Self {
            stop: stop_tx,
            handle: Some(handle),
        }
    }

    fn finish(mut self) -> Report {
        self.join()
    }

    fn join(&mut self) -> Report {
        let _ = self.stop.try_send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => Report::default(),
        }
    }
}

impl Drop for Animator {
    fn drop(&mut self) {
        self.join();
    }
}

fn frame_text(message: &str, frame: usize) -> String {
    let dots = frame % (TRAIL.len() + 1);
    format!("{}{:<width$}", message, &TRAIL[..dots], width = TRAIL.len())
}
