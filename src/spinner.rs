// Terminal activity indicator shown while waiting on a completion backend.
use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Animates on stderr until stopped or dropped.
///
/// When stderr is not a terminal nothing is drawn and no thread is spawned.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Spinner {
    pub fn start() -> Self {
        if !io::stderr().is_terminal() {
            return Self::disabled();
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::spawn(move || {
            let mut stderr = io::stderr();
            let mut frame = 0;
            while flag.load(Ordering::Relaxed) {
                let _ = write!(stderr, "\r{}", FRAMES[frame % FRAMES.len()]);
                let _ = stderr.flush();
                frame += 1;
                thread::sleep(FRAME_INTERVAL);
            }
            let _ = write!(stderr, "\r \r");
            let _ = stderr.flush();
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    pub fn disabled() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::Spinner;

    #[test]
    fn stop_is_idempotent() {
        let mut spinner = Spinner::start();
        spinner.stop();
        spinner.stop();
        assert!(!spinner.is_running());
    }
}
