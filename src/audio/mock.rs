// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    collections::HashSet,
    fmt,
    io::{self, Write},
    sync::Arc,
    thread::{self, ThreadId},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::debug;

use super::format::AudioFormat;

/// Bytes kept for inspection. Anything past this is counted but discarded.
const DEFAULT_CAPTURE_LIMIT: usize = 1 << 20;

#[derive(Default)]
struct State {
    captured: Vec<u8>,
    total_bytes: usize,
    writes: usize,
    threads: HashSet<ThreadId>,
    last_write: Option<Instant>,
}

/// A mock output line. Doesn't actually play anything, but remembers what it was
/// given. Clones share the same recorded state, so a test can hand one clone to
/// a writer and inspect another.
#[derive(Clone)]
pub struct MockLine {
    name: String,
    state: Arc<Mutex<State>>,
    capture_limit: usize,
    /// Fixed sleep per write.
    delay: Option<Duration>,
    /// Sleeps for the play time of every write, as a real device would.
    pace: Option<AudioFormat>,
    /// Writes start failing once this many have succeeded.
    fail_after: Option<usize>,
}

impl MockLine {
    /// Gets a mock line with the given name.
    pub fn get(name: &str) -> MockLine {
        MockLine {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State::default())),
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            delay: None,
            pace: None,
            fail_after: None,
        }
    }

    /// Sleeps for `delay` on every write.
    pub fn with_delay(mut self, delay: Duration) -> MockLine {
        self.delay = Some(delay);
        self
    }

    /// Blocks each write for as long as the bytes would take to play in `format`.
    pub fn paced(mut self, format: AudioFormat) -> MockLine {
        self.pace = Some(format);
        self
    }

    /// Fails every write after the first `writes` have succeeded.
    pub fn failing_after(mut self, writes: usize) -> MockLine {
        self.fail_after = Some(writes);
        self
    }

    /// Keeps at most `limit` bytes for inspection.
    pub fn with_capture_limit(mut self, limit: usize) -> MockLine {
        self.capture_limit = limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The captured bytes, up to the capture limit.
    pub fn bytes(&self) -> Vec<u8> {
        self.state.lock().captured.clone()
    }

    /// Total bytes written, including those past the capture limit.
    pub fn total_bytes(&self) -> usize {
        self.state.lock().total_bytes
    }

    /// Number of successful write calls.
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    /// Number of distinct threads that have written to the line.
    pub fn writer_threads(&self) -> usize {
        self.state.lock().threads.len()
    }

    /// When the last successful write happened.
    pub fn last_write(&self) -> Option<Instant> {
        self.state.lock().last_write
    }
}

impl Write for MockLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if let Some(fail_after) = self.fail_after {
            if self.state.lock().writes >= fail_after {
                debug!(line = self.name, "Injected write failure");
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("mock line {} is failing", self.name),
                ));
            }
        }

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if let Some(format) = self.pace {
            let frames = buf.len() / format.frame_size().max(1);
            thread::sleep(Duration::from_secs_f64(
                frames as f64 / format.sample_rate() as f64,
            ));
        }

        let mut state = self.state.lock();
        let room = self.capture_limit.saturating_sub(state.captured.len());
        let keep = room.min(buf.len());
        state.captured.extend_from_slice(&buf[..keep]);
        state.total_bytes += buf.len();
        state.writes += 1;
        state.threads.insert(thread::current().id());
        state.last_write = Some(Instant::now());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for MockLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
