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

//! A real-time pump from a PCM byte stream into an output line.

use std::{
    io::{self, Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use parking_lot::Mutex;
use tracing::{debug, info, span, warn, Level};

use super::thread_priority::{
    audio_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};

/// Moves bytes from `source` to `sink` on a dedicated high priority thread.
///
/// The pump reads up to `work_buffer_size` bytes at a time and writes each read
/// fully before reading again, so the sink's blocking write paces the source.
/// It runs until [`stop`](AudioPusher::stop) is called, the source reaches end of
/// stream, or either side fails. Failures are logged and only show up as the
/// pusher becoming inactive.
pub struct AudioPusher<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    source: Arc<Mutex<R>>,
    sink: Arc<Mutex<W>>,
    work_buffer_size: usize,
    active: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl<R, W> AudioPusher<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    /// Creates a stopped pusher.
    ///
    /// # Panics
    ///
    /// Panics if `work_buffer_size` is zero.
    pub fn new(source: R, sink: W, work_buffer_size: usize) -> Self {
        assert!(work_buffer_size > 0, "work buffer size must be non-zero");
        AudioPusher {
            source: Arc::new(Mutex::new(source)),
            sink: Arc::new(Mutex::new(sink)),
            work_buffer_size,
            active: Arc::new(AtomicBool::new(false)),
            join_handle: None,
        }
    }

    /// Starts pumping. Does nothing if the pump is already running.
    ///
    /// Returns an error only if the thread can't be spawned.
    pub fn start(&mut self) -> io::Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // A previous run may have ended on its own; reap it before starting another.
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!("Previous audio pusher thread panicked");
            }
        }

        let source = self.source.clone();
        let sink = self.sink.clone();
        let active = self.active.clone();
        let work_buffer_size = self.work_buffer_size;

        let spawned = thread::Builder::new()
            .name("audio-pusher".to_string())
            .spawn(move || run(source, sink, active, work_buffer_size));

        match spawned {
            Ok(handle) => {
                self.join_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Signals the pump to stop and waits for its thread to exit. Once this returns
    /// the sink receives no further writes. A write that is blocked in the sink
    /// delays this call until it completes.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!("Audio pusher thread panicked");
            }
        }
    }

    /// Returns true while the pump is running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn work_buffer_size(&self) -> usize {
        self.work_buffer_size
    }
}

impl<R, W> Drop for AudioPusher<R, W>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<R: Read, W: Write>(
    source: Arc<Mutex<R>>,
    sink: Arc<Mutex<W>>,
    active: Arc<AtomicBool>,
    work_buffer_size: usize,
) {
    let span = span!(Level::INFO, "audio pusher");
    let _enter = span.enter();

    let mut priority_set = false;
    configure_audio_thread_priority(audio_thread_priority(), rt_audio_enabled(), &mut priority_set);

    let mut buffer = vec![0u8; work_buffer_size];
    let mut total: u64 = 0;
    info!(work_buffer_size, "Audio pusher started");

    while active.load(Ordering::SeqCst) {
        let read = match source.lock().read(&mut buffer) {
            Ok(0) => {
                debug!("Source reached end of stream");
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(err = %e, "Error reading audio source, stopping");
                break;
            }
        };

        if let Err(e) = sink.lock().write_all(&buffer[..read]) {
            warn!(err = %e, "Error writing to audio line, stopping");
            break;
        }
        total += read as u64;
    }

    active.store(false, Ordering::SeqCst);
    info!(bytes = total, "Audio pusher stopped");
}
