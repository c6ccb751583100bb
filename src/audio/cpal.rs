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
    error::Error,
    fmt,
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::convert::PcmConverter;
use super::format::{AudioFormat, SampleEncoding};
use crate::config;

/// How long a blocked writer waits before checking the ring again.
const WRITE_BACKOFF: Duration = Duration::from_micros(500);

/// Lock-free single producer, single consumer ring of f32 samples.
/// Samples are stored as their bit patterns so no unsafe access is needed.
struct SampleRing {
    buffer: Box<[AtomicU32]>,
    /// Capacity (power of 2)
    capacity: usize,
    read_pos: AtomicUsize,
    write_pos: AtomicUsize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        SampleRing {
            buffer: (0..capacity).map(|_| AtomicU32::new(0)).collect(),
            capacity,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Samples waiting to be read.
    #[inline]
    fn available(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.capacity - read + write
        }
    }

    /// Room left for writing. One slot stays empty to tell full from empty.
    #[inline]
    fn space(&self) -> usize {
        self.capacity - self.available() - 1
    }

    /// Writes as many samples as fit. Returns the number written.
    fn push(&self, samples: &[f32]) -> usize {
        let to_write = self.space().min(samples.len());
        let mask = self.capacity - 1;
        let write = self.write_pos.load(Ordering::Acquire);
        for (i, sample) in samples[..to_write].iter().enumerate() {
            self.buffer[(write + i) & mask].store(sample.to_bits(), Ordering::Relaxed);
        }
        self.write_pos
            .store((write + to_write) & mask, Ordering::Release);
        to_write
    }

    /// Reads as many samples as are available. Returns the number read.
    fn pop(&self, output: &mut [f32]) -> usize {
        let to_read = self.available().min(output.len());
        let mask = self.capacity - 1;
        let read = self.read_pos.load(Ordering::Acquire);
        for (i, sample) in output[..to_read].iter_mut().enumerate() {
            *sample = f32::from_bits(self.buffer[(read + i) & mask].load(Ordering::Relaxed));
        }
        self.read_pos.store((read + to_read) & mask, Ordering::Release);
        to_read
    }
}

/// f32 callback: read straight into the cpal buffer.
fn create_f32_callback(
    ring: Arc<SampleRing>,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let read = ring.pop(data);
        // Zero-fill any shortfall
        data[read..].fill(0.0);
    }
}

/// Integer callback: read from the ring into scratch space and convert.
fn create_int_callback<T>(
    ring: Arc<SampleRing>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    let mut temp: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        fill_converted(&ring, data, &mut temp);
    }
}

/// Pops samples into `data` via `temp`, converting to `T` and zero-filling any shortfall.
fn fill_converted<T>(ring: &SampleRing, data: &mut [T], temp: &mut Vec<f32>)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    if temp.len() < data.len() {
        temp.resize(data.len(), 0.0);
    }
    let temp = &mut temp[..data.len()];
    let read = ring.pop(temp);
    temp[read..].fill(0.0);

    for (dst, &src) in data.iter_mut().zip(temp.iter()) {
        *dst = T::from_sample(src);
    }
}

/// A cpal output device, as reported by [`list_devices`].
pub struct DeviceInfo {
    name: String,
    host_id: cpal::HostId,
    max_channels: u16,
}

impl DeviceInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_channels(&self) -> u16 {
        self.max_channels
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Lists cpal output devices.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
    Ok(list_cpal_devices()?
        .into_iter()
        .map(|(info, _)| info)
        .collect())
}

fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let output_configs = match device.supported_output_configs() {
                Ok(configs) => configs,
                Err(_) => continue,
            };
            let max_channels = output_configs.map(|c| c.channels()).max().unwrap_or(0);

            if max_channels > 0 {
                devices.push((
                    DeviceInfo {
                        name: device.name()?,
                        host_id,
                        max_channels,
                    },
                    device,
                ));
            }
        }
    }

    devices.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    Ok(devices)
}

/// Finds the named output device, or the host default for "default".
fn find_device(name: &str) -> Result<cpal::Device, Box<dyn Error>> {
    if name == "default" {
        return cpal::default_host()
            .default_output_device()
            .ok_or_else(|| "no default output device".into());
    }

    list_cpal_devices()?
        .into_iter()
        .find(|(info, _)| info.name.trim() == name)
        .map(|(_, device)| device)
        .ok_or_else(|| format!("no device found with name {}", name).into())
}

/// A blocking output line backed by a cpal stream.
///
/// Writes take interleaved PCM bytes in the line's [`AudioFormat`] and block while
/// the line's buffer is full, so a writer is paced by the device. A dedicated
/// thread owns the cpal stream, since streams can't move between threads.
pub struct CpalLine {
    name: String,
    format: AudioFormat,
    converter: PcmConverter,
    ring: Arc<SampleRing>,
    /// Bytes of a partial sample left over from the previous write.
    pending: Vec<u8>,
    scratch: Vec<f32>,
    running: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl CpalLine {
    /// Opens the configured device and starts its output stream.
    pub fn open(config: &config::Audio) -> Result<CpalLine, Box<dyn Error>> {
        let format = config.format()?;
        let latency = config.latency()?;
        let name = config.device().to_string();
        let device = find_device(&name)?;

        // Ring sized by the configured latency.
        let capacity = (format.sample_rate() as f64 * latency.as_secs_f64()) as usize
            * format.channels() as usize;
        let ring = Arc::new(SampleRing::new(capacity.max(1024)));
        let running = Arc::new(AtomicBool::new(true));

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let output_thread = {
            let ring = ring.clone();
            let running = running.clone();
            let name = name.clone();
            thread::Builder::new()
                .name("cpal-output".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "cpal output", device = name);
                    let _enter = span.enter();

                    let stream = match build_stream(&device, &format, ring) {
                        Ok(stream) => stream,
                        Err(e) => {
                            error!(err = %e, "Failed to create cpal stream");
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        error!(err = %e, "Failed to start cpal stream");
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                    info!("cpal output stream started");
                    let _ = ready_tx.send(Ok(()));

                    // Keep the stream alive until the line is dropped.
                    while running.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(100));
                    }
                    info!("cpal output stream stopped");
                })?
        };

        let mut line = CpalLine {
            name,
            format,
            converter: PcmConverter::new(&format),
            ring,
            pending: Vec::new(),
            scratch: Vec::new(),
            running,
            output_thread: Some(output_thread),
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(line),
            Ok(Err(e)) => {
                line.shutdown();
                Err(e.into())
            }
            Err(_) => {
                line.shutdown();
                Err("cpal output thread exited before starting".into())
            }
        }
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

fn build_stream(
    device: &cpal::Device,
    format: &AudioFormat,
    ring: Arc<SampleRing>,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let config = cpal::StreamConfig {
        channels: format.channels(),
        sample_rate: cpal::SampleRate(format.sample_rate()),
        buffer_size: cpal::BufferSize::Default,
    };
    let on_error = |err| error!("cpal output stream error: {}", err);

    match (format.encoding(), format.bits_per_sample()) {
        (SampleEncoding::Signed, 16) => device.build_output_stream(
            &config,
            create_int_callback::<i16>(ring),
            on_error,
            None,
        ),
        (SampleEncoding::Signed, 32) => device.build_output_stream(
            &config,
            create_int_callback::<i32>(ring),
            on_error,
            None,
        ),
        // The line converts everything else to float for the device.
        _ => device.build_output_stream(&config, create_f32_callback(ring), on_error, None),
    }
}

impl Write for CpalLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let sample_size = self.converter.sample_size();
        self.pending.extend_from_slice(buf);
        let whole = self.pending.len() / sample_size * sample_size;
        let samples = whole / sample_size;

        if self.scratch.len() < samples {
            self.scratch.resize(samples, 0.0);
        }
        self.converter
            .decode(&self.pending[..whole], &mut self.scratch[..samples]);
        self.pending.drain(..whole);

        let mut written = 0;
        while written < samples {
            if !self.running.load(Ordering::Relaxed) {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("output line {} is closed", self.name),
                ));
            }
            let n = self.ring.push(&self.scratch[written..samples]);
            if n == 0 {
                thread::sleep(WRITE_BACKOFF);
            }
            written += n;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        while self.ring.available() > 0 && self.running.load(Ordering::Relaxed) {
            thread::sleep(WRITE_BACKOFF);
        }
        Ok(())
    }
}

impl Drop for CpalLine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Display for CpalLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_round_trip_with_wrap() {
        let ring = SampleRing::new(8);
        assert_eq!(ring.space(), 7);

        assert_eq!(ring.push(&[1.0, 2.0, 3.0, 4.0, 5.0]), 5);
        let mut out = [0.0f32; 3];
        assert_eq!(ring.pop(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);

        // Wraps around the end of the storage.
        assert_eq!(ring.push(&[6.0, 7.0, 8.0, 9.0, 10.0]), 5);
        assert_eq!(ring.available(), 7);
        assert_eq!(ring.push(&[11.0]), 0);

        let mut out = [0.0f32; 10];
        assert_eq!(ring.pop(&mut out), 7);
        assert_eq!(&out[..7], &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn test_fill_converted_zero_fills() {
        let ring = SampleRing::new(16);
        ring.push(&[0.5, -0.5]);

        let mut data = [5i16; 4];
        let mut temp = Vec::new();
        fill_converted(&ring, &mut data, &mut temp);

        assert!(data[0] > 0);
        assert!(data[1] < 0);
        assert_eq!(&data[2..], &[0, 0]);
        assert_eq!(ring.available(), 0);
    }
}
