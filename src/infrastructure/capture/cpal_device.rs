//! Microphone access through cpal
//!
//! `cpal::Stream` is not `Send`, so each acquired stream lives on its own
//! capture thread. The thread owns the stream until the handle is
//! released, then drops it, which closes the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, StreamConfig};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::application::ports::{AudioStream, DeviceError, DeviceProvider, StreamFrame, StreamTap};

/// How often the capture thread checks whether it was released
const RELEASE_POLL: Duration = Duration::from_millis(20);

type TapSlot = Arc<Mutex<Option<StreamTap>>>;

/// Opened device: the cpal stream plus what the handle reports
type Opened = (cpal::Stream, String, u32);

/// Default input device of the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevices;

impl CpalDevices {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeviceProvider for CpalDevices {
    async fn acquire(&self) -> Result<Arc<dyn AudioStream>, DeviceError> {
        let live = Arc::new(AtomicBool::new(true));
        let tap: TapSlot = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_live = Arc::clone(&live);
        let thread_tap = Arc::clone(&tap);
        thread::Builder::new()
            .name("smart-recorder-capture".to_string())
            .spawn(move || run_capture(thread_live, thread_tap, ready_tx))
            .map_err(|e| DeviceError::Other(format!("Failed to spawn capture thread: {e}")))?;

        let (label, sample_rate) = ready_rx
            .await
            .map_err(|_| DeviceError::Other("Capture thread exited early".to_string()))??;

        debug!(device = %label, sample_rate, "capture device opened");
        Ok(Arc::new(CpalStream {
            label,
            sample_rate,
            live,
            tap,
        }))
    }
}

/// Handle to a stream owned by a capture thread
pub struct CpalStream {
    label: String,
    sample_rate: u32,
    live: Arc<AtomicBool>,
    tap: TapSlot,
}

impl AudioStream for CpalStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn attach(&self, tap: StreamTap) {
        *self.tap.lock() = Some(tap);
    }

    fn detach(&self) {
        self.tap.lock().take();
    }

    fn release(&self) {
        self.tap.lock().take();
        if self.live.swap(false, Ordering::SeqCst) {
            debug!(device = %self.label, "capture device released");
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_capture(
    live: Arc<AtomicBool>,
    tap: TapSlot,
    ready: oneshot::Sender<Result<(String, u32), DeviceError>>,
) {
    let (stream, label, sample_rate) = match open_stream(&live, &tap) {
        Ok(opened) => opened,
        Err(e) => {
            live.store(false, Ordering::SeqCst);
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok((label, sample_rate))).is_err() {
        // Nobody is waiting for the stream any more
        live.store(false, Ordering::SeqCst);
        return;
    }

    while live.load(Ordering::SeqCst) {
        thread::sleep(RELEASE_POLL);
    }
    drop(stream);
}

fn open_stream(live: &Arc<AtomicBool>, tap: &TapSlot) -> Result<Opened, DeviceError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(DeviceError::NotFound)?;
    let label = device
        .name()
        .unwrap_or_else(|_| "default input".to_string());

    let supported = device
        .default_input_config()
        .map_err(|e| DeviceError::Other(format!("No usable input configuration: {e}")))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let channels = config.channels;
    let sample_rate = config.sample_rate.0;

    let stream = match sample_format {
        SampleFormat::I16 => {
            let data_tap = Arc::clone(tap);
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mono = mix_to_mono(data, channels);
                    deliver(&data_tap, StreamFrame::Samples(&mono));
                },
                fault_handler(live, tap),
                None,
            )
        }
        SampleFormat::F32 => {
            let data_tap = Arc::clone(tap);
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data.iter().copied().map(f32_to_i16).collect();
                    let mono = mix_to_mono(&converted, channels);
                    deliver(&data_tap, StreamFrame::Samples(&mono));
                },
                fault_handler(live, tap),
                None,
            )
        }
        other => {
            return Err(DeviceError::Other(format!(
                "Unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|e| DeviceError::Other(format!("Failed to start input stream: {e}")))?;

    Ok((stream, label, sample_rate))
}

fn fault_handler(
    live: &Arc<AtomicBool>,
    tap: &TapSlot,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    let live = Arc::clone(live);
    let tap = Arc::clone(tap);
    move |err| {
        warn!(error = %err, "input stream error");
        live.store(false, Ordering::SeqCst);
        deliver(&tap, StreamFrame::Fault(err.to_string()));
    }
}

/// Hand a frame to the attached tap, if any. The slot lock is released
/// before the tap runs.
fn deliver(tap: &TapSlot, frame: StreamFrame<'_>) {
    let current = tap.lock().clone();
    if let Some(tap) = current {
        tap(frame);
    }
}

fn map_build_error(err: BuildStreamError) -> DeviceError {
    match err {
        BuildStreamError::DeviceNotAvailable => DeviceError::NotFound,
        other => DeviceError::Other(format!("Failed to open input stream: {other}")),
    }
}

/// Average interleaved frames down to one channel
fn mix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / frame.len() as i32) as i16
        })
        .collect()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
