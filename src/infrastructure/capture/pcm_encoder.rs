//! Uncompressed PCM encoder
//!
//! Taps a capture stream, resamples to the rate implied by the session
//! bitrate and slices the result into timed chunks:
//! - `audio/wav`: chunk 0 starts with a streaming RIFF header
//! - `audio/l16`: raw little-endian samples
//!
//! Output is always mono 16-bit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use rubato::{FftFixedIn, Resampler};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use super::wav;
use crate::application::ports::{
    AudioStream, Encoder, EncoderError, EncoderEvent, EncoderFactory, EncoderSettings,
    EncoderSink, StreamFrame,
};
use crate::domain::format::FormatId;

/// Rates the bitrate is snapped to
pub const STANDARD_RATES: [u32; 7] = [8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000];

/// Input frames per resampler pass
const RESAMPLE_CHUNK: usize = 1024;

/// Sample rate for a mono 16-bit stream at `bits_per_second`
pub fn target_sample_rate(bits_per_second: u32) -> u32 {
    let wanted = bits_per_second / 16;
    STANDARD_RATES
        .iter()
        .copied()
        .min_by_key(|rate| rate.abs_diff(wanted))
        .unwrap_or(16_000)
}

/// Byte layout of the emitted chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmContainer {
    Wav,
    L16,
}

impl PcmContainer {
    /// Container for `format`, or `None` if this encoder cannot produce it.
    /// Only mono is produced, so any other `channels` value is rejected.
    pub fn for_format(format: &FormatId) -> Option<Self> {
        let container = match format.essence() {
            "audio/wav" | "audio/wave" | "audio/x-wav" => Self::Wav,
            "audio/l16" => Self::L16,
            _ => return None,
        };
        if format.param("channels").is_some_and(|c| c != "1") {
            return None;
        }
        if let Some(rate) = format.param("rate") {
            if !rate.parse::<u32>().is_ok_and(|r| r > 0) {
                return None;
            }
        }
        Some(container)
    }
}

/// Sample-rate conversion that keeps filter state between pushes
pub struct StreamResampler {
    inner: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
    ratio: f64,
    consumed: usize,
    produced: usize,
}

impl StreamResampler {
    pub fn new(from: u32, to: u32) -> Result<Self, EncoderError> {
        let inner = if from == to {
            None
        } else {
            let resampler =
                FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
                    .map_err(|e| EncoderError::Failed(format!("Resampler init failed: {e}")))?;
            Some(resampler)
        };
        Ok(Self {
            inner,
            pending: Vec::new(),
            ratio: to as f64 / from as f64,
            consumed: 0,
            produced: 0,
        })
    }

    /// Feed samples; returns whatever output is ready
    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<i16>, EncoderError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(samples.to_vec());
        };

        self.pending
            .extend(samples.iter().map(|&s| s as f32 / 32768.0));
        let mut output = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let block: Vec<f32> = self.pending.drain(..needed).collect();
            self.consumed += needed;
            let resampled = resampler
                .process(&[block], None)
                .map_err(|e| EncoderError::Failed(format!("Resampling failed: {e}")))?;
            output.extend(resampled[0].iter().map(|&s| to_i16(s)));
        }
        self.produced += output.len();
        Ok(output)
    }

    /// Drain the remainder, padding the final block with silence
    pub fn finish(&mut self) -> Result<Vec<i16>, EncoderError> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let real = self.pending.len();
        let needed = resampler.input_frames_next();
        let mut block = std::mem::take(&mut self.pending);
        block.resize(needed.max(real), 0.0);
        let resampled = resampler
            .process(&[block], None)
            .map_err(|e| EncoderError::Failed(format!("Resampling failed: {e}")))?;

        self.consumed += real;
        let expected = (self.consumed as f64 * self.ratio).ceil() as usize;
        let keep = expected.saturating_sub(self.produced).min(resampled[0].len());
        self.produced += keep;
        Ok(resampled[0][..keep].iter().map(|&s| to_i16(s)).collect())
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

struct Progress {
    started_at: Option<Instant>,
    paused: bool,
    stopped: bool,
    header_sent: bool,
    /// Encoded-rate samples not yet emitted
    pending: Vec<i16>,
    resampler: StreamResampler,
}

struct Inner {
    container: PcmContainer,
    sample_rate: u32,
    sink: EncoderSink,
    progress: Mutex<Progress>,
}

impl Inner {
    fn on_frame(&self, frame: StreamFrame<'_>) {
        match frame {
            StreamFrame::Samples(samples) => {
                let failure = {
                    let mut progress = self.progress.lock();
                    if progress.started_at.is_none() || progress.paused || progress.stopped {
                        return;
                    }
                    match progress.resampler.push(samples) {
                        Ok(out) => {
                            progress.pending.extend(out);
                            None
                        }
                        Err(e) => Some(e.to_string()),
                    }
                };
                if let Some(message) = failure {
                    (self.sink)(EncoderEvent::Error(message));
                }
            }
            StreamFrame::Fault(message) => {
                self.progress.lock().stopped = true;
                (self.sink)(EncoderEvent::Error(message));
            }
        }
    }

    /// Emit buffered audio as one chunk. Periodic flushes are skipped while
    /// paused; the final flush also drains the resampler.
    fn flush(&self, last: bool) -> Result<(), EncoderError> {
        let chunk = {
            let mut progress = self.progress.lock();
            if !last && progress.paused {
                return Ok(());
            }
            if last {
                let tail = progress.resampler.finish()?;
                progress.pending.extend(tail);
            }
            let samples = std::mem::take(&mut progress.pending);
            let needs_header = self.container == PcmContainer::Wav && !progress.header_sent;
            if samples.is_empty() && !(last && needs_header) {
                return Ok(());
            }

            let mut data = Vec::with_capacity(wav::HEADER_LEN + samples.len() * 2);
            if needs_header {
                data.extend_from_slice(&wav::streaming_header(self.sample_rate));
                progress.header_sent = true;
            }
            data.extend(wav::samples_to_le_bytes(&samples));

            let timestamp = progress
                .started_at
                .map(|at| at.elapsed())
                .unwrap_or_default();
            (data, timestamp)
        };

        let (data, timestamp) = chunk;
        trace!(bytes = data.len(), ?timestamp, "emitting chunk");
        (self.sink)(EncoderEvent::Chunk { data, timestamp });
        Ok(())
    }
}

/// Ticker task plus the channel that ends it
struct Ticker {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Encoder producing WAV or L16 chunks from a live stream
pub struct PcmEncoder {
    stream: Arc<dyn AudioStream>,
    inner: Arc<Inner>,
    ticker: Mutex<Option<Ticker>>,
}

impl PcmEncoder {
    pub fn new(
        stream: Arc<dyn AudioStream>,
        settings: &EncoderSettings,
        sink: EncoderSink,
    ) -> Result<Self, EncoderError> {
        let container = PcmContainer::for_format(&settings.format)
            .ok_or_else(|| EncoderError::Unsupported(settings.format.clone()))?;
        let sample_rate = settings
            .format
            .param("rate")
            .and_then(|r| r.parse().ok())
            .unwrap_or_else(|| target_sample_rate(settings.bits_per_second));
        let resampler = StreamResampler::new(stream.sample_rate(), sample_rate)?;

        Ok(Self {
            stream,
            inner: Arc::new(Inner {
                container,
                sample_rate,
                sink,
                progress: Mutex::new(Progress {
                    started_at: None,
                    paused: false,
                    stopped: false,
                    header_sent: false,
                    pending: Vec::new(),
                    resampler,
                }),
            }),
            ticker: Mutex::new(None),
        })
    }

    /// Rate of the emitted samples
    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn container(&self) -> PcmContainer {
        self.inner.container
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[async_trait]
impl Encoder for PcmEncoder {
    fn start(&self, timeslice: Duration) -> Result<(), EncoderError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| EncoderError::Failed("no async runtime available".to_string()))?;
        if !self.stream.is_live() {
            return Err(EncoderError::Failed("capture stream is not live".to_string()));
        }

        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return Err(EncoderError::Failed("encoder already started".to_string()));
        }
        self.inner.progress.lock().started_at = Some(Instant::now());

        let tap_inner = Arc::clone(&self.inner);
        self.stream
            .attach(Arc::new(move |frame: StreamFrame<'_>| tap_inner.on_frame(frame)));

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task = runtime.spawn(async move {
            let mut interval = (!timeslice.is_zero()).then(|| {
                let mut interval =
                    interval_at(tokio::time::Instant::now() + timeslice, timeslice);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            });
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = next_tick(interval.as_mut()) => {
                        if let Err(e) = inner.flush(false) {
                            (inner.sink)(EncoderEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
            }
        });

        *ticker = Some(Ticker {
            stop: stop_tx,
            task,
        });
        debug!(
            container = ?self.inner.container,
            sample_rate = self.inner.sample_rate,
            ?timeslice,
            "pcm encoder started"
        );
        Ok(())
    }

    fn pause(&self) -> Result<(), EncoderError> {
        self.inner.progress.lock().paused = true;
        Ok(())
    }

    fn resume(&self) -> Result<(), EncoderError> {
        self.inner.progress.lock().paused = false;
        Ok(())
    }

    async fn stop(&self) -> Result<(), EncoderError> {
        let Some(ticker) = self.ticker.lock().take() else {
            return Ok(());
        };
        self.stream.detach();
        self.inner.progress.lock().stopped = true;

        let _ = ticker.stop.send(());
        ticker
            .task
            .await
            .map_err(|e| EncoderError::Failed(format!("Encoder task failed: {e}")))?;

        self.inner.flush(true)?;
        debug!("pcm encoder stopped");
        Ok(())
    }
}

/// Builds [`PcmEncoder`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmEncoderFactory;

impl PcmEncoderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl EncoderFactory for PcmEncoderFactory {
    fn create(
        &self,
        stream: Arc<dyn AudioStream>,
        settings: EncoderSettings,
        sink: EncoderSink,
    ) -> Result<Arc<dyn Encoder>, EncoderError> {
        Ok(Arc::new(PcmEncoder::new(stream, &settings, sink)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::StreamTap;

    /// Stream whose frames are pushed by the test
    struct FakeStream {
        rate: u32,
        tap: Mutex<Option<StreamTap>>,
    }

    impl FakeStream {
        fn new(rate: u32) -> Arc<Self> {
            Arc::new(Self {
                rate,
                tap: Mutex::new(None),
            })
        }

        fn feed(&self, samples: &[i16]) {
            let tap = self.tap.lock().clone();
            if let Some(tap) = tap {
                tap(StreamFrame::Samples(samples));
            }
        }
    }

    impl AudioStream for FakeStream {
        fn label(&self) -> &str {
            "fake"
        }
        fn sample_rate(&self) -> u32 {
            self.rate
        }
        fn is_live(&self) -> bool {
            true
        }
        fn attach(&self, tap: StreamTap) {
            *self.tap.lock() = Some(tap);
        }
        fn detach(&self) {
            self.tap.lock().take();
        }
        fn release(&self) {}
    }

    type Collected = Arc<Mutex<Vec<Vec<u8>>>>;

    fn collecting_sink() -> (Collected, EncoderSink) {
        let chunks: Collected = Arc::new(Mutex::new(Vec::new()));
        let target = Arc::clone(&chunks);
        let sink: EncoderSink = Arc::new(move |event| {
            if let EncoderEvent::Chunk { data, .. } = event {
                target.lock().push(data);
            }
        });
        (chunks, sink)
    }

    fn settings(format: &str, bits: u32) -> EncoderSettings {
        EncoderSettings {
            format: FormatId::parse(format).unwrap(),
            bits_per_second: bits,
        }
    }

    #[test]
    fn bitrate_snaps_to_standard_rate() {
        assert_eq!(target_sample_rate(256_000), 16_000);
        assert_eq!(target_sample_rate(128_000), 8_000);
        assert_eq!(target_sample_rate(768_000), 48_000);
        assert_eq!(target_sample_rate(10_000_000), 48_000);
        assert_eq!(target_sample_rate(0), 8_000);
    }

    #[test]
    fn container_for_format() {
        let id = |s: &str| FormatId::parse(s).unwrap();
        assert_eq!(PcmContainer::for_format(&id("audio/wav")), Some(PcmContainer::Wav));
        assert_eq!(PcmContainer::for_format(&id("audio/x-wav")), Some(PcmContainer::Wav));
        assert_eq!(
            PcmContainer::for_format(&id("audio/L16;rate=16000")),
            Some(PcmContainer::L16)
        );
        assert_eq!(PcmContainer::for_format(&id("audio/webm")), None);
        assert_eq!(PcmContainer::for_format(&id("audio/wav;channels=2")), None);
        assert_eq!(PcmContainer::for_format(&id("audio/l16;rate=fast")), None);
    }

    #[test]
    fn factory_rejects_compressed_formats() {
        let (_, sink) = collecting_sink();
        let err = PcmEncoderFactory
            .create(FakeStream::new(16_000), settings("audio/webm", 128_000), sink)
            .err()
            .unwrap();
        assert!(matches!(err, EncoderError::Unsupported(_)));
    }

    #[test]
    fn start_without_runtime_fails() {
        let (_, sink) = collecting_sink();
        let encoder =
            PcmEncoder::new(FakeStream::new(16_000), &settings("audio/wav", 256_000), sink)
                .unwrap();
        assert!(matches!(
            encoder.start(Duration::ZERO),
            Err(EncoderError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn single_chunk_when_timeslice_is_zero() {
        let stream = FakeStream::new(16_000);
        let (chunks, sink) = collecting_sink();
        let encoder = PcmEncoder::new(
            Arc::clone(&stream) as Arc<dyn AudioStream>,
            &settings("audio/wav", 256_000),
            sink,
        )
        .unwrap();
        assert_eq!(encoder.sample_rate(), 16_000);

        encoder.start(Duration::ZERO).unwrap();
        stream.feed(&[1, 2, 3]);
        stream.feed(&[4]);
        encoder.stop().await.unwrap();

        let chunks = chunks.lock();
        assert_eq!(chunks.len(), 1);
        let pcm = wav::parse(&chunks[0]).unwrap();
        assert_eq!(pcm.sample_rate, 16_000);
        assert_eq!(pcm.samples, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn paused_audio_is_dropped() {
        let stream = FakeStream::new(8_000);
        let (chunks, sink) = collecting_sink();
        let encoder = PcmEncoder::new(
            Arc::clone(&stream) as Arc<dyn AudioStream>,
            &settings("audio/l16;rate=8000", 128_000),
            sink,
        )
        .unwrap();

        encoder.start(Duration::ZERO).unwrap();
        stream.feed(&[7, 7]);
        encoder.pause().unwrap();
        stream.feed(&[9, 9, 9]);
        encoder.resume().unwrap();
        stream.feed(&[8]);
        encoder.stop().await.unwrap();

        let chunks = chunks.lock();
        assert_eq!(chunks.len(), 1);
        assert_eq!(wav::le_bytes_to_samples(&chunks[0]), vec![7, 7, 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_chunks_per_timeslice() {
        let stream = FakeStream::new(16_000);
        let (chunks, sink) = collecting_sink();
        let encoder = PcmEncoder::new(
            Arc::clone(&stream) as Arc<dyn AudioStream>,
            &settings("audio/wav", 256_000),
            sink,
        )
        .unwrap();

        encoder.start(Duration::from_millis(100)).unwrap();
        stream.feed(&[1; 10]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        stream.feed(&[2; 10]);
        encoder.stop().await.unwrap();

        let chunks = chunks.lock();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), wav::HEADER_LEN + 20);
        assert_eq!(chunks[1].len(), 20);
    }

    #[tokio::test]
    async fn empty_wav_still_gets_header() {
        let stream = FakeStream::new(16_000);
        let (chunks, sink) = collecting_sink();
        let encoder = PcmEncoder::new(
            Arc::clone(&stream) as Arc<dyn AudioStream>,
            &settings("audio/wav", 256_000),
            sink,
        )
        .unwrap();

        encoder.start(Duration::ZERO).unwrap();
        encoder.stop().await.unwrap();
        encoder.stop().await.unwrap();

        let chunks = chunks.lock();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), wav::HEADER_LEN);
    }

    #[test]
    fn resampler_length_tracks_ratio() {
        let mut resampler = StreamResampler::new(48_000, 16_000).unwrap();
        let input = vec![0i16; 4_800];
        let mut out = Vec::new();
        for block in input.chunks(480) {
            out.extend(resampler.push(block).unwrap());
        }
        out.extend(resampler.finish().unwrap());
        assert!(out.len() <= 1_600);
        assert!(out.len() >= 1_600 - RESAMPLE_CHUNK);
    }

    #[test]
    fn passthrough_when_rates_match() {
        let mut resampler = StreamResampler::new(16_000, 16_000).unwrap();
        assert_eq!(resampler.push(&[1, 2, 3]).unwrap(), vec![1, 2, 3]);
        assert!(resampler.finish().unwrap().is_empty());
    }
}
