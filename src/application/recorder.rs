//! Capture session
//!
//! [`Recorder`] owns the device stream and the encoder while active and
//! sequences start/pause/resume/stop against them. Encoder notifications
//! are relayed through the session's [`EventHub`]; every chunk is also
//! appended to the session buffer, which `stop()` assembles into the
//! final [`Artifact`].
//!
//! The session lock is never held while a collaborator or a listener
//! runs. Collaborator calls that can suspend are tagged with the cycle's
//! generation, so a `dispose()` or device failure that lands in the middle
//! wins and the late resolution only cleans up after itself.
//!
//! Events from the encoder and from failures are published in the order
//! their decisions were taken: an `error` never overtakes a `data` chunk
//! that was already buffered.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info, warn};

use super::events::{EventHub, EventKind, Handler, RecorderEvent, Subscription};
use super::negotiate::negotiate;
use super::ports::{
    AudioStream, DeviceProvider, Encoder, EncoderError, EncoderEvent, EncoderFactory,
    EncoderSettings, EncoderSink, FormatSupport,
};
use crate::domain::config::RecorderConfig;
use crate::domain::error::RecorderError;
use crate::domain::format::FormatId;
use crate::domain::recording::{Artifact, ChunkBuffer, Lifecycle, RecorderState};

/// Resources held between a committed start and the end of the cycle
struct Capture {
    stream: Arc<dyn AudioStream>,
    /// Taken by `stop()` while it awaits the final flush
    encoder: Option<Arc<dyn Encoder>>,
    format: FormatId,
}

#[derive(Default)]
struct Session {
    lifecycle: Lifecycle,
    capture: Option<Capture>,
    chunks: ChunkBuffer,
}

impl Session {
    /// Reset to idle and hand back whatever was held
    fn teardown(&mut self) -> Option<Capture> {
        if !self.lifecycle.reset() {
            return None;
        }
        self.chunks.clear();
        self.capture.take()
    }
}

struct Shared {
    hub: EventHub,
    session: Mutex<Session>,
    /// Held from a `data`/`error`/`stop` decision through its publish, so
    /// a failure on another thread cannot overtake a chunk that was
    /// already buffered. Reentrant for listeners that call back in.
    emit: ReentrantMutex<()>,
}

impl Shared {
    fn sink(self: &Arc<Self>, generation: u64) -> EncoderSink {
        let shared: Weak<Shared> = Arc::downgrade(self);
        Arc::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                shared.on_encoder_event(generation, event);
            }
        })
    }

    fn on_encoder_event(&self, generation: u64, event: EncoderEvent) {
        match event {
            EncoderEvent::Chunk { data, timestamp } => {
                let _order = self.emit.lock();
                let chunk = {
                    let mut session = self.session.lock();
                    if !session.lifecycle.is_current(generation) {
                        debug!(generation, bytes = data.len(), "dropping chunk from stale encoder");
                        return;
                    }
                    session.chunks.push(data, timestamp)
                };
                self.hub.publish(&RecorderEvent::Data(chunk));
            }
            EncoderEvent::Error(message) => {
                self.fail(generation, RecorderError::DeviceFailure(message));
            }
        }
    }

    /// Force the session inactive after a device failure, release the
    /// device and publish `error`. Returns false if `generation` no longer
    /// owns the session.
    fn fail(&self, generation: u64, err: RecorderError) -> bool {
        let _order = self.emit.lock();
        let capture = {
            let mut session = self.session.lock();
            if !session.lifecycle.is_current(generation) {
                return false;
            }
            session.teardown()
        };
        error!(generation, error = %err, "capture session failed");
        if let Some(capture) = capture {
            capture.stream.release();
        }
        self.hub.publish(&RecorderEvent::Error(err));
        true
    }

    /// Return a failed start to idle. Publishes nothing.
    fn abandon_start(&self, generation: u64, stream: &Arc<dyn AudioStream>) {
        stream.release();
        self.session.lock().lifecycle.abort_start(generation);
    }
}

/// An audio capture session.
///
/// ```text
/// inactive --start--> recording --pause--> paused --resume--> recording
///     ^                   |                   |
///     +-------stop--------+-------stop--------+
/// ```
///
/// `start`, `stop` and `dispose` suspend; `pause` and `resume` return
/// immediately. Calls that conflict with a pending start/stop are
/// rejected, never interleaved.
pub struct Recorder {
    config: RecorderConfig,
    devices: Arc<dyn DeviceProvider>,
    encoders: Arc<dyn EncoderFactory>,
    formats: Arc<dyn FormatSupport>,
    shared: Arc<Shared>,
}

impl Recorder {
    /// Start building a session with `config`
    pub fn builder(config: RecorderConfig) -> RecorderBuilder {
        RecorderBuilder::new(config)
    }

    /// Session configuration, frozen at construction
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RecorderState {
        self.shared.session.lock().lifecycle.state()
    }

    /// The device stream, while one is held
    pub fn stream(&self) -> Option<Arc<dyn AudioStream>> {
        self.shared
            .session
            .lock()
            .capture
            .as_ref()
            .map(|capture| Arc::clone(&capture.stream))
    }

    /// Format negotiated by the current recording
    pub fn mime_type(&self) -> Option<FormatId> {
        self.shared
            .session
            .lock()
            .capture
            .as_ref()
            .map(|capture| capture.format.clone())
    }

    /// Register a listener for `kind`
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        self.shared.hub.subscribe(kind, handler)
    }

    /// Acquire the device, negotiate a format and begin recording.
    ///
    /// Valid only while inactive. On any failure the device is released
    /// and the session stays inactive.
    pub async fn start(&self) -> Result<(), RecorderError> {
        let generation = self.shared.session.lock().lifecycle.begin_start()?;
        debug!(generation, "requesting capture device");

        let stream = match self.devices.acquire().await {
            Ok(stream) => stream,
            Err(e) => {
                self.shared.session.lock().lifecycle.abort_start(generation);
                warn!(generation, error = %e, "capture device unavailable");
                return Err(RecorderError::DeviceUnavailable(e.to_string()));
            }
        };

        if !self.shared.session.lock().lifecycle.is_current(generation) {
            debug!(generation, "disposed while awaiting device");
            stream.release();
            return Err(RecorderError::Aborted);
        }

        let format = match negotiate(
            self.formats.as_ref(),
            &self.config.mime_type,
            &self.config.fallbacks,
        ) {
            Ok(format) => format,
            Err(e) => {
                self.shared.abandon_start(generation, &stream);
                return Err(e);
            }
        };

        let settings = EncoderSettings {
            format: format.clone(),
            bits_per_second: self.config.audio_bits_per_second,
        };
        let encoder = match self.encoders.create(
            Arc::clone(&stream),
            settings,
            self.shared.sink(generation),
        ) {
            Ok(encoder) => encoder,
            Err(e) => {
                self.shared.abandon_start(generation, &stream);
                return Err(match e {
                    EncoderError::Unsupported(_) => RecorderError::UnsupportedFormat {
                        preferred: self.config.mime_type.clone(),
                        fallbacks: self.config.fallbacks.clone(),
                    },
                    EncoderError::Failed(message) => RecorderError::DeviceFailure(message),
                });
            }
        };

        {
            let mut session = self.shared.session.lock();
            if let Err(e) = session.lifecycle.commit_start(generation) {
                drop(session);
                stream.release();
                return Err(e);
            }
            session.chunks.clear();
            session.capture = Some(Capture {
                stream: Arc::clone(&stream),
                encoder: Some(Arc::clone(&encoder)),
                format: format.clone(),
            });
        }

        info!(generation, format = %format, device = stream.label(), "recording started");
        self.shared.hub.publish(&RecorderEvent::Start { format });

        if let Err(e) = encoder.start(self.config.timeslice()) {
            let err = RecorderError::DeviceFailure(e.to_string());
            self.shared.fail(generation, err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Recording -> paused. The buffer and the device are retained.
    pub fn pause(&self) -> Result<(), RecorderError> {
        let (generation, encoder) = {
            let mut session = self.shared.session.lock();
            session.lifecycle.pause()?;
            (session.lifecycle.generation(), current_encoder(&session))
        };

        if let Some(encoder) = encoder {
            if let Err(e) = encoder.pause() {
                let err = RecorderError::DeviceFailure(e.to_string());
                self.shared.fail(generation, err.clone());
                return Err(err);
            }
        }

        debug!(generation, "recording paused");
        self.shared.hub.publish(&RecorderEvent::Pause);
        Ok(())
    }

    /// Paused -> recording
    pub fn resume(&self) -> Result<(), RecorderError> {
        let (generation, encoder) = {
            let mut session = self.shared.session.lock();
            session.lifecycle.resume()?;
            (session.lifecycle.generation(), current_encoder(&session))
        };

        if let Some(encoder) = encoder {
            if let Err(e) = encoder.resume() {
                let err = RecorderError::DeviceFailure(e.to_string());
                self.shared.fail(generation, err.clone());
                return Err(err);
            }
        }

        debug!(generation, "recording resumed");
        self.shared.hub.publish(&RecorderEvent::Resume);
        Ok(())
    }

    /// Flush the encoder, assemble the artifact and release the device.
    ///
    /// Valid while recording or paused. Every `data` event of this cycle
    /// is published before the `stop` event.
    pub async fn stop(&self) -> Result<Artifact, RecorderError> {
        let (generation, encoder) = {
            let mut session = self.shared.session.lock();
            let generation = session.lifecycle.begin_stop()?;
            let encoder = session
                .capture
                .as_mut()
                .and_then(|capture| capture.encoder.take());
            (generation, encoder)
        };
        debug!(generation, "stopping recording");

        if let Some(encoder) = encoder {
            if let Err(e) = encoder.stop().await {
                let err = RecorderError::DeviceFailure(e.to_string());
                return Err(if self.shared.fail(generation, err.clone()) {
                    err
                } else {
                    RecorderError::Aborted
                });
            }
        }

        let _order = self.shared.emit.lock();
        let (capture, chunks) = {
            let mut session = self.shared.session.lock();
            session.lifecycle.finish_stop(generation)?;
            let chunks = std::mem::take(&mut session.chunks);
            (session.capture.take(), chunks)
        };
        let capture = capture.ok_or(RecorderError::Aborted)?;
        capture.stream.release();

        let artifact = chunks.into_artifact(capture.format);
        info!(
            generation,
            format = %artifact.format(),
            size = artifact.size_bytes(),
            "recording stopped"
        );
        self.shared.hub.publish(&RecorderEvent::Stop {
            artifact: artifact.clone(),
        });
        Ok(artifact)
    }

    /// Tear the session down from any state, discarding buffered audio.
    ///
    /// Idempotent. A pending `start()` resolves with
    /// [`RecorderError::Aborted`] and releases whatever it acquired; a
    /// pending `stop()` does the same. Publishes no events.
    pub async fn dispose(&self) {
        let capture = self.shared.session.lock().teardown();
        let Some(capture) = capture else {
            return;
        };
        debug!("disposing capture session");

        if let Some(encoder) = capture.encoder {
            if let Err(e) = encoder.stop().await {
                debug!(error = %e, "encoder flush failed during dispose");
            }
        }
        capture.stream.release();
    }
}

fn current_encoder(session: &Session) -> Option<Arc<dyn Encoder>> {
    session
        .capture
        .as_ref()
        .and_then(|capture| capture.encoder.clone())
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Some(capture) = self.shared.session.lock().teardown() {
            capture.stream.release();
        }
    }
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("events", &self.shared.hub)
            .finish()
    }
}

/// Builder for [`Recorder`]
pub struct RecorderBuilder {
    config: RecorderConfig,
    devices: Option<Arc<dyn DeviceProvider>>,
    encoders: Option<Arc<dyn EncoderFactory>>,
    formats: Option<Arc<dyn FormatSupport>>,
    handlers: Vec<(EventKind, Handler)>,
}

impl RecorderBuilder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            devices: None,
            encoders: None,
            formats: None,
            handlers: Vec::new(),
        }
    }

    pub fn devices(mut self, devices: Arc<dyn DeviceProvider>) -> Self {
        self.devices = Some(devices);
        self
    }

    pub fn encoders(mut self, encoders: Arc<dyn EncoderFactory>) -> Self {
        self.encoders = Some(encoders);
        self
    }

    pub fn formats(mut self, formats: Arc<dyn FormatSupport>) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Register a listener at construction. Equivalent to calling
    /// [`Recorder::subscribe`] right after `build()`.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        self.handlers.push((kind, Arc::new(handler)));
        self
    }

    /// Finish the session. Fails if a collaborator was not provided.
    pub fn build(self) -> Result<Recorder, MissingCollaborator> {
        let devices = self.devices.ok_or(MissingCollaborator("device provider"))?;
        let encoders = self.encoders.ok_or(MissingCollaborator("encoder factory"))?;
        let formats = self.formats.ok_or(MissingCollaborator("format support query"))?;

        let hub = EventHub::new();
        for (kind, handler) in self.handlers {
            hub.subscribe_arc(kind, handler);
        }

        Ok(Recorder {
            config: self.config,
            devices,
            encoders,
            formats,
            shared: Arc::new(Shared {
                hub,
                session: Mutex::new(Session::default()),
                emit: ReentrantMutex::new(()),
            }),
        })
    }
}

/// A [`RecorderBuilder`] was finished without a required collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Recorder is missing a {0}")]
pub struct MissingCollaborator(pub &'static str);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{DeviceError, StreamTap};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct MockStream {
        released: AtomicUsize,
    }

    impl MockStream {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                released: AtomicUsize::new(0),
            })
        }

        fn releases(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    impl AudioStream for MockStream {
        fn label(&self) -> &str {
            "mock"
        }
        fn sample_rate(&self) -> u32 {
            16_000
        }
        fn is_live(&self) -> bool {
            self.releases() == 0
        }
        fn attach(&self, _tap: StreamTap) {}
        fn detach(&self) {}
        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    enum Grant {
        Allow,
        Deny,
        /// Wait for the gate before granting
        Gated(Arc<Notify>),
    }

    struct MockDevices {
        stream: Arc<MockStream>,
        grant: Grant,
    }

    #[async_trait]
    impl DeviceProvider for MockDevices {
        async fn acquire(&self) -> Result<Arc<dyn AudioStream>, DeviceError> {
            match &self.grant {
                Grant::Allow => {}
                Grant::Deny => return Err(DeviceError::PermissionDenied),
                Grant::Gated(gate) => gate.notified().await,
            }
            Ok(Arc::clone(&self.stream) as Arc<dyn AudioStream>)
        }
    }

    /// Encoder that emits whatever the test queued, on stop
    #[derive(Default)]
    struct MockEncoder {
        sink: Mutex<Option<EncoderSink>>,
        queued: Mutex<Vec<Vec<u8>>>,
        paused: AtomicBool,
        fail_start: bool,
        /// Hold the final flush until notified
        stop_gate: Option<Arc<Notify>>,
    }

    impl MockEncoder {
        fn emit(&self, data: Vec<u8>, millis: u64) {
            let sink = self.sink.lock().clone();
            if let Some(sink) = sink {
                sink(EncoderEvent::Chunk {
                    data,
                    timestamp: Duration::from_millis(millis),
                });
            }
        }

        fn fault(&self, message: &str) {
            let sink = self.sink.lock().clone();
            if let Some(sink) = sink {
                sink(EncoderEvent::Error(message.to_string()));
            }
        }
    }

    #[async_trait]
    impl Encoder for MockEncoder {
        fn start(&self, _timeslice: Duration) -> Result<(), EncoderError> {
            if self.fail_start {
                return Err(EncoderError::Failed("no input".into()));
            }
            Ok(())
        }
        fn pause(&self) -> Result<(), EncoderError> {
            self.paused.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn resume(&self) -> Result<(), EncoderError> {
            self.paused.store(false, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) -> Result<(), EncoderError> {
            if let Some(gate) = &self.stop_gate {
                gate.notified().await;
            }
            let queued = std::mem::take(&mut *self.queued.lock());
            for data in queued {
                self.emit(data, 999);
            }
            Ok(())
        }
    }

    struct MockEncoders {
        encoder: Arc<MockEncoder>,
    }

    impl EncoderFactory for MockEncoders {
        fn create(
            &self,
            _stream: Arc<dyn AudioStream>,
            _settings: EncoderSettings,
            sink: EncoderSink,
        ) -> Result<Arc<dyn Encoder>, EncoderError> {
            *self.encoder.sink.lock() = Some(sink);
            Ok(Arc::clone(&self.encoder) as Arc<dyn Encoder>)
        }
    }

    struct Fixture {
        recorder: Recorder,
        stream: Arc<MockStream>,
        encoder: Arc<MockEncoder>,
        events: Arc<Mutex<Vec<EventKind>>>,
    }

    fn wav() -> FormatId {
        FormatId::parse("audio/wav").unwrap()
    }

    fn fixture_with(grant: Grant, encoder: MockEncoder) -> Fixture {
        fixture_with_listener(grant, encoder, None)
    }

    /// `first` is registered ahead of the event log
    fn fixture_with_listener(
        grant: Grant,
        encoder: MockEncoder,
        first: Option<(EventKind, Handler)>,
    ) -> Fixture {
        let stream = MockStream::new();
        let encoder = Arc::new(encoder);
        let events = Arc::new(Mutex::new(Vec::new()));

        let mut builder = Recorder::builder(
            RecorderConfig::new(FormatId::parse("audio/webm").unwrap()).with_fallbacks([wav()]),
        )
        .devices(Arc::new(MockDevices {
            stream: Arc::clone(&stream),
            grant,
        }))
        .encoders(Arc::new(MockEncoders {
            encoder: Arc::clone(&encoder),
        }))
        .formats(Arc::new(|f: &FormatId| f.essence() == "audio/wav"));

        if let Some((kind, handler)) = first {
            builder = builder.on(kind, move |event| handler(event));
        }
        for kind in EventKind::ALL {
            let log = Arc::clone(&events);
            builder = builder.on(kind, move |event| log.lock().push(event.kind()));
        }

        Fixture {
            recorder: builder.build().unwrap(),
            stream,
            encoder,
            events,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Grant::Allow, MockEncoder::default())
    }

    fn gated_stop() -> (Arc<Notify>, Fixture) {
        let gate = Arc::new(Notify::new());
        let encoder = MockEncoder {
            stop_gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        (gate, fixture_with(Grant::Allow, encoder))
    }

    #[test]
    fn build_requires_collaborators() {
        let err = Recorder::builder(RecorderConfig::default()).build().unwrap_err();
        assert_eq!(err, MissingCollaborator("device provider"));
    }

    #[tokio::test]
    async fn start_negotiates_and_records() {
        let fx = fixture();
        fx.recorder.start().await.unwrap();

        assert_eq!(fx.recorder.state(), RecorderState::Recording);
        assert_eq!(fx.recorder.mime_type(), Some(wav()));
        assert!(fx.recorder.stream().is_some());
        assert_eq!(*fx.events.lock(), vec![EventKind::Start]);
    }

    #[tokio::test]
    async fn full_cycle_releases_device() {
        let fx = fixture();
        fx.recorder.start().await.unwrap();
        fx.recorder.pause().unwrap();
        fx.recorder.resume().unwrap();
        fx.recorder.pause().unwrap();
        fx.recorder.resume().unwrap();
        fx.recorder.stop().await.unwrap();

        assert_eq!(fx.recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        assert!(fx.recorder.stream().is_none());
        assert!(fx.recorder.mime_type().is_none());
        assert_eq!(
            *fx.events.lock(),
            vec![
                EventKind::Start,
                EventKind::Pause,
                EventKind::Resume,
                EventKind::Pause,
                EventKind::Resume,
                EventKind::Stop,
            ]
        );
    }

    #[tokio::test]
    async fn invalid_calls_fail_without_changing_state() {
        let fx = fixture();
        assert_eq!(fx.recorder.pause(), Err(RecorderError::NotRecording));
        assert_eq!(fx.recorder.resume(), Err(RecorderError::NotPaused));
        assert_eq!(fx.recorder.stop().await, Err(RecorderError::NotActive));
        assert_eq!(fx.recorder.state(), RecorderState::Inactive);

        fx.recorder.start().await.unwrap();
        assert_eq!(fx.recorder.start().await, Err(RecorderError::AlreadyActive));
        assert_eq!(fx.recorder.resume(), Err(RecorderError::NotPaused));
        assert_eq!(fx.recorder.state(), RecorderState::Recording);

        fx.recorder.pause().unwrap();
        assert_eq!(fx.recorder.pause(), Err(RecorderError::NotRecording));
        assert_eq!(fx.recorder.state(), RecorderState::Paused);
        assert!(fx.events.lock().iter().all(|k| *k != EventKind::Error));
    }

    #[tokio::test]
    async fn artifact_concatenates_data_events() {
        let fx = fixture();
        fx.recorder.start().await.unwrap();
        fx.encoder.emit(vec![1; 10], 0);
        fx.encoder.emit(vec![2; 20], 100);
        fx.encoder.queued.lock().push(vec![3; 30]);

        let artifact = fx.recorder.stop().await.unwrap();
        assert_eq!(artifact.size_bytes(), 60);
        assert_eq!(artifact.format(), &wav());
        assert_eq!(&artifact.data()[..10], &[1; 10]);
        assert_eq!(&artifact.data()[30..], &[3; 30]);

        let events = fx.events.lock().clone();
        assert_eq!(
            events,
            vec![
                EventKind::Start,
                EventKind::Data,
                EventKind::Data,
                EventKind::Data,
                EventKind::Stop,
            ]
        );
    }

    #[tokio::test]
    async fn device_denied_leaves_session_inactive() {
        let fx = fixture_with(Grant::Deny, MockEncoder::default());
        let err = fx.recorder.start().await.unwrap_err();

        assert!(matches!(err, RecorderError::DeviceUnavailable(_)));
        assert_eq!(fx.recorder.state(), RecorderState::Inactive);
        assert!(fx.events.lock().is_empty());

        // Session is reusable after a failed start
        assert!(matches!(
            fx.recorder.start().await,
            Err(RecorderError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn unsupported_format_releases_device() {
        let fx = fixture();
        let recorder = Recorder::builder(RecorderConfig::new(
            FormatId::parse("audio/webm").unwrap(),
        ))
        .devices(Arc::new(MockDevices {
            stream: Arc::clone(&fx.stream),
            grant: Grant::Allow,
        }))
        .encoders(Arc::new(MockEncoders {
            encoder: Arc::clone(&fx.encoder),
        }))
        .formats(Arc::new(|_: &FormatId| false))
        .build()
        .unwrap();

        assert!(matches!(
            recorder.start().await,
            Err(RecorderError::UnsupportedFormat { .. })
        ));
        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
    }

    #[tokio::test]
    async fn encoder_start_failure_forces_inactive() {
        let fx = fixture_with(
            Grant::Allow,
            MockEncoder {
                fail_start: true,
                ..Default::default()
            },
        );
        let err = fx.recorder.start().await.unwrap_err();
        assert!(matches!(err, RecorderError::DeviceFailure(_)));
        assert_eq!(fx.recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        assert_eq!(*fx.events.lock(), vec![EventKind::Start, EventKind::Error]);
    }

    #[tokio::test]
    async fn device_fault_mid_recording() {
        let fx = fixture();
        fx.recorder.start().await.unwrap();
        fx.encoder.emit(vec![1, 2, 3], 0);
        fx.encoder.fault("unplugged");

        assert_eq!(fx.recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        assert_eq!(fx.events.lock().last(), Some(&EventKind::Error));

        // Late chunks from the dead encoder are ignored
        fx.encoder.emit(vec![4], 10);
        assert_eq!(fx.events.lock().last(), Some(&EventKind::Error));
        assert_eq!(fx.recorder.stop().await, Err(RecorderError::NotActive));
    }

    #[tokio::test]
    async fn dispose_is_idempotent_from_any_state() {
        let fx = fixture();
        fx.recorder.dispose().await;
        assert_eq!(fx.stream.releases(), 0);

        fx.recorder.start().await.unwrap();
        fx.recorder.pause().unwrap();
        fx.recorder.dispose().await;
        fx.recorder.dispose().await;

        assert_eq!(fx.recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        assert!(!fx.events.lock().contains(&EventKind::Stop));
    }

    #[tokio::test]
    async fn dispose_during_pending_start() {
        let gate = Arc::new(Notify::new());
        let fx = fixture_with(Grant::Gated(Arc::clone(&gate)), MockEncoder::default());
        let recorder = Arc::new(fx.recorder);

        let pending = {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move { recorder.start().await })
        };
        tokio::task::yield_now().await;

        recorder.dispose().await;
        assert_eq!(recorder.state(), RecorderState::Inactive);

        gate.notify_one();
        let result = pending.await.unwrap();
        assert_eq!(result, Err(RecorderError::Aborted));
        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        assert!(fx.events.lock().is_empty());
    }

    #[tokio::test]
    async fn calls_during_pending_stop_are_rejected() {
        let (gate, fx) = gated_stop();
        let recorder = Arc::new(fx.recorder);
        recorder.start().await.unwrap();
        fx.encoder.emit(vec![1; 4], 0);
        fx.encoder.queued.lock().push(vec![2; 4]);

        let pending = {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move { recorder.stop().await })
        };
        tokio::task::yield_now().await;

        assert_eq!(recorder.stop().await, Err(RecorderError::AlreadyStopping));
        assert_eq!(recorder.pause(), Err(RecorderError::AlreadyStopping));
        assert_eq!(recorder.resume(), Err(RecorderError::AlreadyStopping));
        assert_eq!(recorder.start().await, Err(RecorderError::AlreadyActive));
        assert_eq!(fx.stream.releases(), 0);

        gate.notify_one();
        let artifact = pending.await.unwrap().unwrap();
        assert_eq!(artifact.data(), &[1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        assert_eq!(
            *fx.events.lock(),
            vec![
                EventKind::Start,
                EventKind::Data,
                EventKind::Data,
                EventKind::Stop,
            ]
        );
    }

    #[tokio::test]
    async fn dispose_during_pending_stop() {
        let (gate, fx) = gated_stop();
        let recorder = Arc::new(fx.recorder);
        recorder.start().await.unwrap();
        fx.encoder.queued.lock().push(vec![9; 4]);

        let pending = {
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move { recorder.stop().await })
        };
        tokio::task::yield_now().await;

        recorder.dispose().await;
        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);

        gate.notify_one();
        assert_eq!(pending.await.unwrap(), Err(RecorderError::Aborted));
        assert_eq!(recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        // The late flush is dropped and no stop is announced
        assert_eq!(*fx.events.lock(), vec![EventKind::Start]);

        recorder.start().await.unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);
    }

    #[test]
    fn failure_waits_for_chunk_in_flight() {
        use std::sync::mpsc;
        use std::thread;

        let (entered_tx, entered_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let slow_listener: Handler = Arc::new(move |_: &RecorderEvent| {
            let _ = entered_tx.send(());
            let _ = release_rx.lock().recv();
        });
        let fx = fixture_with_listener(
            Grant::Allow,
            MockEncoder::default(),
            Some((EventKind::Data, slow_listener)),
        );
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(fx.recorder.start()).unwrap();

        let chunk = {
            let encoder = Arc::clone(&fx.encoder);
            thread::spawn(move || encoder.emit(vec![1; 8], 0))
        };
        entered_rx.recv().unwrap();

        let fault = {
            let encoder = Arc::clone(&fx.encoder);
            thread::spawn(move || encoder.fault("unplugged"))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*fx.events.lock(), vec![EventKind::Start]);

        release_tx.send(()).unwrap();
        chunk.join().unwrap();
        fault.join().unwrap();

        assert_eq!(
            *fx.events.lock(),
            vec![EventKind::Start, EventKind::Data, EventKind::Error]
        );
        assert_eq!(fx.recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
    }

    #[tokio::test]
    async fn listener_may_fail_the_session_from_data() {
        let encoder = Arc::new(std::sync::OnceLock::<Arc<MockEncoder>>::new());
        let faulting: Handler = {
            let encoder = Arc::clone(&encoder);
            Arc::new(move |_: &RecorderEvent| {
                if let Some(encoder) = encoder.get() {
                    encoder.fault("listener gave up");
                }
            })
        };
        let fx = fixture_with_listener(
            Grant::Allow,
            MockEncoder::default(),
            Some((EventKind::Data, faulting)),
        );
        let _ = encoder.set(Arc::clone(&fx.encoder));

        fx.recorder.start().await.unwrap();
        fx.encoder.emit(vec![1; 8], 0);

        assert_eq!(fx.recorder.state(), RecorderState::Inactive);
        assert_eq!(fx.stream.releases(), 1);
        assert!(fx.events.lock().contains(&EventKind::Error));
        assert_eq!(fx.recorder.stop().await, Err(RecorderError::NotActive));
    }

    #[tokio::test]
    async fn drop_releases_device() {
        let fx = fixture();
        fx.recorder.start().await.unwrap();
        let stream = Arc::clone(&fx.stream);
        drop(fx.recorder);
        assert_eq!(stream.releases(), 1);
    }
}
