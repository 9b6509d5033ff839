//! Scripted capture device shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use smart_recorder::application::ports::{
    AudioStream, DeviceError, DeviceProvider, StreamFrame, StreamTap,
};
use smart_recorder::application::{EventKind, RecorderBuilder};
use smart_recorder::infrastructure::{NativeFormats, PcmEncoderFactory};
use smart_recorder::{Recorder, RecorderConfig};

/// Stream whose audio is pushed by the test
pub struct ScriptedStream {
    rate: u32,
    live: AtomicBool,
    releases: AtomicUsize,
    tap: Mutex<Option<StreamTap>>,
}

impl ScriptedStream {
    pub fn new(rate: u32) -> Arc<Self> {
        Arc::new(Self {
            rate,
            live: AtomicBool::new(true),
            releases: AtomicUsize::new(0),
            tap: Mutex::new(None),
        })
    }

    /// Deliver samples as the audio thread would
    pub fn feed(&self, samples: &[i16]) {
        let tap = self.tap.lock().unwrap().clone();
        if let Some(tap) = tap {
            tap(StreamFrame::Samples(samples));
        }
    }

    /// Simulate the device disappearing
    pub fn fault(&self, message: &str) {
        self.live.store(false, Ordering::SeqCst);
        let tap = self.tap.lock().unwrap().clone();
        if let Some(tap) = tap {
            tap(StreamFrame::Fault(message.to_string()));
        }
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.tap.lock().unwrap().is_some()
    }
}

impl AudioStream for ScriptedStream {
    fn label(&self) -> &str {
        "scripted"
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn attach(&self, tap: StreamTap) {
        *self.tap.lock().unwrap() = Some(tap);
    }

    fn detach(&self) {
        self.tap.lock().unwrap().take();
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
        self.tap.lock().unwrap().take();
    }
}

/// Device provider handing out one scripted stream, or refusing to
pub struct ScriptedDevices {
    pub stream: Arc<ScriptedStream>,
    pub deny: bool,
}

#[async_trait]
impl DeviceProvider for ScriptedDevices {
    async fn acquire(&self) -> Result<Arc<dyn AudioStream>, DeviceError> {
        if self.deny {
            return Err(DeviceError::PermissionDenied);
        }
        Ok(Arc::clone(&self.stream) as Arc<dyn AudioStream>)
    }
}

/// Recorder wired to the native PCM encoders and a scripted device
pub fn scripted_recorder(
    config: RecorderConfig,
    stream: &Arc<ScriptedStream>,
    deny: bool,
) -> RecorderBuilder {
    Recorder::builder(config)
        .devices(Arc::new(ScriptedDevices {
            stream: Arc::clone(stream),
            deny,
        }))
        .encoders(Arc::new(PcmEncoderFactory::new()))
        .formats(Arc::new(NativeFormats))
}

/// Record the kind of every published event
pub fn log_events(builder: RecorderBuilder) -> (RecorderBuilder, Arc<Mutex<Vec<EventKind>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut builder = builder;
    for kind in EventKind::ALL {
        let log = Arc::clone(&log);
        builder = builder.on(kind, move |event| log.lock().unwrap().push(event.kind()));
    }
    (builder, log)
}

/// A ramp of `len` samples
pub fn ramp(len: usize) -> Vec<i16> {
    (0..len).map(|i| (i % 1000) as i16).collect()
}
