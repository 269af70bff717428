use std::io;
use std::sync::{Arc, Mutex};

use aisnd_core::driver::{
    CallbackResult, OutCallback, OutCallbackData, OutStream, OutStreamDesc, Platform, SampleFormat,
    SharingMode, StreamBuilder, FRAME_SIZE,
};
use aisnd_core::ring;
use aisnd_core::{AiSource, Config, Error, OutputDriver, RingSource, SilentSource, SoundDriver};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Event {
    CreateBuilder,
    DropBuilder,
    Open { sample_rate: u32, capacity: usize },
    Start,
    Pause,
    Close,
}

#[derive(Debug, thiserror::Error)]
#[error("mock failure")]
struct MockError;

#[derive(Default)]
struct MockState {
    events: Vec<Event>,
    open_streams: usize,
    max_open_streams: usize,
    callback: Option<OutCallback>,
    fail_create_builder: bool,
    fail_open: bool,
    fail_start: bool,
}

#[derive(Clone, Default)]
struct MockPlatform {
    state: Arc<Mutex<MockState>>,
}

impl MockPlatform {
    fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    fn clear_events(&self) {
        self.state.lock().unwrap().events.clear();
    }

    fn configure(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    fn max_open_streams(&self) -> usize {
        self.state.lock().unwrap().max_open_streams
    }

    /// Runs the registered callback as the platform audio thread would.
    fn pull(&self, num_frames: usize) -> Option<Vec<u8>> {
        let mut callback = self.state.lock().unwrap().callback.take()?;

        let mut bytes = vec![0xFF; num_frames * FRAME_SIZE];
        let result = callback(OutCallbackData {
            num_frames,
            bytes: &mut bytes,
        });
        assert_eq!(result, CallbackResult::Continue);

        let mut state = self.state.lock().unwrap();
        if state.open_streams > 0 {
            state.callback = Some(callback);
        }

        Some(bytes)
    }
}

impl Platform for MockPlatform {
    type Error = MockError;
    type Builder = MockBuilder;
    type OutStream = MockStream;

    fn create_builder(&self) -> Result<MockBuilder, MockError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create_builder {
            return Err(MockError);
        }

        state.events.push(Event::CreateBuilder);
        Ok(MockBuilder {
            state: self.state.clone(),
        })
    }
}

struct MockBuilder {
    state: Arc<Mutex<MockState>>,
}

impl StreamBuilder for MockBuilder {
    type Error = MockError;
    type OutStream = MockStream;

    fn open_stream(self, desc: OutStreamDesc) -> Result<MockStream, MockError> {
        assert_eq!(desc.channel_count, 2);
        assert_eq!(desc.format, SampleFormat::I16);
        assert_eq!(desc.sharing_mode, SharingMode::Shared);

        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(MockError);
        }

        state.events.push(Event::Open {
            sample_rate: desc.sample_rate,
            capacity: desc.buffer_capacity_frames,
        });
        state.open_streams += 1;
        state.max_open_streams = state.max_open_streams.max(state.open_streams);
        state.callback = Some(desc.callback);

        Ok(MockStream {
            state: self.state.clone(),
        })
    }
}

impl Drop for MockBuilder {
    fn drop(&mut self) {
        self.state.lock().unwrap().events.push(Event::DropBuilder);
    }
}

struct MockStream {
    state: Arc<Mutex<MockState>>,
}

impl OutStream for MockStream {
    type Error = MockError;

    fn is_active(&self) -> Result<bool, MockError> {
        Ok(true)
    }

    fn request_start(&self) -> Result<(), MockError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Start);
        if state.fail_start {
            return Err(MockError);
        }
        Ok(())
    }

    fn request_pause(&self) -> Result<(), MockError> {
        self.state.lock().unwrap().events.push(Event::Pause);
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Close);
        state.open_streams -= 1;
        state.callback = None;
    }
}

/// Collects formatted log output so tests can assert on diagnostics.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn driver_with(source: Arc<dyn AiSource>) -> (OutputDriver<MockPlatform>, MockPlatform) {
    let platform = MockPlatform::default();
    let config = Config {
        max_buffer_size: 16384,
        ..Config::default()
    };
    (OutputDriver::new(platform.clone(), source, &config), platform)
}

fn driver() -> (OutputDriver<MockPlatform>, MockPlatform) {
    driver_with(Arc::new(SilentSource))
}

#[test]
fn set_frequency_opens_and_starts() {
    let (driver, platform) = driver();

    assert!(!driver.is_open());
    driver.set_frequency(44100).unwrap();

    assert!(driver.is_open());
    assert_eq!(driver.sample_rate(), 44100);
    assert_eq!(
        platform.events(),
        [
            Event::CreateBuilder,
            Event::Open {
                sample_rate: 44100,
                capacity: 16384 / FRAME_SIZE,
            },
            Event::DropBuilder,
            Event::Start,
        ]
    );
}

#[test]
fn repeated_frequency_is_noop() {
    let (driver, platform) = driver();

    driver.set_frequency(32000).unwrap();
    platform.clear_events();

    driver.set_frequency(32000).unwrap();
    assert!(platform.events().is_empty());
    assert!(driver.is_open());
}

#[test]
fn frequency_change_closes_before_opening() {
    let (driver, platform) = driver();

    driver.set_frequency(32000).unwrap();
    platform.clear_events();

    driver.set_frequency(48000).unwrap();

    let events = platform.events();
    let close = events.iter().position(|e| *e == Event::Close).unwrap();
    let open = events
        .iter()
        .position(|e| matches!(e, Event::Open { .. }))
        .unwrap();

    assert!(close < open);
    assert_eq!(platform.max_open_streams(), 1);
    assert_eq!(driver.sample_rate(), 48000);
}

#[test]
fn teardown_is_idempotent() {
    let (driver, platform) = driver();

    driver.teardown();
    driver.teardown();

    driver.set_frequency(22050).unwrap();
    for _ in 0..5 {
        driver.teardown();
    }

    assert!(!driver.is_open());
    let closes = platform
        .events()
        .iter()
        .filter(|e| **e == Event::Close)
        .count();
    assert_eq!(closes, 1);

    driver.deinitialize();
    driver.deinitialize();
}

#[test]
fn failed_open_leaves_session_closed() {
    let (driver, platform) = driver();
    platform.configure(|state| state.fail_open = true);

    let result = driver.set_frequency(48000);
    assert!(matches!(result, Err(Error::OpenStream(_))));
    assert!(!driver.is_open());
    assert_eq!(
        platform.events(),
        [Event::CreateBuilder, Event::DropBuilder]
    );

    platform.clear_events();
    driver.start_audio();
    driver.stop_audio();
    assert!(platform.events().is_empty());
}

#[test]
fn same_rate_retries_after_failed_open() {
    let (driver, platform) = driver();
    platform.configure(|state| state.fail_open = true);

    assert!(driver.set_frequency(48000).is_err());
    assert_eq!(driver.sample_rate(), 0);

    platform.configure(|state| state.fail_open = false);
    platform.clear_events();

    driver.set_frequency(48000).unwrap();
    assert!(driver.is_open());
    assert_eq!(driver.sample_rate(), 48000);
    assert!(platform.events().contains(&Event::Start));
}

#[test]
fn failed_builder_leaves_session_closed() {
    let (driver, platform) = driver();
    platform.configure(|state| state.fail_create_builder = true);

    let result = driver.set_frequency(48000);
    assert!(matches!(result, Err(Error::CreateBuilder(_))));
    assert!(!driver.is_open());
    assert!(platform.events().is_empty());

    platform.configure(|state| state.fail_create_builder = false);
    driver.set_frequency(48000).unwrap();
    assert!(driver.is_open());

    // A direct setup reopens at the stored rate.
    driver.setup().unwrap();
    assert!(driver.is_open());
    assert_eq!(platform.max_open_streams(), 1);
}

#[test]
fn max_buffer_size_is_whole_frames() {
    let platform = MockPlatform::default();
    let config = Config {
        max_buffer_size: 4099,
        ..Config::default()
    };
    let driver = OutputDriver::new(platform.clone(), Arc::new(SilentSource), &config);
    assert_eq!(driver.max_buffer_size(), 4096);

    driver.set_frequency(48000).unwrap();
    assert!(platform.events().contains(&Event::Open {
        sample_rate: 48000,
        capacity: 4096 / FRAME_SIZE,
    }));

    let config = Config {
        max_buffer_size: 1,
        ..Config::default()
    };
    let driver = OutputDriver::new(MockPlatform::default(), Arc::new(SilentSource), &config);
    assert_eq!(driver.max_buffer_size(), FRAME_SIZE);
}

#[test]
fn start_failure_is_not_fatal() {
    let (driver, platform) = driver();
    platform.configure(|state| state.fail_start = true);

    driver.set_frequency(48000).unwrap();
    assert!(driver.is_open());

    driver.start_audio();
    driver.stop_audio();
    assert!(platform.events().ends_with(&[Event::Start, Event::Pause]));
}

#[test]
fn initialize_closes_and_resets_rate() {
    let (driver, platform) = driver();

    driver.set_frequency(48000).unwrap();
    driver.initialize().unwrap();

    assert!(!driver.is_open());
    assert_eq!(driver.sample_rate(), 0);

    // The same rate reopens after a reset.
    platform.clear_events();
    driver.set_frequency(48000).unwrap();
    assert!(platform.events().contains(&Event::Start));
}

#[test]
fn zero_rate_is_rejected() {
    let (driver, _platform) = driver();

    driver.set_frequency(44100).unwrap();
    let result = driver.set_frequency(0);

    assert!(matches!(result, Err(Error::InvalidSampleRate(0))));
    assert!(!driver.is_open());
}

#[test]
fn drop_closes_stream() {
    let (driver, platform) = driver();
    driver.set_frequency(48000).unwrap();

    drop(driver);
    assert_eq!(platform.events().last(), Some(&Event::Close));
}

#[test]
fn volume_and_update_are_ignored() {
    let (driver, platform) = driver();
    driver.set_frequency(48000).unwrap();
    platform.clear_events();

    driver.set_volume(50);
    driver.ai_update(true);
    driver.ai_update(false);

    assert!(platform.events().is_empty());
}

#[test]
fn starved_pull_pads_with_silence() {
    let (mut producer, consumer) = ring::buffer(4096);
    let (driver, platform) = driver_with(Arc::new(RingSource::new(consumer)));

    driver.set_frequency(48000).unwrap();

    let audio: Vec<u8> = (0..2000).map(|i| (i % 251) as u8 + 1).collect();
    assert_eq!(producer.write(&audio), Ok(2000));

    let logs = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .finish();

    // The mock runs the callback on this thread, so a scoped subscriber sees its events.
    let bytes = tracing::subscriber::with_default(subscriber, || platform.pull(960)).unwrap();
    assert_eq!(bytes.len(), 3840);
    assert_eq!(&bytes[..2000], &audio[..]);
    assert!(bytes[2000..].iter().all(|&b| b == 0));
    assert_eq!(driver.underruns(), 1);

    let output = logs.contents();
    assert!(output.contains("audio buffer could not be filled"), "{output}");
    assert!(output.contains("missing=1840"), "{output}");

    let audio = vec![7u8; 3840];
    assert_eq!(producer.write(&audio), Ok(3840));
    let bytes = platform.pull(960).unwrap();
    assert_eq!(bytes, audio);
    assert_eq!(driver.underruns(), 1);
}

#[test]
fn no_callback_after_teardown() {
    let (driver, platform) = driver();
    driver.set_frequency(48000).unwrap();
    assert!(platform.pull(16).is_some());

    driver.teardown();
    assert!(platform.pull(16).is_none());
}
