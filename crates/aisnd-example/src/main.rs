use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aisnd::driver::FRAME_SIZE;
use aisnd::{ring, Config, RingSource};

const SAMPLE_RATE: u32 = 48000;
const BLOCK_FRAMES: usize = 256;

struct Saw {
    freq: f32,
    time: f32,
}

impl Saw {
    fn fill(&mut self, buf: &mut [u8]) {
        for frame in buf.chunks_exact_mut(FRAME_SIZE) {
            let x = self.time / (SAMPLE_RATE as f32) * self.freq;
            let y = 2.0 * (x - (0.5 + x).floor());
            let sample = ((y * 0.25) * f32::from(i16::MAX)) as i16;

            frame[..2].copy_from_slice(&sample.to_le_bytes());
            frame[2..].copy_from_slice(&sample.to_le_bytes());

            self.time += 1.0;
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();

    let (mut producer, consumer) = ring::buffer(BLOCK_FRAMES * FRAME_SIZE * 8);
    let source = Arc::new(RingSource::new(consumer));

    let running = Arc::new(AtomicBool::new(true));

    let producer_thread = std::thread::spawn({
        let running = running.clone();
        move || {
            if let Err(e) = audio_thread_priority::promote_current_thread_to_real_time(
                BLOCK_FRAMES as u32,
                SAMPLE_RATE,
            ) {
                eprintln!("{e}");
            }

            let mut saw = Saw {
                freq: 220.0,
                time: 0.0,
            };

            let mut buf = vec![0; BLOCK_FRAMES * FRAME_SIZE];
            saw.fill(&mut buf);
            let mut pending = &buf[..];

            while running.load(Ordering::Relaxed) {
                match producer.write(pending) {
                    Ok(written) => pending = &pending[written..],
                    Err(_) => break,
                }

                if pending.is_empty() {
                    saw.fill(&mut buf);
                    pending = &buf[..];
                } else {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
        }
    });

    let driver = aisnd::create_driver(source.clone(), config).unwrap();
    driver.initialize().unwrap();
    driver.set_frequency(SAMPLE_RATE).unwrap();

    std::thread::sleep(Duration::from_secs(5));

    driver.deinitialize();
    running.store(false, Ordering::Relaxed);
    producer_thread.join().unwrap();

    tracing::info!(queued = source.queued(), "discarding unplayed audio");
    source.clear();
}
