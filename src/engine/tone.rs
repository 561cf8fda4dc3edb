//! ToneEngine - a small sine voice engine for exercising the driver
//!
//! Three parameters: frequency, amplitude and an enable switch that fires a
//! new enveloped voice. Voice spawns travel from the controller thread to
//! the audio loop through a lock-free SPSC queue; voice storage is
//! allocated once.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use rtrb::{Consumer, Producer, RingBuffer};

use super::{EngineFactory, EngineHandle, STATUS_OK, STATUS_REJECTED, STATUS_RELEASED};
use crate::config::{DriverConfig, ToneConfig};

const PCM16_SCALE: f32 = 32767.0;

/// Parameter indices understood by [`ToneEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ToneParam {
    Frequency = 0,
    Amplitude = 1,
    Enable = 2,
}

impl TryFrom<i32> for ToneParam {
    type Error = i32;

    fn try_from(index: i32) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(ToneParam::Frequency),
            1 => Ok(ToneParam::Amplitude),
            2 => Ok(ToneParam::Enable),
            other => Err(other),
        }
    }
}

/// f32 stored as raw bits so the controller can update it without locking
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Linear attack / sustain / release envelope, measured in samples
#[derive(Debug, Clone, Copy)]
struct Envelope {
    attack: u32,
    sustain: u32,
    release: u32,
}

impl Envelope {
    fn from_config(tone: &ToneConfig, sample_rate: f32) -> Self {
        let to_samples = |secs: f32| (secs.max(0.0) * sample_rate) as u32;
        Self {
            attack: to_samples(tone.attack_secs),
            sustain: to_samples(tone.sustain_secs),
            release: to_samples(tone.release_secs),
        }
    }

    fn length(&self) -> u32 {
        self.attack + self.sustain + self.release
    }

    fn gain(&self, age: u32) -> f32 {
        if age < self.attack {
            age as f32 / self.attack as f32
        } else if age < self.attack + self.sustain {
            1.0
        } else if age < self.length() {
            let into_release = age - self.attack - self.sustain;
            1.0 - into_release as f32 / self.release.max(1) as f32
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum VoiceEvent {
    Start { frequency: f32, amplitude: f32 },
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    phase: f32,
    increment: f32,
    amplitude: f32,
    age: u32,
}

impl Voice {
    fn next_sample(&mut self, envelope: &Envelope) -> f32 {
        let sample = self.phase.sin() * self.amplitude * envelope.gain(self.age);
        self.phase = (self.phase + self.increment) % TAU;
        self.age = self.age.saturating_add(1);
        sample
    }

    fn finished(&self, envelope: &Envelope) -> bool {
        self.age >= envelope.length()
    }
}

/// Loop-thread state: incoming spawn requests plus the sounding voices
struct VoiceBank {
    events: Consumer<VoiceEvent>,
    voices: Vec<Voice>,
    max_voices: usize,
}

impl VoiceBank {
    fn drain_events(&mut self, sample_rate: f32) {
        while let Ok(VoiceEvent::Start {
            frequency,
            amplitude,
        }) = self.events.pop()
        {
            if self.voices.len() == self.max_voices {
                self.voices.remove(0);
            }
            self.voices.push(Voice {
                phase: 0.0,
                increment: TAU * frequency / sample_rate,
                amplitude,
                age: 0,
            });
        }
    }
}

/// Sine voice engine implementing [`EngineHandle`]
pub struct ToneEngine {
    sample_rate: f32,
    output_channels: usize,
    frequency: AtomicF32,
    amplitude: AtomicF32,
    envelope: Envelope,
    events_tx: Mutex<Producer<VoiceEvent>>,
    bank: Mutex<VoiceBank>,
    released: AtomicBool,
}

impl ToneEngine {
    /// Create an engine host sized for `config`
    pub fn new(config: &DriverConfig, tone: &ToneConfig) -> Self {
        let sample_rate = config.sample_rate.max(1) as f32;
        let max_voices = tone.max_voices.max(1);
        let (events_tx, events) = RingBuffer::new(tone.event_queue_capacity.max(1));

        Self {
            sample_rate,
            output_channels: config.output_channels.max(1) as usize,
            frequency: AtomicF32::new(440.0),
            amplitude: AtomicF32::new(0.0),
            envelope: Envelope::from_config(tone, sample_rate),
            events_tx: Mutex::new(events_tx),
            bank: Mutex::new(VoiceBank {
                events,
                voices: Vec::with_capacity(max_voices),
                max_voices,
            }),
            released: AtomicBool::new(false),
        }
    }

    /// Factory creating a fresh tone engine for each driver
    pub fn factory(tone: ToneConfig) -> impl EngineFactory {
        move |config: &DriverConfig| -> Result<Arc<dyn EngineHandle>, crate::error::AudioError> {
            Ok(Arc::new(ToneEngine::new(config, &tone)))
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency.load()
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude.load()
    }

    fn spawn_voice(&self) -> i32 {
        let event = VoiceEvent::Start {
            frequency: self.frequency.load(),
            amplitude: self.amplitude.load(),
        };
        let Ok(mut events_tx) = self.events_tx.lock() else {
            return STATUS_REJECTED;
        };
        match events_tx.push(event) {
            Ok(()) => STATUS_OK,
            Err(_) => {
                debug!("[ToneEngine] Voice queue full, dropping trigger");
                STATUS_REJECTED
            }
        }
    }

    fn render(&self, block: &mut [i16]) -> i32 {
        if self.released.load(Ordering::Acquire) {
            return STATUS_RELEASED;
        }

        let mut bank = match self.bank.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bank.drain_events(self.sample_rate);

        let envelope = self.envelope;
        for frame in block.chunks_mut(self.output_channels) {
            let mix: f32 = bank
                .voices
                .iter_mut()
                .map(|voice| voice.next_sample(&envelope))
                .sum();
            frame.fill(to_pcm16(mix));
        }

        bank.voices.retain(|voice| !voice.finished(&envelope));
        STATUS_OK
    }

    #[cfg(test)]
    fn active_voices(&self) -> usize {
        self.bank.lock().map(|bank| bank.voices.len()).unwrap_or(0)
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample * PCM16_SCALE).clamp(-PCM16_SCALE, PCM16_SCALE) as i16
}

impl EngineHandle for ToneEngine {
    /// Capture input is not routed into the tone graph.
    fn process_duplex(&self, block: &mut [i16]) -> i32 {
        self.render(block)
    }

    fn process_render_only(&self, block: &mut [i16]) -> i32 {
        self.render(block)
    }

    fn set_parameter(&self, index: i32, value: f32) -> i32 {
        if self.released.load(Ordering::Acquire) {
            return STATUS_RELEASED;
        }
        if !value.is_finite() {
            return STATUS_REJECTED;
        }

        match ToneParam::try_from(index) {
            Ok(ToneParam::Frequency) => {
                self.frequency.store(value.clamp(0.0, self.sample_rate / 2.0));
                STATUS_OK
            }
            Ok(ToneParam::Amplitude) => {
                self.amplitude.store(value.clamp(0.0, 1.0));
                STATUS_OK
            }
            Ok(ToneParam::Enable) if value >= 0.5 => self.spawn_voice(),
            Ok(ToneParam::Enable) => STATUS_OK,
            Err(_) => STATUS_REJECTED,
        }
    }

    fn send_trigger(&self, index: i32) -> i32 {
        if self.released.load(Ordering::Acquire) {
            return STATUS_RELEASED;
        }
        match ToneParam::try_from(index) {
            Ok(ToneParam::Enable) => self.spawn_voice(),
            _ => STATUS_REJECTED,
        }
    }

    fn send_bytes(&self, _index: i32, _payload: &[u8]) -> i32 {
        if self.released.load(Ordering::Acquire) {
            return STATUS_RELEASED;
        }
        STATUS_REJECTED
    }

    fn destroy_host(&self) {
        self.released.store(true, Ordering::Release);
        if let Ok(mut bank) = self.bank.lock() {
            bank.voices.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ToneEngine {
        ToneEngine::new(&DriverConfig::output_only(), &ToneConfig::default())
    }

    #[test]
    fn test_silent_until_enabled() {
        let engine = engine();
        let mut block = vec![7_i16; 64];
        assert_eq!(engine.process_render_only(&mut block), STATUS_OK);
        assert!(block.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_enable_spawns_voice() {
        let engine = engine();
        assert_eq!(engine.set_parameter(ToneParam::Frequency as i32, 500.0), STATUS_OK);
        assert_eq!(engine.set_parameter(ToneParam::Amplitude as i32, 0.5), STATUS_OK);
        assert_eq!(engine.set_parameter(ToneParam::Enable as i32, 1.0), STATUS_OK);

        let mut block = vec![0_i16; 8192];
        engine.process_render_only(&mut block);
        assert_eq!(engine.active_voices(), 1);
        assert!(block.iter().any(|&s| s != 0));
        assert!(block.iter().all(|&s| s.unsigned_abs() <= 16384));
    }

    #[test]
    fn test_enable_below_threshold_does_nothing() {
        let engine = engine();
        engine.set_parameter(ToneParam::Amplitude as i32, 0.5);
        assert_eq!(engine.set_parameter(ToneParam::Enable as i32, 0.0), STATUS_OK);
        let mut block = vec![0_i16; 256];
        engine.process_render_only(&mut block);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_unknown_index_rejected() {
        let engine = engine();
        assert_eq!(engine.set_parameter(42, 1.0), STATUS_REJECTED);
        assert_eq!(engine.send_trigger(-3), STATUS_REJECTED);
        assert_eq!(engine.send_bytes(0, &[1, 2, 3]), STATUS_REJECTED);
        assert_eq!(engine.frequency(), 440.0);
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let engine = engine();
        assert_eq!(
            engine.set_parameter(ToneParam::Frequency as i32, f32::NAN),
            STATUS_REJECTED
        );
        assert_eq!(engine.frequency(), 440.0);
    }

    #[test]
    fn test_amplitude_is_clamped() {
        let engine = engine();
        engine.set_parameter(ToneParam::Amplitude as i32, 4.0);
        assert_eq!(engine.amplitude(), 1.0);
    }

    #[test]
    fn test_voice_cap_drops_oldest() {
        let tone = ToneConfig {
            max_voices: 2,
            ..ToneConfig::default()
        };
        let engine = ToneEngine::new(&DriverConfig::output_only(), &tone);
        for _ in 0..5 {
            assert_eq!(engine.send_trigger(ToneParam::Enable as i32), STATUS_OK);
        }
        let mut block = vec![0_i16; 16];
        engine.process_render_only(&mut block);
        assert_eq!(engine.active_voices(), 2);
    }

    #[test]
    fn test_voice_finishes_after_envelope() {
        let tone = ToneConfig {
            attack_secs: 0.001,
            sustain_secs: 0.001,
            release_secs: 0.001,
            ..ToneConfig::default()
        };
        let engine = ToneEngine::new(&DriverConfig::output_only(), &tone);
        engine.set_parameter(ToneParam::Amplitude as i32, 0.5);
        engine.send_trigger(ToneParam::Enable as i32);

        let mut block = vec![0_i16; 1024];
        engine.process_render_only(&mut block);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_stereo_frames_are_duplicated() {
        let config = DriverConfig {
            output_channels: 2,
            ..DriverConfig::output_only()
        };
        let engine = ToneEngine::new(&config, &ToneConfig::default());
        engine.set_parameter(ToneParam::Amplitude as i32, 0.8);
        engine.send_trigger(ToneParam::Enable as i32);

        let mut block = vec![0_i16; 2048];
        engine.process_duplex(&mut block);
        for frame in block.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_destroyed_engine_reports_released() {
        let engine = engine();
        engine.destroy_host();
        let mut block = vec![0_i16; 16];
        assert_eq!(engine.process_render_only(&mut block), STATUS_RELEASED);
        assert_eq!(engine.set_parameter(0, 100.0), STATUS_RELEASED);
        assert_eq!(engine.send_trigger(2), STATUS_RELEASED);
    }

    #[test]
    fn test_pcm_conversion_clamps() {
        assert_eq!(to_pcm16(2.0), 32767);
        assert_eq!(to_pcm16(-2.0), -32767);
        assert_eq!(to_pcm16(0.0), 0);
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = Envelope {
            attack: 10,
            sustain: 10,
            release: 10,
        };
        assert_eq!(envelope.gain(0), 0.0);
        assert_eq!(envelope.gain(5), 0.5);
        assert_eq!(envelope.gain(15), 1.0);
        assert_eq!(envelope.gain(25), 0.5);
        assert_eq!(envelope.gain(30), 0.0);
    }
}
