//! SyntheticMic - deterministic stand-in for a biased electret microphone
//!
//! Produces ADC codes around mid-scale: low-level hiss all the time, plus
//! bursts of broadband "speech" on a fixed on/off schedule. Speech is
//! uniform noise with a wide swing, so its sample-to-sample slope stays well
//! above the envelope's noise offset while its minimum slope (and with it
//! the tracked floor) stays low. Seeded, so a given seed always yields the
//! same codes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::source::AnalogSource;

const DEFAULT_NOISE_CODES: f32 = 6.0;
const DEFAULT_SPEECH_CODES: f32 = 1_800.0;
const DEFAULT_BURST_MS: u32 = 600;
const DEFAULT_GAP_MS: u32 = 900;

pub struct SyntheticMic {
    rng: StdRng,
    sample_rate_hz: u32,
    bits: u8,
    index: u64,
    noise_codes: f32,
    speech_codes: f32,
    burst_ms: u32,
    gap_ms: u32,
}

impl SyntheticMic {
    /// # Arguments
    /// * `sample_rate_hz` - Rate at which `read` will be called
    /// * `seed` - RNG seed for the noise and amplitude jitter
    pub fn new(sample_rate_hz: u32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            sample_rate_hz: sample_rate_hz.max(1),
            bits: 12,
            index: 0,
            noise_codes: DEFAULT_NOISE_CODES,
            speech_codes: DEFAULT_SPEECH_CODES,
            burst_ms: DEFAULT_BURST_MS,
            gap_ms: DEFAULT_GAP_MS,
        }
    }

    /// Peak amplitude of the always-on hiss, in ADC codes.
    pub fn with_noise(mut self, codes: f32) -> Self {
        self.noise_codes = codes.max(0.0);
        self
    }

    /// Shape of the speech bursts: peak swing in ADC codes, burst and gap
    /// lengths. A `burst_ms` of 0 yields pure noise.
    pub fn with_speech(mut self, codes: f32, burst_ms: u32, gap_ms: u32) -> Self {
        self.speech_codes = codes.max(0.0);
        self.burst_ms = burst_ms;
        self.gap_ms = gap_ms;
        self
    }

    pub fn with_resolution(mut self, bits: u8) -> Self {
        self.bits = bits.clamp(1, 16);
        self
    }

    /// Whether the sample `read` returns next falls inside a speech burst.
    pub fn is_speaking(&self) -> bool {
        self.speaking_at(self.index)
    }

    /// Milliseconds of signal produced so far.
    pub fn elapsed_ms(&self) -> u64 {
        self.index * 1_000 / u64::from(self.sample_rate_hz)
    }

    fn speaking_at(&self, index: u64) -> bool {
        if self.burst_ms == 0 {
            return false;
        }
        let cycle_ms = u64::from(self.burst_ms) + u64::from(self.gap_ms);
        let at_ms = index * 1_000 / u64::from(self.sample_rate_hz);
        at_ms % cycle_ms < u64::from(self.burst_ms)
    }

    fn adc_max(&self) -> f32 {
        ((1u32 << self.bits) - 1) as f32
    }
}

impl AnalogSource for SyntheticMic {
    fn read(&mut self) -> u16 {
        let adc_max = self.adc_max();
        let mid = (adc_max + 1.0) * 0.5;
        let mut value = mid;

        if self.noise_codes > 0.0 {
            value += self.rng.gen_range(-self.noise_codes..=self.noise_codes);
        }
        if self.speaking_at(self.index) && self.speech_codes > 0.0 {
            value += self.rng.gen_range(-self.speech_codes..=self.speech_codes);
        }

        self.index += 1;
        value.round().clamp(0.0, adc_max) as u16
    }

    fn resolution_bits(&self) -> u8 {
        self.bits
    }
}
