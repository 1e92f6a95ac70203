//! Analog sample sources
//!
//! `AnalogSource` is the boundary to the ADC driver: one call, one code in
//! `[0, 2^bits - 1]`, no error path. A faulty converter shows up as stale or
//! garbage codes, which the envelope clamps like any other input.

/// Single-shot or continuously latched ADC read.
pub trait AnalogSource: Send {
    /// Read the latest conversion result.
    fn read(&mut self) -> u16;

    /// Converter resolution in bits.
    fn resolution_bits(&self) -> u8 {
        12
    }
}

/// Any `FnMut() -> u16` closure can stand in for an ADC (tests, simulations).
impl<F> AnalogSource for F
where
    F: FnMut() -> u16 + Send,
{
    fn read(&mut self) -> u16 {
        self()
    }
}

/// Map a PCM sample in [-1, 1] onto ADC codes centred at mid-scale.
///
/// Out-of-range and non-finite inputs clip to the rails / mid-scale, the way
/// a biased microphone amplifier saturates into the converter.
#[inline]
pub fn to_adc_sample(sample: f32, adc_max: u16) -> u16 {
    let sample = if sample.is_finite() { sample } else { 0.0 };
    let unit = (sample.clamp(-1.0, 1.0) + 1.0) * 0.5;
    (unit * f32::from(adc_max)).round() as u16
}

/// Plays back pre-recorded ADC codes, then latches the final value.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    samples: Vec<u16>,
    position: usize,
    bits: u8,
}

impl ReplaySource {
    pub fn new(samples: Vec<u16>, bits: u8) -> Self {
        Self {
            samples,
            position: 0,
            bits,
        }
    }

    /// Build from PCM samples in [-1, 1].
    pub fn from_pcm(pcm: &[f32], bits: u8) -> Self {
        let adc_max = ((1u32 << bits.clamp(1, 16)) - 1) as u16;
        let samples = pcm.iter().map(|&s| to_adc_sample(s, adc_max)).collect();
        Self::new(samples, bits)
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }

    pub fn remaining(&self) -> usize {
        self.samples.len().saturating_sub(self.position)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl AnalogSource for ReplaySource {
    fn read(&mut self) -> u16 {
        match self.samples.get(self.position) {
            Some(&value) => {
                self.position += 1;
                value
            }
            None => self.samples.last().copied().unwrap_or(0),
        }
    }

    fn resolution_bits(&self) -> u8 {
        self.bits
    }
}
