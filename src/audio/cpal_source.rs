// CpalMicSource - desktop microphone as a latched ADC
//
// The cpal input callback pushes first-channel PCM into an rtrb ring. Each
// `read()` drains whatever arrived since the last call and returns the newest
// sample converted to ADC codes, so the sampler behaves like a free-running
// converter: reads between audio callbacks see the same latched value.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, RingBuffer};

use super::source::{to_adc_sample, AnalogSource};
use crate::error::MicError;

/// Ring capacity in PCM samples (about 170ms at 48kHz)
const PCM_RING_CAPACITY: usize = 8192;

/// Keeps the cpal stream alive. Dropping it stops capture.
///
/// `cpal::Stream` is not `Send` on every host, so this stays on the thread
/// that opened it while the [`CpalMicSource`] moves into the sampler.
pub struct LiveInput {
    _stream: cpal::Stream,
    sample_rate: u32,
    device_name: String,
}

impl LiveInput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

pub struct CpalMicSource {
    consumer: Consumer<f32>,
    latched: u16,
    adc_max: u16,
    bits: u8,
}

impl AnalogSource for CpalMicSource {
    fn read(&mut self) -> u16 {
        let mut newest = None;
        while let Ok(sample) = self.consumer.pop() {
            newest = Some(sample);
        }
        if let Some(sample) = newest {
            self.latched = to_adc_sample(sample, self.adc_max);
        }
        self.latched
    }

    fn resolution_bits(&self) -> u8 {
        self.bits
    }
}

/// Open the default input device and start capturing.
///
/// # Arguments
/// * `adc_bits` - Resolution the PCM samples are quantised to
///
/// # Errors
/// `MicError::SourceUnavailable` if there is no input device, its format is
/// not F32, or the stream fails to start
pub fn open_default_input(adc_bits: u8) -> Result<(LiveInput, CpalMicSource), MicError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| MicError::SourceUnavailable {
            reason: "No default input device found".to_string(),
        })?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let config = device
        .default_input_config()
        .map_err(|e| MicError::SourceUnavailable {
            reason: format!("Failed to get default input config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    let channels_count = usize::from(stream_config.channels).max(1);
    let sample_rate = stream_config.sample_rate.0;

    let (mut producer, consumer) = RingBuffer::<f32>::new(PCM_RING_CAPACITY);
    let err_fn = |err| tracing::warn!("Input stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks(channels_count) {
                    // ring full: the sampler is not reading, drop
                    if producer.push(frame[0]).is_err() {
                        break;
                    }
                }
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(MicError::SourceUnavailable {
                reason: "Only F32 sample format is currently supported for input".to_string(),
            })
        }
    }
    .map_err(|e| MicError::SourceUnavailable {
        reason: format!("{:?}", e),
    })?;

    stream.play().map_err(|e| MicError::SourceUnavailable {
        reason: format!("Failed to start input stream: {:?}", e),
    })?;

    let bits = adc_bits.clamp(1, 16);
    let adc_max = ((1u32 << bits) - 1) as u16;
    tracing::info!(device = %device_name, sample_rate, "live input opened");

    Ok((
        LiveInput {
            _stream: stream,
            sample_rate,
            device_name,
        },
        CpalMicSource {
            consumer,
            latched: adc_max / 2 + 1,
            adc_max,
            bits,
        },
    ))
}
