// SampleMailbox - lock-free hand-off from the sampling interrupt to the main loop
//
// The interrupt only reads the ADC, stamps the sample and posts it; all filter
// work happens when the main loop drains the mailbox. This keeps the interrupt
// body short and moves the noise floor scan out of interrupt context.
//
// Overflow policy: when the main loop falls behind and the ring is full, the
// NEW sample is dropped and reported to the caller. Already queued samples
// keep their order, so the envelope never sees time run backwards.

use rtrb::{Consumer, Producer, RingBuffer};

/// One ADC reading and the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedSample {
    pub value: u16,
    pub at_us: u64,
}

/// Interrupt side of the mailbox.
pub struct MailboxProducer {
    producer: Producer<TimedSample>,
}

impl MailboxProducer {
    /// Queue a sample.
    ///
    /// # Returns
    /// `false` if the mailbox was full and the sample was dropped
    #[inline]
    pub fn post(&mut self, sample: TimedSample) -> bool {
        self.producer.push(sample).is_ok()
    }

    /// Free slots left.
    pub fn free(&self) -> usize {
        self.producer.slots()
    }
}

/// Main loop side of the mailbox.
pub struct MailboxConsumer {
    consumer: Consumer<TimedSample>,
}

impl MailboxConsumer {
    /// Pop every pending sample, oldest first, into `sink`.
    ///
    /// # Returns
    /// Number of samples drained
    pub fn drain<F: FnMut(TimedSample)>(&mut self, mut sink: F) -> usize {
        let mut drained = 0;
        while let Ok(sample) = self.consumer.pop() {
            sink(sample);
            drained += 1;
        }
        drained
    }

    /// Samples waiting to be drained.
    pub fn pending(&self) -> usize {
        self.consumer.slots()
    }
}

/// Bounded SPSC mailbox of [`TimedSample`]s.
///
/// # Example
/// ```ignore
/// let (mut tx, mut rx) = SampleMailbox::new(1024);
///
/// // In the timer callback:
/// tx.post(TimedSample { value: adc.read(), at_us: clock.now_micros() });
///
/// // In the main loop:
/// rx.drain(|s| { follower.update(s.value, s.at_us); });
/// ```
pub struct SampleMailbox;

impl SampleMailbox {
    /// # Panics
    /// Panics if capacity is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(capacity: usize) -> (MailboxProducer, MailboxConsumer) {
        assert!(capacity > 0, "mailbox capacity must be greater than 0");
        let (producer, consumer) = RingBuffer::new(capacity);
        (MailboxProducer { producer }, MailboxConsumer { consumer })
    }
}
