//! Timestamp drivers.
//!
//! The recorder samples a free-running counter through the [`Timestamp`]
//! capability set; which driver is used is decided at build time by the
//! `timer:` field of the `recorder!` invocation, so there is no dispatch on
//! the hot path. A driver need not use all 32 bits; it declares how many it
//! provides and the recorder right-shifts and masks the sample into the FMT
//! word.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::Config;
use crate::key::Key;
use crate::{Inner, FMT_LONG_TIMESTAMP, SYSTEM_FILTER};

/// A monotonic counter the recorder derives timestamps from
pub trait Timestamp {
    /// How many of the 32 sample bits actually count (17 ..= 32)
    const COUNTER_BITS: u32;

    /// Prepares the counter; called once from `init`
    fn init();

    /// Returns the current counter value
    ///
    /// Must be cheap, reentrant and free of side effects, and monotonic
    /// modulo `2^COUNTER_BITS` between consecutive reads on the same core.
    fn sample() -> u32;

    /// Current counter frequency in Hz; recorded in the header at `init`
    fn frequency() -> u32;
}

/// Software extension of the timestamp counter to 64 bits
///
/// One instance is kept per recorder (the `recorder!` expansion owns it).
/// [`log`](Self::log) compares each fresh sample against the previous one
/// and counts rollovers in the upper half.
pub struct WideTime {
    low: AtomicU32,
    high: AtomicU32,
}

impl WideTime {
    /// Creates the zeroed shadow
    pub const fn new() -> Self {
        Self {
            low: AtomicU32::new(0),
            high: AtomicU32::new(0),
        }
    }

    /// Samples the counter, extends it, and records a `LONG_TIMESTAMP`
    /// message carrying the bits that do not fit in ordinary FMT words
    ///
    /// *Not* reentrant: all calls must come from a single serialized
    /// context, typically a periodic tick. Concurrent calls corrupt the
    /// rollover count (but nothing else).
    #[doc(hidden)]
    pub fn log<C, T>(&self, inner: &Inner<[u32]>)
    where
        C: Config,
        T: Timestamp,
    {
        // normalize the sample so the counter's top bit sits at bit 31
        let sample = T::sample() << (32 - T::COUNTER_BITS);

        let mut high = self.high.load(Ordering::Relaxed);
        if self.low.load(Ordering::Relaxed) > sample {
            // counter rolled over
            high = high.wrapping_add(1);
            self.high.store(high, Ordering::Relaxed);
        }
        self.low.store(sample, Ordering::Relaxed);

        let wide = u64::from(sample) | (u64::from(high) << 32);
        // align with the truncated timestamp field of ordinary messages:
        // the payload continues exactly where the FMT-word bits end
        let shift =
            (32 - C::FMT_ID_BITS) - 1 + C::TIMESTAMP_SHIFT + (32 - T::COUNTER_BITS);
        let upper = (wide >> shift) as u32;

        inner.msg1::<C, T>(Key::msg1(SYSTEM_FILTER, FMT_LONG_TIMESTAMP), upper);
    }
}

/// The DWT cycle counter of Cortex-M3 and later cores
///
/// `HZ` is the core clock frequency. The counter does not advance in sleep
/// modes; prefer a peripheral timer on designs that sleep.
#[cfg(cortex_m)]
pub struct Cyccnt<const HZ: u32>;

#[cfg(cortex_m)]
impl<const HZ: u32> Timestamp for Cyccnt<HZ> {
    const COUNTER_BITS: u32 = 32;

    fn init() {
        // Cortex-M MMIO registers
        const DEMCR: *mut u32 = 0xE000_EDFC as *mut u32;
        const DWT_CTRL: *mut u32 = 0xE000_1000 as *mut u32;
        const DWT_CYCCNT: *mut u32 = 0xE000_1004 as *mut u32;

        const DEMCR_TRCENA: u32 = 1 << 24;
        const DWT_CTRL_CYCCNTENA: u32 = 1;

        unsafe {
            DEMCR.write_volatile(DEMCR.read_volatile() | DEMCR_TRCENA);
            DWT_CYCCNT.write_volatile(0);
            DWT_CTRL.write_volatile(DWT_CTRL.read_volatile() | DWT_CTRL_CYCCNTENA);
        }
    }

    fn sample() -> u32 {
        const DWT_CYCCNT: *const u32 = 0xE000_1004 as *const u32;

        unsafe { DWT_CYCCNT.read_volatile() }
    }

    fn frequency() -> u32 {
        HZ
    }
}

/// A deterministic clock that counts recording calls, not time
///
/// Each sample advances the count by two, so the timestamps in a recorded
/// buffer are reproducible. Only useful for bring-up on new hardware and
/// for tests.
pub struct TickClock;

static TICKS: AtomicU32 = AtomicU32::new(0);

impl Timestamp for TickClock {
    const COUNTER_BITS: u32 = 32;

    fn init() {
        TICKS.store(0, Ordering::Relaxed);
    }

    fn sample() -> u32 {
        TICKS.fetch_add(2, Ordering::Relaxed) + 2
    }

    fn frequency() -> u32 {
        1_000_000
    }
}

/// A driver for builds that do not want timestamps; always reads 0
pub struct NullClock;

impl Timestamp for NullClock {
    const COUNTER_BITS: u32 = 32;

    fn init() {}

    fn sample() -> u32 {
        0
    }

    fn frequency() -> u32 {
        0
    }
}
