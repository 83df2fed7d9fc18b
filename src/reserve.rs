//! Buffer space reservation.
//!
//! `write_index` is the only serialization point between producers. A
//! reservation atomically advances it by the subpacket count of the message
//! and hands the caller the pre-advance index, wrapped into the buffer. The
//! stored index is left unwrapped when a subpacket runs into the trailer;
//! the *next* reservation wraps it to 0, so one subpacket may straddle the
//! end of the ring (that is what the four trailer words are for).
//!
//! Three strategies, selected at build time to match the target CPU:
//!
//! - default: a CAS loop, wait-free up to contention among producers.
//!   `Relaxed` on a single core; with the `multicore` feature the CAS is
//!   `SeqCst` and a `Release` fence follows a successful reservation so
//!   other cores observe the index before the subsequent DATA stores.
//! - `irq-reservation`: a PRIMASK critical section around the plain
//!   read-modify-write, for cores without exclusive-access primitives.
//! - `unsync-reservation`: plain load/store; the caller guarantees that no
//!   two recording calls overlap.

use core::sync::atomic::Ordering;

use crate::{config::Config, Inner, SINGLE_SHOT_ACTIVE};

#[cfg(all(feature = "irq-reservation", feature = "unsync-reservation"))]
compile_error!(
    "`irq-reservation` and `unsync-reservation` are mutually exclusive; pick one strategy"
);

#[cfg(all(
    feature = "multicore",
    any(feature = "irq-reservation", feature = "unsync-reservation")
))]
compile_error!("`multicore` requires the default (exclusive-access) reservation strategy");

impl Inner<[u32]> {
    // Single-shot refusal: the first message that would not fit in the
    // remaining space stops all logging and is dropped. No exclusive-access
    // monitor needs clearing on this early exit; the compare-exchange below
    // is a single operation.
    #[inline(always)]
    fn refused<C>(&self, index: u32, words: u32) -> bool
    where
        C: Config,
    {
        if C::SINGLE_SHOT
            && self.config.load(Ordering::Relaxed) & SINGLE_SHOT_ACTIVE != 0
            && index + words >= C::BUFFER_WORDS
        {
            self.filter.store(0, Ordering::Relaxed);
            return true;
        }

        false
    }

    /// Advances the write index by `words` and returns the wrapped
    /// pre-advance index, or `None` if single-shot mode refused the message
    #[cfg(not(any(feature = "irq-reservation", feature = "unsync-reservation")))]
    pub(crate) fn reserve<C>(&self, words: u32) -> Option<u32>
    where
        C: Config,
    {
        const ORDER: Ordering = if cfg!(feature = "multicore") {
            Ordering::SeqCst
        } else {
            Ordering::Relaxed
        };

        loop {
            let current = self.index.load(ORDER);

            if self.refused::<C>(current, words) {
                return None;
            }

            let index = if current >= C::BUFFER_WORDS { 0 } else { current };

            if self
                .index
                .compare_exchange_weak(current, index + words, ORDER, ORDER)
                .is_ok()
            {
                #[cfg(feature = "multicore")]
                core::sync::atomic::fence(Ordering::Release);

                return Some(index);
            }
        }
    }

    /// Advances the write index by `words` inside a PRIMASK critical
    /// section and returns the wrapped pre-advance index, or `None` if
    /// single-shot mode refused the message
    ///
    /// Interrupts are masked only for the read-modify-write of the index.
    /// Has no effect in unprivileged code; such tasks must not record.
    #[cfg(feature = "irq-reservation")]
    pub(crate) fn reserve<C>(&self, words: u32) -> Option<u32>
    where
        C: Config,
    {
        cortex_m::interrupt::free(|_| {
            let current = self.index.load(Ordering::Relaxed);

            if self.refused::<C>(current, words) {
                return None;
            }

            let index = if current >= C::BUFFER_WORDS { 0 } else { current };
            self.index.store(index + words, Ordering::Relaxed);

            Some(index)
        })
    }

    /// Advances the write index by `words` with plain loads and stores and
    /// returns the wrapped pre-advance index, or `None` if single-shot mode
    /// refused the message
    ///
    /// The caller guarantees that recording calls never overlap.
    #[cfg(all(feature = "unsync-reservation", not(feature = "irq-reservation")))]
    pub(crate) fn reserve<C>(&self, words: u32) -> Option<u32>
    where
        C: Config,
    {
        let current = self.index.load(Ordering::Relaxed);

        if self.refused::<C>(current, words) {
            return None;
        }

        let index = if current >= C::BUFFER_WORDS { 0 } else { current };
        self.index.store(index + words, Ordering::Relaxed);

        Some(index)
    }
}
