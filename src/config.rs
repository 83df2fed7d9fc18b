//! Build-time recorder configuration.
//!
//! The `recorder!` macro generates one (hidden) implementation of [`Config`]
//! from the literals in its invocation and monomorphizes the whole recording
//! engine against it, so every parameter below is folded into the generated
//! code. Hand-written implementations are possible but the associated
//! `const` assertions still apply.

use core::marker::PhantomData;

use crate::timestamp::Timestamp;

/// Size of the header that precedes the word buffer, in 32-bit words
pub const HEADER_WORDS: u32 = 6;

/// Bit 0 of the configuration word: single-shot mode is currently active
pub(crate) const SINGLE_SHOT_ACTIVE: u32 = 1;

/// Compile-time parameters of a recorder instance
///
/// Implemented by the `recorder!` expansion; not meant to be implemented by
/// hand.
pub trait Config {
    /// Capacity of the ring in 32-bit words, excluding the four-word trailer
    const BUFFER_WORDS: u32;
    /// Width of the format-ID field in the FMT word (9 ..= 16)
    const FMT_ID_BITS: u32;
    /// Longest message, in subpackets of up to five words (1 ..= 256)
    const MAX_SUBPACKETS: u32;
    /// Right shift applied to timestamp samples (1 ..= 16)
    const TIMESTAMP_SHIFT: u32;
    /// Message filtering compiled in
    const FILTERING: bool;
    /// Zero-filter lockout compiled in (re-enabling requires the sentinel)
    const FILTER_LOCKOUT: bool;
    /// Single-shot termination compiled in
    const SINGLE_SHOT: bool;
    /// 64-bit software-extended timestamps compiled in
    const LONG_TIMESTAMP: bool;
    /// Sample the timestamp after reservation instead of at function entry
    const DEFERRED_TIMESTAMP: bool;
    /// Drop oversize blob messages instead of truncating them
    const DISCARD_OVERSIZE: bool;
    /// Route `msg0` ..= `msg4` through the blob packer to shrink code
    const COMPACT: bool;

    /// Mask selecting the timestamp bits of an FMT word (bit 0 included;
    /// it is overwritten by the commit marker)
    const TIMESTAMP_MASK: u32 = !0 >> Self::FMT_ID_BITS;

    /// Hard cap on word-aligned blob messages, in bytes
    const MAX_MSG_BYTES: u32 = Self::MAX_SUBPACKETS * 16;

    /// Hard cap on byte-granular blob messages, in bytes, including the
    /// embedded length byte
    const MAX_MSGX_BYTES: u32 = if Self::MAX_SUBPACKETS > 16 {
        // the length must fit in the top byte of the last DATA word
        256
    } else {
        Self::MAX_SUBPACKETS * 16
    };

    /// The capability descriptor the host reads to parameterize decoding.
    /// Bit 0 (single-shot currently active) is merged in at run time.
    const CONFIG_WORD: u32 = ((Self::FILTERING as u32) << 1)
        | ((Self::FILTER_LOCKOUT as u32) << 2)
        | ((Self::SINGLE_SHOT as u32) << 3)
        | ((Self::LONG_TIMESTAMP as u32) << 4)
        | ((Self::TIMESTAMP_SHIFT - 1) << 8)
        | ((Self::FMT_ID_BITS - 9) << 12)
        | ((Self::MAX_SUBPACKETS & 0xFF) << 16)
        | (HEADER_WORDS << 24)
        | ((Self::BUFFER_WORDS.is_power_of_two() as u32) << 31);

    /// Evaluated once per instantiation; out-of-range parameters abort the
    /// build. The `recorder!` macro performs the same checks with nicer
    /// error spans; this is the backstop for hand-written impls.
    #[doc(hidden)]
    const VALID: () = {
        assert!(
            Self::FMT_ID_BITS >= 9 && Self::FMT_ID_BITS <= 16,
            "the format-ID field must be 9 to 16 bits wide"
        );
        assert!(
            Self::MAX_SUBPACKETS >= 1 && Self::MAX_SUBPACKETS <= 256,
            "the subpacket limit must be in the range 1..=256"
        );
        assert!(
            Self::TIMESTAMP_SHIFT >= 1 && Self::TIMESTAMP_SHIFT <= 16,
            "the timestamp shift must be in the range 1..=16"
        );
        assert!(
            Self::TIMESTAMP_SHIFT <= 31 - Self::FMT_ID_BITS,
            "the timestamp shift does not leave a timestamp field in the FMT word"
        );
        assert!(
            Self::BUFFER_WORDS >= Self::MAX_SUBPACKETS * 20,
            "the buffer must hold at least four maximal messages"
        );
        assert!(
            Self::FILTERING || !Self::SINGLE_SHOT,
            "single-shot mode requires message filtering"
        );
        assert!(
            Self::FILTERING || !Self::FILTER_LOCKOUT,
            "the filter lockout requires message filtering"
        );
    };
}

// Cross-checks between the configuration and the timestamp driver. The MSB
// of the logged timestamp must flip within one counter period or the host
// cannot detect wraps.
pub(crate) struct DriverCheck<C, T>(PhantomData<(C, T)>)
where
    C: Config,
    T: Timestamp;

impl<C, T> DriverCheck<C, T>
where
    C: Config,
    T: Timestamp,
{
    pub(crate) const OK: () = {
        assert!(
            T::COUNTER_BITS >= 17 && T::COUNTER_BITS <= 32,
            "the timestamp driver must provide 17 to 32 counter bits"
        );
        assert!(
            T::COUNTER_BITS - C::TIMESTAMP_SHIFT >= 31 - C::FMT_ID_BITS,
            "timestamp shift too large for the counter width"
        );
    };
}

/// Initialization mode for [`init`](crate::init)
///
/// The two single-shot variants are only meaningful when single-shot mode is
/// compiled in; otherwise they behave like their post-mortem counterparts
/// with a changed configuration word (which forces a buffer erase).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitMode {
    /// Keep the buffer contents if the recorder was already initialized with
    /// the same configuration (post-mortem logging continues across resets)
    Continue = 0,
    /// Enable single-shot logging; the write index restarts but the buffer
    /// is only erased if the configuration changed
    SingleShot = 1,
    /// Erase the buffer and start post-mortem logging from scratch
    Restart = 2,
    /// Enable single-shot logging and erase the buffer
    SingleShotAndErase = 3,
}

impl InitMode {
    pub(crate) fn single_shot(self) -> bool {
        self as u32 & 1 != 0
    }

    pub(crate) fn erase(self) -> bool {
        self as u32 >= InitMode::Restart as u32
    }
}
