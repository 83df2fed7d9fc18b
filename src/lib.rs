//! A reentrant, wait-free binary event recorder for ARM Cortex-M firmware
//!
//! (reentrant as in any context -- task, interrupt handler, nested interrupt
//! -- may record at any time; wait-free as in recording never blocks, spins
//! on a lock or waits for I/O; binary as in messages are packed words, not
//! text -- a host-side decoder turns them back into events using a catalog
//! of format descriptors)
//!
//! Status: ☢️ **Experimental** ☢️
//!
//! # Working principle
//!
//! Instrumentation points emit short, strongly typed records into a
//! fixed-size word ring in RAM. A record ("message") is one or more
//! *subpackets*; a subpacket is zero to four DATA words followed by one FMT
//! word that carries a commit marker, a truncated timestamp, the format ID
//! and the harvested sign bits of the DATA words. Recording is effectively
//! I/O-less: a filter check, an atomic index reservation, a handful of word
//! stores. An external host (debug probe, streaming interface, or the
//! firmware itself) harvests the buffer whenever it likes and rebuilds an
//! ordered, timestamped event stream -- including after a crash, because the
//! FMT word is always written last and erased space is recognizable.
//!
//! Nothing is without trade-offs in this life: the recorder spends RAM (the
//! ring plus a six-word header) and moves all decoding work to the host,
//! in exchange for recording costs in the tens of cycles.
//!
//! # Examples
//!
//! Application crate:
//!
//! ``` ignore
//! use weir::{timestamp::Cyccnt, InitMode};
//!
//! // This macro call can only appear *once* in the dependency graph and
//! // *must* appear if any recording API is used anywhere in the graph.
//! weir::recorder! {
//!     // core clock doubles as the timestamp counter
//!     timer: Cyccnt<80_000_000>,
//!     // ring capacity in 32-bit words (excluding the four-word trailer)
//!     words: 2048,
//!     fmt_id_bits: 10,
//!     max_subpackets: 16,
//!     timestamp_shift: 1,
//! }
//!
//! // format IDs and filter numbers normally come from a generated catalog;
//! // numeric literals are used here for brevity
//! const F_MOTOR: u32 = 1;
//! const MSG2_SETPOINT: u32 = 0x044;
//!
//! #[entry]
//! fn main() -> ! {
//!     weir::init(weir::ENABLE_ALL_FILTERS, InitMode::Restart);
//!     // ..
//!     loop {
//!         weir::msg2!(MSG2_SETPOINT, F_MOTOR, rpm, current);
//!         // ..
//!     }
//! }
//!
//! // this macro can appear in libraries
//! fn brake(force: f32) {
//!     weir::msg1!(0x046, F_MOTOR, force);
//! }
//! ```
//!
//! The host reads the header (write index, filter, configuration word,
//! timestamp frequency, filter shadow, buffer size) followed by the word
//! ring, starting at [`Recorder::as_ptr`]. Decoding is out of scope here.
//!
//! # Concurrency
//!
//! Producers only agree on the value of the write index at the moment of
//! reservation; they do not serialize the packing that follows. A producer
//! preempted between reservation and commit leaves a gap of erased words
//! that the decoder skips. Messages therefore appear in reservation order,
//! not commit order, and the host orders them by timestamp.

#![deny(missing_docs)]
#![deny(warnings)]
#![no_std]

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

mod config;
mod key;
mod record;
mod reserve;
pub mod timestamp;

pub use crate::config::{Config, InitMode, HEADER_WORDS};
pub(crate) use crate::config::{DriverCheck, SINGLE_SHOT_ACTIVE};
pub use crate::key::{Arg32, Key};

/// Declares the recorder singleton
pub use cortex_m_weir_macros::recorder;

use crate::timestamp::Timestamp;

/// Enables all 32 filter groups
pub const ENABLE_ALL_FILTERS: u32 = 0xFFFF_FFFF;

/// Re-enables all filters even after logging was stopped with a zero filter
///
/// Any other non-zero value passed to [`set_filter`] while the filter is 0
/// is silenced to 0 (the "lockout").
pub const FORCE_ENABLE_ALL_FILTERS: u32 = 0x7FFF_FFFF;

/// Erased state of the ring: the one word value that never appears as a
/// committed FMT word together with in-range DATA words
pub const ERASED: u32 = 0xFFFF_FFFF;

/// The always-on filter; carries the mandatory system messages
pub const SYSTEM_FILTER: u32 = 0;

/// System format ID: upper half of the 64-bit software-extended timestamp
pub const FMT_LONG_TIMESTAMP: u32 = 0;

/// System format ID: timestamp counter frequency announcement. The payload
/// is the raw frequency in Hz; the decoder scales it by 1e-6.
pub const FMT_TIMESTAMP_FREQUENCY: u32 = 2;

/// `LONG_TIMESTAMP` payload marking a time restart (e.g. wake from sleep);
/// tells the host not to extrapolate across it
pub const TIME_RESTART: u32 = 0xFFFF_FFFF;

// Only heterogeneous multi-core builds need real fences around filter
// manipulation; everywhere else the stores are observed in order anyway.
#[inline(always)]
pub(crate) fn data_barrier() {
    #[cfg(feature = "multicore")]
    core::sync::atomic::fence(Ordering::SeqCst);
}

/// IMPLEMENTATION DETAIL
// The in-RAM layout the host reads: a six-word header followed by the word
// ring plus its four-word trailer. `static` variables cannot refer to other
// `static mut` variables so we lie about the `Sync`-ness of the buffer cell
// to be able to keep everything in one `static` -- only the `recorder!`
// macro uses this type directly.
#[doc(hidden)]
#[repr(C)]
pub struct Inner<B>
where
    B: ?Sized,
{
    index: AtomicU32,
    filter: AtomicU32,
    config: AtomicU32,
    frequency: AtomicU32,
    filter_copy: AtomicU32,
    buffer_size: AtomicU32,
    buffer: UnsafeCell<B>,
}

unsafe impl<B> Sync for Inner<B> where B: ?Sized {}

impl<B> Inner<B> {
    // IMPLEMENTATION DETAIL
    #[doc(hidden)]
    pub const fn new(buffer: B) -> Self {
        Self {
            index: AtomicU32::new(0),
            filter: AtomicU32::new(0),
            config: AtomicU32::new(0),
            frequency: AtomicU32::new(0),
            filter_copy: AtomicU32::new(0),
            buffer_size: AtomicU32::new(0),
            buffer: UnsafeCell::new(buffer),
        }
    }
}

impl Inner<[u32]> {
    /// Initializes the recorder; see [`init`]
    #[doc(hidden)]
    pub fn init<C, T>(&self, initial_filter: u32, mode: InitMode)
    where
        C: Config,
        T: Timestamp,
    {
        // force the build-time parameter validation
        let () = C::VALID;
        let () = DriverCheck::<C, T>::OK;
        debug_assert_eq!(
            unsafe { (&*self.buffer.get()).len() },
            C::BUFFER_WORDS as usize + 4
        );

        let mut config = C::CONFIG_WORD;
        if C::SINGLE_SHOT && mode.single_shot() {
            config |= SINGLE_SHOT_ACTIVE;
            self.index.store(0, Ordering::Relaxed);
        }

        // A fingerprint mismatch means a reboot into different firmware (or
        // first boot over garbage RAM): the previous contents cannot be
        // decoded with this build's parameters, so start from erased state.
        // A matching fingerprint keeps the buffer so post-mortem logs
        // survive software resets.
        if self.config.load(Ordering::Relaxed) != config || mode.erase() {
            // nothing may be recorded while the buffer is being erased
            self.filter.store(0, Ordering::Relaxed);
            data_barrier();

            self.erase();

            if C::FILTERING && C::FILTER_LOCKOUT {
                self.filter.store(initial_filter, Ordering::Relaxed);
                self.filter_copy.store(initial_filter, Ordering::Relaxed);
            }
            self.index.store(0, Ordering::Relaxed);
        }

        self.config.store(config, Ordering::Relaxed);
        self.buffer_size.store(C::BUFFER_WORDS + 4, Ordering::Relaxed);
        self.frequency.store(T::frequency(), Ordering::Relaxed);
        T::init();

        if C::FILTER_LOCKOUT {
            self.set_filter::<C>(initial_filter);
        } else if C::FILTERING {
            self.filter.store(initial_filter, Ordering::Relaxed);
        }
    }

    /// Sets the filter mask; see [`set_filter`]
    #[doc(hidden)]
    pub fn set_filter<C>(&self, value: u32)
    where
        C: Config,
    {
        if !C::FILTERING {
            return;
        }

        let mut new_value = value;
        if C::FILTER_LOCKOUT {
            data_barrier();
            // once stopped with 0, only the sentinel re-enables logging
            if self.filter.load(Ordering::Relaxed) == 0 && new_value != FORCE_ENABLE_ALL_FILTERS {
                new_value = 0;
            }
        }

        if new_value != 0 {
            // filter #0 cannot be disabled unless all others are too
            new_value |= !FORCE_ENABLE_ALL_FILTERS;
            self.filter_copy.store(new_value, Ordering::Relaxed);
        }

        self.filter.store(new_value, Ordering::Relaxed);
        data_barrier();
    }

    /// Restores the last non-zero filter; see [`restore_filter`]
    #[doc(hidden)]
    pub fn restore_filter(&self) {
        self.filter
            .store(self.filter_copy.load(Ordering::Relaxed), Ordering::Relaxed);
        data_barrier();
    }

    /// Reads the filter mask; see [`get_filter`]
    #[doc(hidden)]
    pub fn get_filter(&self) -> u32 {
        data_barrier();
        self.filter.load(Ordering::Relaxed)
    }

    /// Announces a frequency change; see [`timestamp_frequency`]
    #[doc(hidden)]
    pub fn timestamp_frequency<C, T>(&self, hz: u32)
    where
        C: Config,
        T: Timestamp,
    {
        self.frequency.store(hz, Ordering::Relaxed);
        self.msg1::<C, T>(Key::msg1(SYSTEM_FILTER, FMT_TIMESTAMP_FREQUENCY), hz);
    }

    // Erase to all-ones, word by word through a volatile pointer so the
    // compiler cannot turn the loop into a byte-wise memset (slow on many
    // embedded libc implementations, and the buffer must never hold a
    // half-erased word pattern).
    fn erase(&self) {
        let words = unsafe { (&*self.buffer.get()).len() };
        let base = self.buffer.get() as *mut u32;
        let mut i = words;
        while i > 0 {
            i -= 1;
            unsafe { base.add(i).write_volatile(ERASED) }
        }
    }
}

/// A read-only handle on the recorder, for transferring the buffer to a host
// NOTE same layout as `&Inner<[u32]>` due to `#[repr(transparent)]`
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Recorder {
    inner: &'static Inner<[u32]>,
}

impl Recorder {
    /// Gets the handle on the recorder singleton
    #[inline]
    pub fn get() -> Self {
        extern "Rust" {
            fn __weir_recorder() -> &'static Inner<[u32]>;
        }

        Recorder {
            inner: unsafe { __weir_recorder() },
        }
    }

    /// The next word the engine will write, in `[0, capacity)` except while
    /// a subpacket sits in the trailer
    pub fn write_index(&self) -> u32 {
        self.inner.index.load(Ordering::Relaxed)
    }

    /// The current filter mask
    pub fn filter(&self) -> u32 {
        self.inner.filter.load(Ordering::Relaxed)
    }

    /// The packed capability/configuration word the host uses to
    /// parameterize decoding
    pub fn config_word(&self) -> u32 {
        self.inner.config.load(Ordering::Relaxed)
    }

    /// The last announced timestamp counter frequency, in Hz
    pub fn timestamp_hz(&self) -> u32 {
        self.inner.frequency.load(Ordering::Relaxed)
    }

    /// Total size of the region a host must read: header plus buffer plus
    /// trailer, in 32-bit words
    pub fn len_words(&self) -> usize {
        let buffer = unsafe { (&*self.inner.buffer.get()).len() };
        HEADER_WORDS as usize + buffer
    }

    /// Start of the region: the header words, immediately followed by the
    /// word ring
    ///
    /// Reading the buffer while producers are active yields torn messages;
    /// that is the same contract a debug probe gets, and the erased/commit
    /// encoding lets a decoder recover a self-consistent suffix.
    pub fn as_ptr(&self) -> *const u32 {
        self.inner as *const Inner<[u32]> as *const u32
    }
}

/// Initializes the recorder singleton
///
/// Must be called (once) before any recording; messages sent before
/// initialization are dropped because the filter mask starts at 0. In
/// multi-threaded systems no thread may enable the filter until this
/// function returns.
///
/// If the configuration fingerprint stored in RAM matches this build, the
/// buffer contents survive (post-mortem logs outlive software resets);
/// otherwise, and for the erasing [`InitMode`]s, the whole ring is erased.
#[inline]
pub fn init(initial_filter: u32, mode: InitMode) {
    extern "Rust" {
        fn __weir_init(initial_filter: u32, mode: InitMode);
    }

    unsafe { __weir_init(initial_filter, mode) }
}

/// Sets the message filter mask
///
/// Bit 31 admits filter group #0, bit 30 group #1, and so on. Passing 0
/// stops all logging; once stopped, only [`FORCE_ENABLE_ALL_FILTERS`]
/// re-enables it (other values are silenced to 0). Whenever any group is
/// enabled, group #0 is forced on, and the resulting mask is remembered for
/// [`restore_filter`].
#[inline]
pub fn set_filter(filter: u32) {
    extern "Rust" {
        fn __weir_set_filter(filter: u32);
    }

    unsafe { __weir_set_filter(filter) }
}

/// Restores the filter mask last set to a non-zero value by the firmware
#[inline]
pub fn restore_filter() {
    extern "Rust" {
        fn __weir_restore_filter();
    }

    unsafe { __weir_restore_filter() }
}

/// Reads the current filter mask (0 = logging fully suppressed)
#[inline]
pub fn get_filter() -> u32 {
    extern "Rust" {
        fn __weir_get_filter() -> u32;
    }

    unsafe { __weir_get_filter() }
}

/// Records the new timestamp counter frequency in the header and as a
/// message, so the host can convert timestamps on both sides of the change
///
/// Call after changing the timer frequency (or the core clock, if that is
/// the timestamp source).
#[inline]
pub fn timestamp_frequency(hz: u32) {
    extern "Rust" {
        fn __weir_timestamp_frequency(hz: u32);
    }

    unsafe { __weir_timestamp_frequency(hz) }
}

/// Samples and extends the 64-bit timestamp and records its upper half
///
/// Call periodically -- at least once per counter wrap -- from a *single*
/// serialized context (e.g. a timer interrupt). Does nothing in builds
/// without long timestamps.
#[inline]
pub fn long_timestamp() {
    extern "Rust" {
        fn __weir_long_timestamp();
    }

    unsafe { __weir_long_timestamp() }
}

/// Marks a restart of time measurement (e.g. after waking from sleep) so
/// the host does not extrapolate previous timestamps across the gap
#[inline]
pub fn restart_timing() {
    msg1(Key::msg1(SYSTEM_FILTER, FMT_LONG_TIMESTAMP), TIME_RESTART)
}

/// Records a message with no data: timestamp and format only
#[inline]
pub fn msg0(key: Key) {
    extern "Rust" {
        fn __weir_msg0(key: Key);
    }

    unsafe { __weir_msg0(key) }
}

/// Records a message carrying one 32-bit value
#[inline]
pub fn msg1(key: Key, data1: impl Arg32) {
    extern "Rust" {
        fn __weir_msg1(key: Key, data1: u32);
    }

    unsafe { __weir_msg1(key, data1.into_u32()) }
}

/// Records a message carrying two 32-bit values
#[inline]
pub fn msg2(key: Key, data1: impl Arg32, data2: impl Arg32) {
    extern "Rust" {
        fn __weir_msg2(key: Key, data1: u32, data2: u32);
    }

    unsafe { __weir_msg2(key, data1.into_u32(), data2.into_u32()) }
}

/// Records a message carrying three 32-bit values
#[inline]
pub fn msg3(key: Key, data1: impl Arg32, data2: impl Arg32, data3: impl Arg32) {
    extern "Rust" {
        fn __weir_msg3(key: Key, data1: u32, data2: u32, data3: u32);
    }

    unsafe { __weir_msg3(key, data1.into_u32(), data2.into_u32(), data3.into_u32()) }
}

/// Records a message carrying four 32-bit values
#[inline]
pub fn msg4(key: Key, data1: impl Arg32, data2: impl Arg32, data3: impl Arg32, data4: impl Arg32) {
    extern "Rust" {
        fn __weir_msg4(key: Key, data1: u32, data2: u32, data3: u32, data4: u32);
    }

    unsafe {
        __weir_msg4(
            key,
            data1.into_u32(),
            data2.into_u32(),
            data3.into_u32(),
            data4.into_u32(),
        )
    }
}

/// Records a blob as whole words (length up to `max_subpackets * 16` bytes;
/// oversize blobs are dropped or truncated per the build)
#[inline]
pub fn msgn(key: Key, data: &[u8]) {
    extern "Rust" {
        fn __weir_msgn(key: Key, data: &[u8]);
    }

    unsafe { __weir_msgn(key, data) }
}

/// Records a byte-granular blob with its length embedded in the message
/// (length up to `min(255, max_subpackets * 16 - 1)` bytes)
#[inline]
pub fn msgx(key: Key, data: &[u8]) {
    extern "Rust" {
        fn __weir_msgx(key: Key, data: &[u8]);
    }

    unsafe { __weir_msgx(key, data) }
}

/// Records the bytes of `s` up to (not including) its first NUL byte
///
/// If the resulting length is divisible by four no trailing NUL reaches the
/// buffer; otherwise the last word is padded with zeros.
#[inline]
pub fn string(key: Key, s: &[u8]) {
    stringn(key, s, u32::max_value())
}

/// Like [`string`] but scans at most `max_length` bytes
#[inline]
pub fn stringn(key: Key, s: &[u8], max_length: u32) {
    extern "Rust" {
        fn __weir_stringn(key: Key, s: &[u8], max_length: u32);
    }

    unsafe { __weir_stringn(key, s, max_length) }
}

/// Records a message with no data; the key is packed and validated at
/// compile time
///
/// `$fmt` and `$filter` must be constant expressions.
#[macro_export]
macro_rules! msg0 {
    ($fmt:expr, $filter:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::msg0($filter, $fmt);
        $crate::msg0(KEY)
    }};
}

/// Records one 32-bit value; the key is packed and validated at compile
/// time (the format ID's lowest bit must be 0)
#[macro_export]
macro_rules! msg1 {
    ($fmt:expr, $filter:expr, $d1:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::msg1($filter, $fmt);
        $crate::msg1(KEY, $d1)
    }};
}

/// Records two 32-bit values; the key is packed and validated at compile
/// time (the format ID's two lowest bits must be 0)
#[macro_export]
macro_rules! msg2 {
    ($fmt:expr, $filter:expr, $d1:expr, $d2:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::msg2($filter, $fmt);
        $crate::msg2(KEY, $d1, $d2)
    }};
}

/// Records three 32-bit values; the key is packed and validated at compile
/// time (the format ID's three lowest bits must be 0)
#[macro_export]
macro_rules! msg3 {
    ($fmt:expr, $filter:expr, $d1:expr, $d2:expr, $d3:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::msg3($filter, $fmt);
        $crate::msg3(KEY, $d1, $d2, $d3)
    }};
}

/// Records four 32-bit values; the key is packed and validated at compile
/// time (the format ID's four lowest bits must be 0)
#[macro_export]
macro_rules! msg4 {
    ($fmt:expr, $filter:expr, $d1:expr, $d2:expr, $d3:expr, $d4:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::msg4($filter, $fmt);
        $crate::msg4(KEY, $d1, $d2, $d3, $d4)
    }};
}

/// Records a message with no data plus `$bits` bits of run-time extended
/// data packed into the low bits of the format-ID field
#[macro_export]
macro_rules! ext_msg0 {
    ($fmt:expr, $filter:expr, $ext:expr, $bits:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::ext_base($filter, $fmt, $bits, 0);
        $crate::msg0(KEY.with_ext($ext, $bits, 0))
    }};
}

/// Records one 32-bit value plus `$bits` bits of run-time extended data
#[macro_export]
macro_rules! ext_msg1 {
    ($fmt:expr, $filter:expr, $d1:expr, $ext:expr, $bits:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::ext_base($filter, $fmt, $bits, 1);
        $crate::msg1(KEY.with_ext($ext, $bits, 1), $d1)
    }};
}

/// Records two 32-bit values plus `$bits` bits of run-time extended data
#[macro_export]
macro_rules! ext_msg2 {
    ($fmt:expr, $filter:expr, $d1:expr, $d2:expr, $ext:expr, $bits:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::ext_base($filter, $fmt, $bits, 2);
        $crate::msg2(KEY.with_ext($ext, $bits, 2), $d1, $d2)
    }};
}

/// Records three 32-bit values plus `$bits` bits of run-time extended data
#[macro_export]
macro_rules! ext_msg3 {
    ($fmt:expr, $filter:expr, $d1:expr, $d2:expr, $d3:expr, $ext:expr, $bits:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::ext_base($filter, $fmt, $bits, 3);
        $crate::msg3(KEY.with_ext($ext, $bits, 3), $d1, $d2, $d3)
    }};
}

/// Records four 32-bit values plus `$bits` bits of run-time extended data
#[macro_export]
macro_rules! ext_msg4 {
    ($fmt:expr, $filter:expr, $d1:expr, $d2:expr, $d3:expr, $d4:expr, $ext:expr, $bits:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::ext_base($filter, $fmt, $bits, 4);
        $crate::msg4(KEY.with_ext($ext, $bits, 4), $d1, $d2, $d3, $d4)
    }};
}

/// Records a word-aligned blob; the key is packed and validated at compile
/// time (the format ID's four lowest bits must be 0)
#[macro_export]
macro_rules! msgn {
    ($fmt:expr, $filter:expr, $data:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::blob($filter, $fmt);
        $crate::msgn(KEY, $data)
    }};
}

/// Records a byte-granular blob with embedded length; the key is packed and
/// validated at compile time (the format ID's four lowest bits must be 0)
#[macro_export]
macro_rules! msgx {
    ($fmt:expr, $filter:expr, $data:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::blob($filter, $fmt);
        $crate::msgx(KEY, $data)
    }};
}

/// Records a NUL-terminated string; the key is packed and validated at
/// compile time
#[macro_export]
macro_rules! string {
    ($fmt:expr, $filter:expr, $s:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::blob($filter, $fmt);
        $crate::string(KEY, $s)
    }};
}

/// Like [`string!`] but scans at most `$cap` bytes
#[macro_export]
macro_rules! stringn {
    ($fmt:expr, $filter:expr, $s:expr, $cap:expr $(,)?) => {{
        const KEY: $crate::Key = $crate::Key::blob($filter, $fmt);
        $crate::stringn(KEY, $s, $cap)
    }};
}

#[cfg(test)]
pub(crate) mod testutil {
    use core::ptr;

    use crate::config::Config;
    use crate::timestamp::Timestamp;
    use crate::Inner;

    // a typical mid-size configuration
    pub(crate) struct Cfg2048;

    impl Config for Cfg2048 {
        const BUFFER_WORDS: u32 = 2048;
        const FMT_ID_BITS: u32 = 10;
        const MAX_SUBPACKETS: u32 = 16;
        const TIMESTAMP_SHIFT: u32 = 1;
        const FILTERING: bool = true;
        const FILTER_LOCKOUT: bool = true;
        const SINGLE_SHOT: bool = false;
        const LONG_TIMESTAMP: bool = true;
        const DEFERRED_TIMESTAMP: bool = true;
        const DISCARD_OVERSIZE: bool = true;
        const COMPACT: bool = false;
    }

    pub(crate) struct Compact2048;

    impl Config for Compact2048 {
        const BUFFER_WORDS: u32 = 2048;
        const FMT_ID_BITS: u32 = 10;
        const MAX_SUBPACKETS: u32 = 16;
        const TIMESTAMP_SHIFT: u32 = 1;
        const FILTERING: bool = true;
        const FILTER_LOCKOUT: bool = true;
        const SINGLE_SHOT: bool = false;
        const LONG_TIMESTAMP: bool = true;
        const DEFERRED_TIMESTAMP: bool = true;
        const DISCARD_OVERSIZE: bool = true;
        const COMPACT: bool = true;
    }

    pub(crate) struct Truncating;

    impl Config for Truncating {
        const BUFFER_WORDS: u32 = 2048;
        const FMT_ID_BITS: u32 = 10;
        const MAX_SUBPACKETS: u32 = 16;
        const TIMESTAMP_SHIFT: u32 = 1;
        const FILTERING: bool = true;
        const FILTER_LOCKOUT: bool = true;
        const SINGLE_SHOT: bool = false;
        const LONG_TIMESTAMP: bool = true;
        const DEFERRED_TIMESTAMP: bool = true;
        const DISCARD_OVERSIZE: bool = false;
        const COMPACT: bool = false;
    }

    // a tiny ring for wrap tests
    pub(crate) struct Cfg64;

    impl Config for Cfg64 {
        const BUFFER_WORDS: u32 = 64;
        const FMT_ID_BITS: u32 = 10;
        const MAX_SUBPACKETS: u32 = 3;
        const TIMESTAMP_SHIFT: u32 = 1;
        const FILTERING: bool = true;
        const FILTER_LOCKOUT: bool = true;
        const SINGLE_SHOT: bool = false;
        const LONG_TIMESTAMP: bool = false;
        const DEFERRED_TIMESTAMP: bool = true;
        const DISCARD_OVERSIZE: bool = true;
        const COMPACT: bool = false;
    }

    pub(crate) struct SmallShot;

    impl Config for SmallShot {
        const BUFFER_WORDS: u32 = 64;
        const FMT_ID_BITS: u32 = 10;
        const MAX_SUBPACKETS: u32 = 3;
        const TIMESTAMP_SHIFT: u32 = 1;
        const FILTERING: bool = true;
        const FILTER_LOCKOUT: bool = true;
        const SINGLE_SHOT: bool = true;
        const LONG_TIMESTAMP: bool = false;
        const DEFERRED_TIMESTAMP: bool = true;
        const DISCARD_OVERSIZE: bool = true;
        const COMPACT: bool = false;
    }

    // a clock stuck at `SAMPLE`; sidesteps shared statics so tests can run
    // in parallel
    pub(crate) struct Always<const SAMPLE: u32>;

    impl<const SAMPLE: u32> Timestamp for Always<SAMPLE> {
        const COUNTER_BITS: u32 = 32;

        fn init() {}

        fn sample() -> u32 {
            SAMPLE
        }

        fn frequency() -> u32 {
            1_000_000
        }
    }

    pub(crate) fn word(inner: &Inner<[u32]>, index: u32) -> u32 {
        unsafe { ptr::read((inner.buffer.get() as *const u32).add(index as usize)) }
    }
}

#[cfg(test)]
#[cfg(not(any(feature = "irq-reservation", feature = "unsync-reservation")))]
mod tests {
    use core::sync::atomic::Ordering;

    use crate::config::Config;
    use crate::testutil::{word, Always, Cfg2048, Cfg64, SmallShot};
    use crate::{
        InitMode, Inner, Key, ERASED, FMT_TIMESTAMP_FREQUENCY, FORCE_ENABLE_ALL_FILTERS,
        SINGLE_SHOT_ACTIVE,
    };

    #[test]
    fn header_is_six_words() {
        // the host contract: six words of header immediately followed by
        // the word ring
        assert_eq!(
            core::mem::size_of::<Inner<[u32; 0]>>(),
            4 * crate::HEADER_WORDS as usize
        );
    }

    #[test]
    fn filter_lockout() {
        static INNER: Inner<[u32; 2048 + 4]> = Inner::new([0; 2048 + 4]);

        let inner: &Inner<[u32]> = &INNER;

        inner.set_filter::<Cfg2048>(0);
        assert_eq!(inner.get_filter(), 0);

        // ordinary values cannot leave the locked-out state
        inner.set_filter::<Cfg2048>(0x0000_FFFF);
        assert_eq!(inner.get_filter(), 0);

        // the sentinel can; it enables everything including bit 31
        inner.set_filter::<Cfg2048>(FORCE_ENABLE_ALL_FILTERS);
        assert_eq!(inner.get_filter(), 0xFFFF_FFFF);

        // once unlocked, any value works, with filter #0 forced on
        inner.set_filter::<Cfg2048>(0x0000_FFFF);
        assert_eq!(inner.get_filter(), 0x8000_FFFF);
    }

    #[test]
    fn restore_brings_back_the_last_non_zero_filter() {
        static INNER: Inner<[u32; 2048 + 4]> = Inner::new([0; 2048 + 4]);

        let inner: &Inner<[u32]> = &INNER;

        inner.set_filter::<Cfg2048>(FORCE_ENABLE_ALL_FILTERS);
        inner.set_filter::<Cfg2048>(0x00FF_0000);
        assert_eq!(inner.get_filter(), 0x80FF_0000);

        inner.set_filter::<Cfg2048>(0);
        assert_eq!(inner.get_filter(), 0);

        inner.restore_filter();
        assert_eq!(inner.get_filter(), 0x80FF_0000);
    }

    #[test]
    fn init_erases_when_the_fingerprint_does_not_match() {
        static INNER: Inner<[u32; 64 + 4]> = Inner::new([0; 64 + 4]);

        let inner: &Inner<[u32]> = &INNER;
        // a fresh (zeroed) header never matches a real configuration word
        inner.init::<Cfg64, Always<7>>(0x4000_0000, InitMode::Continue);

        for i in 0..68 {
            assert_eq!(word(inner, i), ERASED);
        }
        assert_eq!(inner.config.load(Ordering::Relaxed), Cfg64::CONFIG_WORD);
        assert_eq!(inner.buffer_size.load(Ordering::Relaxed), 68);
        assert_eq!(inner.frequency.load(Ordering::Relaxed), 1_000_000);
        // initial filter applied, filter #0 forced on
        assert_eq!(inner.get_filter(), 0xC000_0000);
    }

    #[test]
    fn init_continue_preserves_a_matching_buffer() {
        static INNER: Inner<[u32; 64 + 4]> = Inner::new([0; 64 + 4]);

        let inner: &Inner<[u32]> = &INNER;
        inner.init::<Cfg64, Always<7>>(FORCE_ENABLE_ALL_FILTERS, InitMode::Continue);

        inner.msg1::<Cfg64, Always<7>>(Key::msg1(1, 0x010), 0xAB);
        let index = inner.index.load(Ordering::Relaxed);
        let committed = word(inner, 0);

        inner.init::<Cfg64, Always<7>>(FORCE_ENABLE_ALL_FILTERS, InitMode::Continue);
        assert_eq!(inner.index.load(Ordering::Relaxed), index);
        assert_eq!(word(inner, 0), committed);

        // an explicit restart does erase
        inner.init::<Cfg64, Always<7>>(FORCE_ENABLE_ALL_FILTERS, InitMode::Restart);
        assert_eq!(inner.index.load(Ordering::Relaxed), 0);
        assert_eq!(word(inner, 0), ERASED);
    }

    #[test]
    fn switching_modes_changes_the_fingerprint_and_erases() {
        static INNER: Inner<[u32; 64 + 4]> = Inner::new([0; 64 + 4]);

        let inner: &Inner<[u32]> = &INNER;
        inner.init::<SmallShot, Always<7>>(FORCE_ENABLE_ALL_FILTERS, InitMode::Continue);
        inner.msg0::<SmallShot, Always<7>>(Key::msg0(1, 0x010));
        assert_ne!(word(inner, 0), ERASED);

        inner.init::<SmallShot, Always<7>>(FORCE_ENABLE_ALL_FILTERS, InitMode::SingleShot);
        assert_eq!(word(inner, 0), ERASED);
        assert_eq!(
            inner.config.load(Ordering::Relaxed),
            SmallShot::CONFIG_WORD | SINGLE_SHOT_ACTIVE
        );
    }

    #[test]
    fn single_shot_freezes_the_buffer_when_full() {
        static INNER: Inner<[u32; 64 + 4]> = Inner::new([0; 64 + 4]);

        let inner: &Inner<[u32]> = &INNER;
        inner.init::<SmallShot, Always<7>>(FORCE_ENABLE_ALL_FILTERS, InitMode::SingleShotAndErase);

        // 12 five-word messages fill 60 of the 64 words
        for i in 0..12 {
            inner.msg4::<SmallShot, Always<7>>(Key::msg4(1, 0x010), i, i, i, i);
        }
        assert_eq!(inner.index.load(Ordering::Relaxed), 60);

        // the next one does not fit: dropped, logging stopped, index frozen
        inner.msg4::<SmallShot, Always<7>>(Key::msg4(1, 0x010), 99, 99, 99, 99);
        assert_eq!(inner.index.load(Ordering::Relaxed), 60);
        assert_eq!(inner.get_filter(), 0);

        // and everything after it is gated off
        inner.msg0::<SmallShot, Always<7>>(Key::msg0(1, 0x010));
        assert_eq!(inner.index.load(Ordering::Relaxed), 60);
    }

    #[test]
    fn frequency_change_is_recorded_as_a_message() {
        static INNER: Inner<[u32; 2048 + 4]> = Inner::new([0; 2048 + 4]);

        let inner: &Inner<[u32]> = &INNER;
        inner.init::<Cfg2048, Always<7>>(FORCE_ENABLE_ALL_FILTERS, InitMode::Restart);

        inner.timestamp_frequency::<Cfg2048, Always<7>>(48_000_000);

        assert_eq!(inner.frequency.load(Ordering::Relaxed), 48_000_000);
        assert_eq!(inner.index.load(Ordering::Relaxed), 2);
        // payload: the raw frequency, sign bit harvested
        assert_eq!(word(inner, 0), 48_000_000 & 0x7FFF_FFFF);
        let fmt = word(inner, 1);
        assert_eq!(fmt & 1, 1);
        assert_eq!(fmt >> 22, FMT_TIMESTAMP_FREQUENCY);
    }
}
