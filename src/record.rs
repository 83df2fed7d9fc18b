//! The recording hot path: admission gate, packing, FMT-word commit.
//!
//! Every entry point follows the same sequence: read the timestamp (here or
//! after reservation, per the build), test the filter gate, reserve space,
//! store the DATA words with their sign bits cleared, and publish the
//! subpacket by storing the FMT word last. Bit 0 of a committed FMT word is
//! always 1 and DATA words always have bit 31 clear, which is how a passive
//! reader tells commits from erased or torn slots.
//!
//! The sign bit of DATA word *i* is harvested into bit *i* of the low end
//! of the FMT word's format field; the alignment rules enforced by [`Key`]
//! guarantee those positions are free.

use core::sync::atomic::{self, Ordering};
use core::{cmp, ptr};

use crate::config::Config;
use crate::key::Key;
use crate::timestamp::Timestamp;
use crate::Inner;

/// DATA words carry 31 payload bits; bit 31 lives in the FMT word
const DATA_MASK: u32 = 0x7FFF_FFFF;

/// Commit marker: bit 0 of every FMT word
const COMMIT: u32 = 1;

// Orders the DATA stores before the FMT store. On a single core a compiler
// fence is enough (an interrupted producer is observed by code on the same
// core); across cores with private caches a real fence is required.
#[inline(always)]
fn commit_fence() {
    #[cfg(feature = "multicore")]
    atomic::fence(Ordering::Release);
    #[cfg(not(feature = "multicore"))]
    atomic::compiler_fence(Ordering::Release);
}

// Assembles a word from up to four bytes, zero-padding the tail.
#[inline(always)]
fn pad_word(bytes: &[u8]) -> u32 {
    let mut word = [0; 4];
    word[..bytes.len()].copy_from_slice(bytes);
    u32::from_ne_bytes(word)
}

impl Inner<[u32]> {
    // NOTE reservations guarantee `index + subpacket len` stays within the
    // buffer plus its four-word trailer, so the pointer arithmetic below
    // never leaves the allocation. Raw pointers instead of slices to avoid
    // panicking branches in the hot path.
    #[inline(always)]
    fn slot(&self, index: u32) -> *mut u32 {
        unsafe { (self.buffer.get() as *mut u32).add(index as usize) }
    }

    #[inline(always)]
    fn timestamp<C, T>() -> u32
    where
        C: Config,
        T: Timestamp,
    {
        (T::sample() >> (C::TIMESTAMP_SHIFT - 1)) & C::TIMESTAMP_MASK
    }

    // The admission gate. Relaxed load: admission is best effort and a
    // racing filter change may lose one message on either side.
    #[inline(always)]
    fn disabled<C>(&self, key: Key) -> bool
    where
        C: Config,
    {
        if !C::FILTERING {
            return false;
        }

        let filter = self.filter.load(Ordering::Relaxed);
        ((filter << key.filter_number()) as i32) >= 0
    }

    // Format field of the FMT word: the format ID narrowed to the
    // configured width, with the harvested sign bits in its low end.
    #[inline(always)]
    fn fmt_field<C>(key: Key, harvested: u32) -> u32
    where
        C: Config,
    {
        ((key.format() & ((1 << C::FMT_ID_BITS) - 1)) | harvested) << (32 - C::FMT_ID_BITS)
    }

    /// Records a subpacket with no DATA words: timestamp and format only
    pub fn msg0<C, T>(&self, key: Key)
    where
        C: Config,
        T: Timestamp,
    {
        if C::COMPACT {
            return self.compact::<C, T>(key, &[]);
        }

        let mut timestamp = if C::DEFERRED_TIMESTAMP {
            0
        } else {
            Self::timestamp::<C, T>()
        };

        if self.disabled::<C>(key) {
            return;
        }

        let index = match self.reserve::<C>(1) {
            Some(index) => index,
            None => return,
        };

        if C::DEFERRED_TIMESTAMP {
            timestamp = Self::timestamp::<C, T>();
        }

        unsafe {
            ptr::write(
                self.slot(index),
                timestamp | COMMIT | Self::fmt_field::<C>(key, 0),
            );
        }
    }

    /// Records one DATA word plus the FMT word
    pub fn msg1<C, T>(&self, key: Key, data1: u32)
    where
        C: Config,
        T: Timestamp,
    {
        if C::COMPACT {
            return self.compact::<C, T>(key, &[data1]);
        }

        let mut timestamp = if C::DEFERRED_TIMESTAMP {
            0
        } else {
            Self::timestamp::<C, T>()
        };

        if self.disabled::<C>(key) {
            return;
        }

        let index = match self.reserve::<C>(2) {
            Some(index) => index,
            None => return,
        };

        let slot = self.slot(index);
        unsafe {
            ptr::write(slot, data1 & DATA_MASK);
        }
        let harvested = data1 >> 31;

        if C::DEFERRED_TIMESTAMP {
            timestamp = Self::timestamp::<C, T>();
        }

        commit_fence();
        unsafe {
            ptr::write(
                slot.add(1),
                timestamp | COMMIT | Self::fmt_field::<C>(key, harvested),
            );
        }
    }

    /// Records two DATA words plus the FMT word
    pub fn msg2<C, T>(&self, key: Key, data1: u32, data2: u32)
    where
        C: Config,
        T: Timestamp,
    {
        if C::COMPACT {
            return self.compact::<C, T>(key, &[data1, data2]);
        }

        let mut timestamp = if C::DEFERRED_TIMESTAMP {
            0
        } else {
            Self::timestamp::<C, T>()
        };

        if self.disabled::<C>(key) {
            return;
        }

        let index = match self.reserve::<C>(3) {
            Some(index) => index,
            None => return,
        };

        let slot = self.slot(index);
        let mut harvested = data1 >> 31;
        unsafe {
            ptr::write(slot, data1 & DATA_MASK);
            ptr::write(slot.add(1), data2 & DATA_MASK);
        }
        harvested |= (data2 >> 31) << 1;

        if C::DEFERRED_TIMESTAMP {
            timestamp = Self::timestamp::<C, T>();
        }

        commit_fence();
        unsafe {
            ptr::write(
                slot.add(2),
                timestamp | COMMIT | Self::fmt_field::<C>(key, harvested),
            );
        }
    }

    /// Records three DATA words plus the FMT word
    pub fn msg3<C, T>(&self, key: Key, data1: u32, data2: u32, data3: u32)
    where
        C: Config,
        T: Timestamp,
    {
        if C::COMPACT {
            return self.compact::<C, T>(key, &[data1, data2, data3]);
        }

        let mut timestamp = if C::DEFERRED_TIMESTAMP {
            0
        } else {
            Self::timestamp::<C, T>()
        };

        if self.disabled::<C>(key) {
            return;
        }

        let index = match self.reserve::<C>(4) {
            Some(index) => index,
            None => return,
        };

        let slot = self.slot(index);
        let mut harvested = data1 >> 31;
        unsafe {
            ptr::write(slot, data1 & DATA_MASK);
            ptr::write(slot.add(1), data2 & DATA_MASK);
            ptr::write(slot.add(2), data3 & DATA_MASK);
        }
        harvested |= (data2 >> 31) << 1;
        harvested |= (data3 >> 31) << 2;

        if C::DEFERRED_TIMESTAMP {
            timestamp = Self::timestamp::<C, T>();
        }

        commit_fence();
        unsafe {
            ptr::write(
                slot.add(3),
                timestamp | COMMIT | Self::fmt_field::<C>(key, harvested),
            );
        }
    }

    /// Records four DATA words plus the FMT word
    pub fn msg4<C, T>(&self, key: Key, data1: u32, data2: u32, data3: u32, data4: u32)
    where
        C: Config,
        T: Timestamp,
    {
        if C::COMPACT {
            return self.compact::<C, T>(key, &[data1, data2, data3, data4]);
        }

        let mut timestamp = if C::DEFERRED_TIMESTAMP {
            0
        } else {
            Self::timestamp::<C, T>()
        };

        if self.disabled::<C>(key) {
            return;
        }

        let index = match self.reserve::<C>(5) {
            Some(index) => index,
            None => return,
        };

        let slot = self.slot(index);
        let mut harvested = data1 >> 31;
        unsafe {
            ptr::write(slot, data1 & DATA_MASK);
            ptr::write(slot.add(1), data2 & DATA_MASK);
            ptr::write(slot.add(2), data3 & DATA_MASK);
            ptr::write(slot.add(3), data4 & DATA_MASK);
        }
        harvested |= (data2 >> 31) << 1;
        harvested |= (data3 >> 31) << 2;
        harvested |= (data4 >> 31) << 3;

        if C::DEFERRED_TIMESTAMP {
            timestamp = Self::timestamp::<C, T>();
        }

        commit_fence();
        unsafe {
            ptr::write(
                slot.add(4),
                timestamp | COMMIT | Self::fmt_field::<C>(key, harvested),
            );
        }
    }

    // Compact builds trade the unrolled paths above for this one loop.
    fn compact<C, T>(&self, key: Key, words: &[u32])
    where
        C: Config,
        T: Timestamp,
    {
        let mut bytes = [0; 16];
        for (chunk, word) in bytes.chunks_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        self.msgn::<C, T>(key, &bytes[..words.len() * 4]);
    }

    /// Records a word-aligned blob: `data` is split into subpackets of up
    /// to four DATA words, all sharing one timestamp and format; the final
    /// partial word is zero-padded
    pub fn msgn<C, T>(&self, key: Key, data: &[u8])
    where
        C: Config,
        T: Timestamp,
    {
        let mut timestamp = if C::DEFERRED_TIMESTAMP {
            0
        } else {
            Self::timestamp::<C, T>()
        };

        if self.disabled::<C>(key) {
            return;
        }

        let mut data = data;
        if data.len() > C::MAX_MSG_BYTES as usize {
            if C::DISCARD_OVERSIZE {
                return;
            }
            data = &data[..C::MAX_MSG_BYTES as usize];
        }

        let length = data.len() as u32;
        // one FMT word for every four DATA words
        let mut words = (length + 3) / 4 + (length + 15) / 16;
        if words == 0 {
            words = 1;
        }

        let mut index = match self.reserve::<C>(words) {
            Some(index) => index,
            None => return,
        };

        if C::DEFERRED_TIMESTAMP {
            timestamp = Self::timestamp::<C, T>();
        }
        let base = timestamp | COMMIT;

        let mut remaining = data;
        loop {
            let take = cmp::min(remaining.len(), 16);
            let (chunk, rest) = remaining.split_at(take);
            remaining = rest;

            let slot = self.slot(index);
            let mut harvested = 0;
            let mut filled = 0u32;
            for piece in chunk.chunks(4) {
                let word = pad_word(piece);
                unsafe {
                    ptr::write(slot.add(filled as usize), word & DATA_MASK);
                }
                harvested |= (word >> 31) << filled;
                filled += 1;
            }

            commit_fence();
            unsafe {
                ptr::write(
                    slot.add(filled as usize),
                    base | Self::fmt_field::<C>(key, harvested),
                );
            }

            if remaining.is_empty() {
                break;
            }

            index += 5;
            if index >= C::BUFFER_WORDS {
                index = 0;
            }
        }
    }

    /// Records a byte-granular blob of up to `min(255, max msgx bytes - 1)`
    /// bytes; the byte length rides in the top byte of the last DATA word
    pub fn msgx<C, T>(&self, key: Key, data: &[u8])
    where
        C: Config,
        T: Timestamp,
    {
        let mut timestamp = if C::DEFERRED_TIMESTAMP {
            0
        } else {
            Self::timestamp::<C, T>()
        };

        if self.disabled::<C>(key) {
            return;
        }

        let mut data = data;
        let limit = (C::MAX_MSGX_BYTES - 1) as usize;
        if data.len() > limit {
            if C::DISCARD_OVERSIZE {
                return;
            }
            data = &data[..limit];
        }

        let length = data.len() as u32;
        let words = 2 + length / 4 + length / 16;

        let mut index = match self.reserve::<C>(words) {
            Some(index) => index,
            None => return,
        };

        if C::DEFERRED_TIMESTAMP {
            timestamp = Self::timestamp::<C, T>();
        }
        let base = timestamp | COMMIT;

        // bytes are packed little-endian by value, so the layout does not
        // depend on the platform's byte order
        let mut cursor = 0;
        let mut remaining = length as i32;
        'message: loop {
            let slot = self.slot(index);
            let mut harvested = 0;
            let mut filled = 0u32;
            loop {
                let take = cmp::min(cmp::max(remaining, 0) as usize, 4);
                let mut word = 0;
                for k in 0..take {
                    // cursor + take never passes `length`; see `remaining`
                    word |= u32::from(unsafe { *data.get_unchecked(cursor + k) }) << (8 * k as u32);
                }
                cursor += take;
                remaining -= 4;

                let last = remaining < 0;
                if last {
                    // the length of the data (top byte of the last DATA word)
                    word |= length << 24;
                }

                unsafe {
                    ptr::write(slot.add(filled as usize), word & DATA_MASK);
                }
                harvested |= (word >> 31) << filled;
                filled += 1;

                if last || filled == 4 {
                    commit_fence();
                    unsafe {
                        ptr::write(
                            slot.add(filled as usize),
                            base | Self::fmt_field::<C>(key, harvested),
                        );
                    }
                    if last {
                        break 'message;
                    }
                    break;
                }
            }

            index += 5;
            if index >= C::BUFFER_WORDS {
                index = 0;
            }
        }
    }

    /// Scans `s` for a NUL byte (at most `max_length` bytes in) and records
    /// the bytes before it as a word-aligned blob
    pub fn stringn<C, T>(&self, key: Key, s: &[u8], max_length: u32)
    where
        C: Config,
        T: Timestamp,
    {
        let mut limit = max_length;
        if C::MAX_MSG_BYTES < limit {
            limit = C::MAX_MSG_BYTES;
        }

        let mut length = 0;
        while length < limit as usize && length < s.len() && s[length] != 0 {
            length += 1;
        }

        self.msgn::<C, T>(key, &s[..length]);
    }
}
