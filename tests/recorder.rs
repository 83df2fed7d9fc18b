//! End-to-end exercises of the `recorder!` expansion: the trampolines, the
//! public recording surface, and concurrent producers on real threads.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::thread;

use weir::timestamp::TickClock;
use weir::{InitMode, Key, Recorder, FORCE_ENABLE_ALL_FILTERS};

weir::recorder! {
    timer: TickClock,
    words: 16384,
    fmt_id_bits: 10,
    max_subpackets: 16,
    timestamp_shift: 1,
}

const F_APP: u32 = 1;

// the recorder is a process-wide singleton; tests take turns
static LOCK: Mutex<()> = Mutex::new(());

fn exclusive() -> MutexGuard<'static, ()> {
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn buffer_word(recorder: Recorder, index: u32) -> u32 {
    unsafe {
        recorder
            .as_ptr()
            .add((weir::HEADER_WORDS + index) as usize)
            .read_volatile()
    }
}

fn fmt_field(word: u32) -> u32 {
    word >> 22
}

#[test]
fn scripted_stream() {
    let _guard = exclusive();

    weir::init(weir::ENABLE_ALL_FILTERS, InitMode::Restart);
    let recorder = Recorder::get();
    assert_eq!(recorder.write_index(), 0);

    // `TickClock` starts over at `init` and advances by two per message
    // (deferred timestamps: one sample per call, taken after reservation)
    weir::msg0!(0x100, 5);
    assert_eq!(recorder.write_index(), 1);
    assert_eq!(buffer_word(recorder, 0), 2 | 1 | (0x100 << 22));

    let sources = [0x89AB_CDEF, 0x0123_4567, 0xFFFF_FFFF, 0x7FFF_FFFF];
    weir::msg4!(0x1F0, F_APP, sources[0], sources[1], sources[2], sources[3]);
    assert_eq!(recorder.write_index(), 6);
    let fmt = buffer_word(recorder, 5);
    assert_eq!(fmt & 1, 1);
    for (i, &source) in sources.iter().enumerate() {
        let data = buffer_word(recorder, 1 + i as u32);
        assert_eq!(data >> 31, 0);
        let restored = data | ((fmt_field(fmt) >> i & 1) << 31);
        assert_eq!(restored, source);
    }

    weir::msgx!(0x200, F_APP, &[1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(recorder.write_index(), 9);
    assert_eq!(buffer_word(recorder, 6), 0x0403_0201);
    assert_eq!(buffer_word(recorder, 7), 0x0707_0605);
    assert_eq!(buffer_word(recorder, 8), 6 | 1 | (0x200 << 22));

    // length 5: "hell" + "o" zero-padded, the NUL terminator dropped
    weir::string!(0x210, F_APP, b"hello\0world");
    assert_eq!(recorder.write_index(), 12);
    assert_eq!(buffer_word(recorder, 9), u32::from_ne_bytes(*b"hell"));
    assert_eq!(buffer_word(recorder, 10), u32::from_ne_bytes([b'o', 0, 0, 0]));
}

#[test]
fn control_surface() {
    let _guard = exclusive();

    weir::init(weir::ENABLE_ALL_FILTERS, InitMode::Restart);
    let recorder = Recorder::get();

    // the capability word the host parameterizes its decoder with
    let expected = (1 << 1)          // filtering compiled in
        | (1 << 2)                   // filter lockout compiled in
        | (1 << 4)                   // long timestamps compiled in
        | (0 << 8)                   // timestamp_shift - 1
        | (1 << 12)                  // fmt_id_bits - 9
        | (16 << 16)                 // max_subpackets
        | (weir::HEADER_WORDS << 24) // header size in words
        | (1 << 31); // 16384 is a power of two
    assert_eq!(recorder.config_word(), expected);
    assert_eq!(recorder.len_words(), 6 + 16384 + 4);

    // lockout: after a stop, only the sentinel re-enables logging
    weir::set_filter(0);
    assert_eq!(weir::get_filter(), 0);
    weir::msg0!(0x100, F_APP);
    assert_eq!(recorder.write_index(), 0);
    weir::set_filter(0x0000_00FF);
    assert_eq!(weir::get_filter(), 0);
    weir::set_filter(FORCE_ENABLE_ALL_FILTERS);
    assert_eq!(weir::get_filter(), 0xFFFF_FFFF);

    // filter #0 is forced on; non-zero masks are remembered for restore
    weir::set_filter(0x0000_FFFF);
    assert_eq!(weir::get_filter(), 0x8000_FFFF);
    weir::set_filter(0);
    weir::restore_filter();
    assert_eq!(weir::get_filter(), 0x8000_FFFF);
    weir::set_filter(FORCE_ENABLE_ALL_FILTERS);

    // a frequency change lands in the header and in the stream
    let mark = recorder.write_index();
    weir::timestamp_frequency(123_456_789);
    assert_eq!(recorder.timestamp_hz(), 123_456_789);
    assert_eq!(recorder.write_index(), mark + 2);
    assert_eq!(buffer_word(recorder, mark), 123_456_789);
    assert_eq!(
        fmt_field(buffer_word(recorder, mark + 1)),
        weir::FMT_TIMESTAMP_FREQUENCY
    );

    // the long timestamp rides the always-on system filter
    let mark = recorder.write_index();
    weir::long_timestamp();
    assert_eq!(recorder.write_index(), mark + 2);
    assert_eq!(
        fmt_field(buffer_word(recorder, mark + 1)),
        weir::FMT_LONG_TIMESTAMP
    );

    // a time restart is a long-timestamp message with an all-ones payload
    let mark = recorder.write_index();
    weir::restart_timing();
    let data = buffer_word(recorder, mark);
    let fmt = buffer_word(recorder, mark + 1);
    assert_eq!(data, 0x7FFF_FFFF);
    assert_eq!(fmt_field(fmt), weir::FMT_LONG_TIMESTAMP | 1); // harvested sign bit
    assert_eq!(data | (fmt_field(fmt) << 31), weir::TIME_RESTART);
}

#[test]
fn concurrent_producers() {
    let _guard = exclusive();

    weir::init(weir::ENABLE_ALL_FILTERS, InitMode::Restart);
    let recorder = Recorder::get();

    const PRODUCERS: u32 = 4;
    const MESSAGES: u32 = 1000;

    let payload = |tag: u32, seq: u32| {
        let mut payload = (tag << 16) | seq;
        if seq % 3 == 0 {
            // exercise the sign-bit harvest under contention
            payload |= 0x8000_0000;
        }
        payload
    };

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|tag| {
            thread::spawn(move || {
                for seq in 0..MESSAGES {
                    let mut value = (tag << 16) | seq;
                    if seq % 3 == 0 {
                        value |= 0x8000_0000;
                    }
                    weir::msg1(Key::msg1(F_APP, 0x100 + 2 * tag), value);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // no wrap: every producer's messages must be recoverable and intact
    assert_eq!(recorder.write_index(), PRODUCERS * MESSAGES * 2);

    let mut seen = vec![HashSet::new(); PRODUCERS as usize];
    for i in (0..PRODUCERS * MESSAGES * 2).step_by(2) {
        let data = buffer_word(recorder, i);
        let fmt = buffer_word(recorder, i as u32 + 1);
        assert_eq!(fmt & 1, 1);
        assert_eq!(data >> 31, 0);

        let field = fmt_field(fmt);
        let tag = ((field & !1) - 0x100) >> 1;
        assert!(tag < PRODUCERS);
        let restored = data | ((field & 1) << 31);
        assert!(
            seen[tag as usize].insert(restored),
            "duplicate message for producer {}",
            tag
        );
    }

    for (tag, set) in seen.iter().enumerate() {
        assert_eq!(set.len(), MESSAGES as usize);
        for seq in 0..MESSAGES {
            assert!(set.contains(&payload(tag as u32, seq)));
        }
    }
}
