#![no_std]
#![no_main]

use core::cmp;

use cortex_m_rt::entry;
use cortex_m_semihosting::{debug, hprintln};
use panic_halt as _;
use ufmt::{uwrite, uWrite};
use weir::{timestamp::Cyccnt, InitMode, Recorder};

weir::recorder! {
    timer: Cyccnt<12_000_000>,
    words: 1024,
    max_subpackets: 4,
}

const F_APP: u32 = 1;
const MSGX_TEXT: u32 = 0x030;

// fixed-size sink for `uwrite!`; overflowing text is truncated
struct Line {
    bytes: [u8; 48],
    len: usize,
}

impl Line {
    fn new() -> Self {
        Line {
            bytes: [0; 48],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl uWrite for Line {
    type Error = ();

    fn write_str(&mut self, s: &str) -> Result<(), ()> {
        let bytes = s.as_bytes();
        let n = cmp::min(bytes.len(), self.bytes.len() - self.len);
        self.bytes[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

#[entry]
fn main() -> ! {
    weir::init(weir::ENABLE_ALL_FILTERS, InitMode::Restart);

    for i in 0..4u32 {
        let mut line = Line::new();
        uwrite!(line, "pass {} of 4", i).ok();
        // text goes into the ring as a byte-granular blob
        weir::msgx!(MSGX_TEXT, F_APP, line.as_bytes());
    }

    hprintln!("{} words used", Recorder::get().write_index()).ok();

    debug::exit(debug::EXIT_SUCCESS);

    loop {}
}
