#![no_std]
#![no_main]

use cortex_m::peripheral::NVIC;
use cortex_m_rt::entry;
use cortex_m_semihosting::{debug, hprintln};
use lm3s6965::{interrupt, Interrupt};
use panic_halt as _;
use weir::{timestamp::Cyccnt, InitMode, Recorder};

weir::recorder! {
    timer: Cyccnt<12_000_000>,
    words: 2048,
    fmt_id_bits: 10,
    max_subpackets: 16,
    timestamp_shift: 1,
}

// format IDs and filter numbers normally come from a generated catalog
const F_APP: u32 = 1;
const MSG0_BOOT: u32 = 0x010;
const MSG1_ISR_A: u32 = 0x012;
const MSG2_ISR_B: u32 = 0x014;
const MSGN_BUILD: u32 = 0x020;

#[entry]
fn main() -> ! {
    weir::init(weir::ENABLE_ALL_FILTERS, InitMode::Restart);

    weir::msg0!(MSG0_BOOT, F_APP);
    weir::string!(MSGN_BUILD, F_APP, b"demo build\0");

    if let Some(p) = cortex_m::Peripherals::take() {
        unsafe {
            let mut nvic = p.NVIC;
            nvic.set_priority(Interrupt::GPIOA, 224);
            nvic.set_priority(Interrupt::GPIOB, 192);
            NVIC::unmask(Interrupt::GPIOA);
            NVIC::unmask(Interrupt::GPIOB);
        }
    }

    NVIC::pend(Interrupt::GPIOA);
    NVIC::pend(Interrupt::GPIOB);

    // play host: dump the header and the used part of the ring
    let recorder = Recorder::get();
    let used = weir::HEADER_WORDS + recorder.write_index();
    let mut ptr = recorder.as_ptr();
    for _ in 0..used {
        let word = unsafe { ptr.read_volatile() };
        hprintln!("{:08x}", word).ok();
        ptr = unsafe { ptr.add(1) };
    }

    debug::exit(debug::EXIT_SUCCESS);

    loop {}
}

#[interrupt]
fn GPIOA() {
    weir::msg1!(MSG1_ISR_A, F_APP, 0x1122u32);
}

#[interrupt]
fn GPIOB() {
    weir::msg2!(MSG2_ISR_B, F_APP, 40u32, 2u32);
}
