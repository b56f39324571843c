//! Logs an RTC timestamp to the EEPROM once a second.
//!
//! DS1307 and AT24C32 share I2C1 on PB6 (SCL) and PB7 (SDA). The core runs
//! from the 16MHz HSI, which also clocks APB1.
#![no_main]
#![no_std]

use cortex_m_rt::entry;
use embedded_hal::delay::DelayNs;
use meteo_hal::eeprom::{Eeprom, EepromConfig};
use meteo_hal::i2c::Config;
use meteo_hal::policy::ErrorPolicy;
use meteo_hal::rtc::{Date, HourFormat, Rtc, RtcFields, Time};
use meteo_hal::{pac, prelude::*};
use panic_halt as _;

const HSI_MHZ: u32 = 16;

/// Busy-wait delay calibrated for the HSI
struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let cycles = (ns as u64 * HSI_MHZ as u64 / 1_000) as u32;
        cortex_m::asm::delay(cycles.max(1));
    }
}

#[entry]
fn main() -> ! {
    let dp = pac::Peripherals::take().unwrap();
    let mut delay = SpinDelay;

    // PB6, PB7: alternate function 4, open drain, pull-up
    dp.RCC.ahb1enr().modify(|_, w| w.gpioben().set_bit());
    let gpiob = &dp.GPIOB;
    gpiob.moder().modify(|r, w| unsafe {
        w.bits((r.bits() & !(0xF << 12)) | (0xA << 12))
    });
    gpiob
        .otyper()
        .modify(|r, w| unsafe { w.bits(r.bits() | (0b11 << 6)) });
    gpiob.pupdr().modify(|r, w| unsafe {
        w.bits((r.bits() & !(0xF << 12)) | (0x5 << 12))
    });
    gpiob.afrl().modify(|r, w| unsafe {
        w.bits((r.bits() & !(0xFF << 24)) | (0x44 << 24))
    });

    let mut i2c = dp
        .I2C1
        .i2c(Config::new(100.kHz()), HSI_MHZ.MHz())
        .unwrap();

    // A clock that does not start leaves nothing worth logging
    let mut rtc = Rtc::new(&mut i2c).with_policy(ErrorPolicy::Halt);
    let halted = rtc.is_halted().unwrap_or(true);
    let _ = rtc.init();
    // Only a clock that lost its time is set, a running one is kept
    if halted {
        let _ = rtc.set_fields(&RtcFields {
            time: Time {
                seconds: 0,
                minutes: 0,
                hours: 12,
                format: HourFormat::TwentyFour,
            },
            date: Date {
                day_of_week: 1,
                date: 1,
                month: 1,
                year: 24,
            },
        });
    }

    let config = EepromConfig::at24c32();
    let mut cursor = config.start;

    loop {
        let fields = Rtc::new(&mut i2c).fields();

        if let Ok(RtcFields { time, date }) = fields {
            let record = [
                date.year,
                date.month,
                date.date,
                time.hours,
                time.minutes,
                time.seconds,
            ];

            let mut eeprom = Eeprom::new(&mut i2c, &mut delay, config);
            eeprom.set_cursor(cursor);
            let _ = eeprom.append(&record);
            cursor = eeprom.cursor().position();
        }

        delay.delay_ms(1_000);
    }
}
