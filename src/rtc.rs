//! DS1307 real-time clock
//!
//! The clock keeps time and date in BCD coded registers. Every register is
//! accessed with its own bus transaction: a write is `[register, value]`, a
//! read sends the register pointer, releases the bus, and reads one byte in a
//! second transaction. Reading the full date is therefore not atomic; a
//! rollover between two register reads can yield an inconsistent result.

use embedded_hal::i2c::I2c;

use crate::policy::ErrorPolicy;

/// Bus address of the DS1307
pub const DS1307_ADDRESS: u8 = 0x68;

mod reg {
    pub const SECONDS: u8 = 0x00;
    pub const MINUTES: u8 = 0x01;
    pub const HOURS: u8 = 0x02;
    pub const DAY: u8 = 0x03;
    pub const DATE: u8 = 0x04;
    pub const MONTH: u8 = 0x05;
    pub const YEAR: u8 = 0x06;
}

/// Oscillator stopped, in the seconds register
const CLOCK_HALT: u8 = 1 << 7;
/// 12 hour mode, in the hours register
const HOUR_12: u8 = 1 << 6;
/// PM in 12 hour mode, in the hours register
const HOUR_PM: u8 = 1 << 5;

/// Encode a value in 0..=99 as two BCD digits
pub const fn to_bcd(value: u8) -> u8 {
    if value < 10 {
        value
    } else {
        ((value / 10) << 4) | (value % 10)
    }
}

/// Decode two BCD digits
pub const fn from_bcd(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

/// RTC error
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus reported an error
    I2c(E),
    /// The oscillator did not start
    ClockHalted,
    /// A time or date field is out of range
    InvalidValue,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HourFormat {
    TwelveAm,
    TwelvePm,
    TwentyFour,
}

/// Time of day. In 12 hour formats `hours` runs from 1 to 12.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Time {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub format: HourFormat,
}

impl Time {
    fn is_valid(&self) -> bool {
        let hours = match self.format {
            HourFormat::TwentyFour => self.hours < 24,
            HourFormat::TwelveAm | HourFormat::TwelvePm => {
                (1..=12).contains(&self.hours)
            }
        };
        self.seconds < 60 && self.minutes < 60 && hours
    }

    fn hours_register(&self) -> u8 {
        let hours = to_bcd(self.hours);
        match self.format {
            HourFormat::TwentyFour => hours & !HOUR_12,
            HourFormat::TwelveAm => (hours & !HOUR_PM) | HOUR_12,
            HourFormat::TwelvePm => hours | HOUR_12 | HOUR_PM,
        }
    }

    fn from_registers(seconds: u8, minutes: u8, hours: u8) -> Self {
        let (hours, format) = if hours & HOUR_12 != 0 {
            let format = if hours & HOUR_PM != 0 {
                HourFormat::TwelvePm
            } else {
                HourFormat::TwelveAm
            };
            (hours & !(HOUR_12 | HOUR_PM), format)
        } else {
            (hours, HourFormat::TwentyFour)
        };

        Time {
            seconds: from_bcd(seconds & !CLOCK_HALT),
            minutes: from_bcd(minutes),
            hours: from_bcd(hours),
            format,
        }
    }
}

/// Calendar date. `day_of_week` runs from 1 to 7, `year` from 0 to 99.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Date {
    pub day_of_week: u8,
    pub date: u8,
    pub month: u8,
    pub year: u8,
}

impl Date {
    fn is_valid(&self) -> bool {
        (1..=7).contains(&self.day_of_week)
            && (1..=31).contains(&self.date)
            && (1..=12).contains(&self.month)
            && self.year <= 99
    }
}

/// Time and date together
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RtcFields {
    pub time: Time,
    pub date: Date,
}

/// DS1307 on an I2C bus
pub struct Rtc<I2C> {
    i2c: I2C,
    address: u8,
    policy: ErrorPolicy,
}

impl<I2C: I2c> Rtc<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Rtc {
            i2c,
            address: DS1307_ADDRESS,
            policy: ErrorPolicy::default(),
        }
    }

    /// Use a bus address other than [`DS1307_ADDRESS`]
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Select how failed operations are handled
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn write_register(
        &mut self,
        register: u8,
        value: u8,
    ) -> Result<(), Error<I2C::Error>> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(Error::I2c)
    }

    fn read_register(&mut self, register: u8) -> Result<u8, Error<I2C::Error>> {
        let mut value = [0];
        self.i2c
            .write(self.address, &[register])
            .map_err(Error::I2c)?;
        self.i2c
            .read(self.address, &mut value)
            .map_err(Error::I2c)?;
        Ok(value[0])
    }

    /// Start the oscillator.
    ///
    /// Clears the clock halt bit, keeping the current seconds, and reads it
    /// back. Fails with [`Error::ClockHalted`] if the oscillator did not
    /// start.
    pub fn init(&mut self) -> Result<(), Error<I2C::Error>> {
        let result = self.start_oscillator();
        self.policy.apply("rtc init", result)
    }

    /// Whether the oscillator is stopped.
    ///
    /// A halted clock lost its time with the backup supply and holds
    /// nothing worth keeping.
    pub fn is_halted(&mut self) -> Result<bool, Error<I2C::Error>> {
        let result = self
            .read_register(reg::SECONDS)
            .map(|seconds| seconds & CLOCK_HALT != 0);
        self.policy.apply("rtc halt check", result)
    }

    fn start_oscillator(&mut self) -> Result<(), Error<I2C::Error>> {
        let seconds = self.read_register(reg::SECONDS)?;
        if seconds & CLOCK_HALT != 0 {
            debug!("rtc: starting oscillator");
            self.write_register(reg::SECONDS, seconds & !CLOCK_HALT)?;
        }

        if self.read_register(reg::SECONDS)? & CLOCK_HALT != 0 {
            return Err(Error::ClockHalted);
        }
        Ok(())
    }

    /// Set the time of day. Writing the seconds also starts the oscillator.
    pub fn set_time(&mut self, time: &Time) -> Result<(), Error<I2C::Error>> {
        let result = self.write_time(time);
        self.policy.apply("rtc set time", result)
    }

    fn write_time(&mut self, time: &Time) -> Result<(), Error<I2C::Error>> {
        if !time.is_valid() {
            return Err(Error::InvalidValue);
        }
        self.write_register(reg::SECONDS, to_bcd(time.seconds) & !CLOCK_HALT)?;
        self.write_register(reg::MINUTES, to_bcd(time.minutes))?;
        self.write_register(reg::HOURS, time.hours_register())
    }

    pub fn time(&mut self) -> Result<Time, Error<I2C::Error>> {
        let result = self.read_time();
        self.policy.apply("rtc get time", result)
    }

    fn read_time(&mut self) -> Result<Time, Error<I2C::Error>> {
        let seconds = self.read_register(reg::SECONDS)?;
        let minutes = self.read_register(reg::MINUTES)?;
        let hours = self.read_register(reg::HOURS)?;
        Ok(Time::from_registers(seconds, minutes, hours))
    }

    /// Set the date, one register at a time
    pub fn set_date(&mut self, date: &Date) -> Result<(), Error<I2C::Error>> {
        let result = self.write_date(date);
        self.policy.apply("rtc set date", result)
    }

    fn write_date(&mut self, date: &Date) -> Result<(), Error<I2C::Error>> {
        if !date.is_valid() {
            return Err(Error::InvalidValue);
        }
        self.write_register(reg::DAY, to_bcd(date.day_of_week))?;
        self.write_register(reg::DATE, to_bcd(date.date))?;
        self.write_register(reg::MONTH, to_bcd(date.month))?;
        self.write_register(reg::YEAR, to_bcd(date.year))
    }

    pub fn date(&mut self) -> Result<Date, Error<I2C::Error>> {
        let result = self.read_date();
        self.policy.apply("rtc get date", result)
    }

    fn read_date(&mut self) -> Result<Date, Error<I2C::Error>> {
        Ok(Date {
            day_of_week: from_bcd(self.read_register(reg::DAY)?),
            date: from_bcd(self.read_register(reg::DATE)?),
            month: from_bcd(self.read_register(reg::MONTH)?),
            year: from_bcd(self.read_register(reg::YEAR)?),
        })
    }

    /// Set time then date. Nothing is written unless both are valid.
    pub fn set_fields(
        &mut self,
        fields: &RtcFields,
    ) -> Result<(), Error<I2C::Error>> {
        let result = if fields.time.is_valid() && fields.date.is_valid() {
            self.write_time(&fields.time)
                .and_then(|_| self.write_date(&fields.date))
        } else {
            Err(Error::InvalidValue)
        };
        self.policy.apply("rtc set fields", result)
    }

    /// Read time then date
    pub fn fields(&mut self) -> Result<RtcFields, Error<I2C::Error>> {
        let result = self.read_time().and_then(|time| {
            self.read_date().map(|date| RtcFields { time, date })
        });
        self.policy.apply("rtc get fields", result)
    }

    /// Release the bus
    pub fn release(self) -> I2C {
        self.i2c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i2c::mock::{Device, MockI2c, Op, Rtc1307};
    use crate::i2c::{self, Config};
    use fugit::RateExtU32;

    fn controller(mock: &MockI2c) -> i2c::I2c<MockI2c> {
        let config = Config::new(100.kHz());
        let i2c = i2c::I2c::new(mock.clone(), config, 16.MHz()).unwrap();
        mock.clear_ops();
        i2c
    }

    fn starts(mock: &MockI2c) -> usize {
        mock.ops().iter().filter(|op| **op == Op::Start).count()
    }

    #[test]
    fn bcd_round_trip() {
        for n in 0..=99 {
            assert_eq!(from_bcd(to_bcd(n)), n);
        }
        assert_eq!(to_bcd(7), 0x07);
        assert_eq!(to_bcd(10), 0x10);
        assert_eq!(to_bcd(59), 0x59);
        assert_eq!(from_bcd(0x42), 42);
    }

    #[test]
    fn hours_in_24_hour_format() {
        let mock = MockI2c::new();
        let device = mock.attach(Rtc1307::new());
        let mut rtc = Rtc::new(controller(&mock));

        let time = Time {
            seconds: 30,
            minutes: 15,
            hours: 6,
            format: HourFormat::TwentyFour,
        };
        rtc.set_time(&time).unwrap();

        let registers = device.borrow().registers;
        assert_eq!(registers[..3], [0x30, 0x15, 0x06]);
        assert_eq!(registers[2] & HOUR_12, 0);
        // One transaction per register
        assert_eq!(starts(&mock), 3);

        assert_eq!(rtc.time().unwrap(), time);
    }

    #[test]
    fn hours_in_12_hour_format() {
        let mock = MockI2c::new();
        let device = mock.attach(Rtc1307::new());
        let mut rtc = Rtc::new(controller(&mock));

        let evening = Time {
            seconds: 0,
            minutes: 45,
            hours: 11,
            format: HourFormat::TwelvePm,
        };
        rtc.set_time(&evening).unwrap();
        assert_eq!(device.borrow().registers[2], HOUR_12 | HOUR_PM | 0x11);
        assert_eq!(rtc.time().unwrap(), evening);

        let morning = Time {
            hours: 12,
            format: HourFormat::TwelveAm,
            ..evening
        };
        rtc.set_time(&morning).unwrap();
        assert_eq!(device.borrow().registers[2], HOUR_12 | 0x12);
        assert_eq!(rtc.time().unwrap(), morning);

        // 20:00 keeps its tens digit in bit 5
        device.borrow_mut().registers[2] = 0x20;
        assert_eq!(rtc.time().unwrap().hours, 20);
    }

    #[test]
    fn clock_halt_bit_handling() {
        let mock = MockI2c::new();
        let device = mock.attach(Rtc1307::new());
        device.borrow_mut().registers[0] = CLOCK_HALT | 0x25;
        let mut rtc = Rtc::new(controller(&mock));

        assert_eq!(rtc.time().unwrap().seconds, 25);

        rtc.init().unwrap();
        assert_eq!(device.borrow().registers[0], 0x25);
    }

    #[test]
    fn halted_clock_detected_until_started() {
        let mock = MockI2c::new();
        let device = mock.attach(Rtc1307::new());
        device.borrow_mut().registers[0] = CLOCK_HALT | 0x25;
        let mut rtc = Rtc::new(controller(&mock));

        assert_eq!(rtc.is_halted(), Ok(true));
        rtc.init().unwrap();
        assert_eq!(rtc.is_halted(), Ok(false));

        // Only the register pointer is written
        mock.clear_ops();
        rtc.is_halted().unwrap();
        let writes = mock.ops().into_iter().filter(|op| matches!(op, Op::Write(_)));
        assert_eq!(writes.count(), 1);
        assert_eq!(device.borrow().registers[0], 0x25);
    }

    #[test]
    fn register_read_is_two_transactions() {
        let mock = MockI2c::new();
        mock.attach(Rtc1307::new());
        let mut rtc = Rtc::new(controller(&mock));

        rtc.date().unwrap();
        assert_eq!(starts(&mock), 8);
        assert_eq!(
            mock.ops()
                .iter()
                .filter(|op| **op == Op::Stop)
                .count(),
            8
        );
    }

    #[test]
    fn date_round_trip() {
        let mock = MockI2c::new();
        let device = mock.attach(Rtc1307::new());
        let mut rtc = Rtc::new(controller(&mock));

        let date = Date {
            day_of_week: 3,
            date: 21,
            month: 6,
            year: 24,
        };
        rtc.set_date(&date).unwrap();
        assert_eq!(starts(&mock), 4);
        assert_eq!(device.borrow().registers[3..7], [0x03, 0x21, 0x06, 0x24]);
        assert_eq!(rtc.date().unwrap(), date);
    }

    #[test]
    fn fields_round_trip() {
        let mock = MockI2c::new();
        mock.attach(Rtc1307::new());
        let mut rtc = Rtc::new(controller(&mock));

        let fields = RtcFields {
            time: Time {
                seconds: 59,
                minutes: 59,
                hours: 23,
                format: HourFormat::TwentyFour,
            },
            date: Date {
                day_of_week: 7,
                date: 31,
                month: 12,
                year: 99,
            },
        };
        rtc.set_fields(&fields).unwrap();
        assert_eq!(rtc.fields().unwrap(), fields);
    }

    #[test]
    fn invalid_values_touch_nothing() {
        let mock = MockI2c::new();
        mock.attach(Rtc1307::new());
        let mut rtc = Rtc::new(controller(&mock));

        let time = Time {
            seconds: 0,
            minutes: 60,
            hours: 0,
            format: HourFormat::TwentyFour,
        };
        assert_eq!(rtc.set_time(&time), Err(Error::InvalidValue));

        let time = Time {
            minutes: 0,
            hours: 0,
            format: HourFormat::TwelveAm,
            ..time
        };
        assert_eq!(rtc.set_time(&time), Err(Error::InvalidValue));

        let date = Date {
            day_of_week: 0,
            date: 1,
            month: 1,
            year: 0,
        };
        assert_eq!(rtc.set_date(&date), Err(Error::InvalidValue));

        let valid_time = Time {
            hours: 1,
            ..time
        };
        let fields = RtcFields {
            time: valid_time,
            date,
        };
        assert_eq!(rtc.set_fields(&fields), Err(Error::InvalidValue));

        assert!(mock.ops().is_empty());
    }

    /// A DS1307 whose oscillator never starts
    struct DeadOscillator;

    impl Device for DeadOscillator {
        fn address(&self) -> u8 {
            DS1307_ADDRESS
        }
        fn begin(&mut self, _read: bool) {}
        fn write(&mut self, _byte: u8) -> bool {
            true
        }
        fn read(&mut self) -> u8 {
            CLOCK_HALT
        }
        fn stop(&mut self) {}
    }

    #[test]
    fn halted_oscillator_is_reported() {
        let mock = MockI2c::new();
        mock.attach(DeadOscillator);
        let mut rtc = Rtc::new(controller(&mock));

        assert_eq!(rtc.init(), Err(Error::ClockHalted));
    }

    #[test]
    fn missing_device_reported_through_policy() {
        let mock = MockI2c::new();
        let mut rtc = Rtc::new(controller(&mock));

        assert_eq!(
            rtc.time(),
            Err(Error::I2c(i2c::Error::DeviceNotReady))
        );
    }

    #[test]
    #[should_panic(expected = "rtc init")]
    fn halt_policy_panics() {
        let mock = MockI2c::new();
        let mut rtc =
            Rtc::new(controller(&mock)).with_policy(ErrorPolicy::Halt);

        let _ = rtc.init();
    }
}
