//! SCL clock control and rise time derivation (RM0090 §27.6.8, §27.6.9)

use super::config::DutyCycle;
use crate::time::{Hertz, FAST_MODE_MAX, STANDARD_MODE_MAX};

/// Lowest peripheral clock accepted in CR2.FREQ
const FREQ_MIN_MHZ: u32 = 2;
/// Highest peripheral clock accepted in CR2.FREQ
const FREQ_MAX_MHZ: u32 = 50;
/// Width of the CCR clock control field
const DIVIDER_MAX: u32 = 0xFFF;
/// Width of the TRISE field
const RISE_TIME_MASK: u32 = 0x3F;

/// Reasons a bus timing cannot be programmed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingError {
    /// The peripheral clock is outside 2..=50 MHz
    BusClockOutOfRange,
    /// The SCL frequency is zero or above 400kHz
    SclOutOfRange,
    /// The clock control divider computed to zero
    DividerZero,
    /// The clock control divider does not fit the 12-bit CCR field
    DividerOverflow,
}

/// Speed class of the bus
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpeedMode {
    /// Standard mode, up to 100kHz
    Standard,
    /// Fast mode, up to 400kHz, with the selected duty cycle
    Fast(DutyCycle),
}

/// Register values derived from the peripheral clock and the requested SCL
/// frequency.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// CR2.FREQ, peripheral clock in MHz
    pub freq_mhz: u8,
    /// Speed class encoded in CCR.F/S and CCR.DUTY
    pub mode: SpeedMode,
    /// CCR clock control divider
    pub divider: u16,
    /// TRISE maximum rise time, in peripheral clock cycles plus one
    pub max_rise_time: u8,
}

impl Timing {
    /// Derive the timing registers for `scl` from the peripheral clock.
    ///
    /// Standard mode divides by `2 * scl`. Fast mode divides by `3 * scl`
    /// with a 2:1 duty cycle and by `25 * scl` with 16:9. The rise time is
    /// 1000ns in standard mode and 300ns in fast mode.
    pub fn compute(
        bus_clock: Hertz,
        scl: Hertz,
        duty_cycle: DutyCycle,
    ) -> Result<Self, TimingError> {
        let pclk = bus_clock.raw();
        let freq = scl.raw();

        let freq_mhz = pclk / 1_000_000;
        if !(FREQ_MIN_MHZ..=FREQ_MAX_MHZ).contains(&freq_mhz) {
            return Err(TimingError::BusClockOutOfRange);
        }

        if freq == 0 || freq > FAST_MODE_MAX.raw() {
            return Err(TimingError::SclOutOfRange);
        }

        let (mode, divider, max_rise_time) = if freq <= STANDARD_MODE_MAX.raw()
        {
            (SpeedMode::Standard, pclk / (2 * freq), freq_mhz + 1)
        } else {
            let divider = match duty_cycle {
                DutyCycle::Ratio2to1 => pclk / (3 * freq),
                DutyCycle::Ratio16to9 => pclk / (25 * freq),
            };
            let rise = (pclk as u64 * 300 / 1_000_000_000) as u32 + 1;
            (SpeedMode::Fast(duty_cycle), divider, rise)
        };

        if divider == 0 {
            return Err(TimingError::DividerZero);
        }
        if divider > DIVIDER_MAX {
            return Err(TimingError::DividerOverflow);
        }

        Ok(Timing {
            freq_mhz: freq_mhz as u8,
            mode,
            divider: divider as u16,
            max_rise_time: (max_rise_time & RISE_TIME_MASK) as u8,
        })
    }

    /// CCR.F/S: fast mode selected
    pub fn fast_mode(&self) -> bool {
        matches!(self.mode, SpeedMode::Fast(_))
    }

    /// CCR.DUTY: 16:9 low/high ratio, only meaningful in fast mode
    pub fn duty_16_9(&self) -> bool {
        self.mode == SpeedMode::Fast(DutyCycle::Ratio16to9)
    }
}
