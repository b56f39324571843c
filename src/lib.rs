//! I2C controller engine and device adapters for the STM32F407 weather
//! station.
//!
//! The [`i2c`] module drives the F4 family's I2C v1 peripheral as a bus
//! controller, either with busy-wait polling or from the event and error
//! interrupts. The [`eeprom`] and [`rtc`] modules frame the paged EEPROM and
//! BCD real-time clock protocols on top of any `embedded-hal` I2C bus.
//!
//! Enable the `stm32f407` feature to get the register implementation for the
//! on-chip `I2C1`, `I2C2` and `I2C3` peripherals.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "stm32f407")]
pub use stm32f4::stm32f407 as stm32;

#[cfg(feature = "device-selected")]
pub use crate::stm32 as pac;
#[cfg(feature = "device-selected")]
pub use crate::stm32 as device;

// Enable use of interrupt macro
#[cfg(all(feature = "rt", feature = "device-selected"))]
#[cfg_attr(docsrs, doc(cfg(feature = "rt")))]
pub use crate::stm32::interrupt;

#[macro_use]
mod macros;

pub mod prelude;

pub mod time;

pub mod i2c;

pub mod eeprom;

pub mod policy;

pub mod rtc;

mod sealed {
    pub trait Sealed {}
}

pub(crate) use sealed::Sealed;
