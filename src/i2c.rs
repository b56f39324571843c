//! Inter Integrated Circuit (I2C) controller
//!
//! This module drives the I2C v1 peripheral of the STM32F4 family as a bus
//! controller (master). Target (slave) operation is not provided.
//!
//! # Usage
//!
//! In the simplest case, the I2C can be initialized from the device
//! peripheral and the APB1 clock frequency:
//!
//! ```
//! let dp = ...;            // Device peripherals
//!
//! let mut i2c = dp.I2C1.i2c(100.kHz(), 16.MHz())?;
//! ```
//!
//! The SCL and SDA pins must already be configured as open-drain alternate
//! function 4.
//!
//! ## Blocking transfers
//!
//! [`I2c::write_bytes`] and [`I2c::read_bytes`] run a whole transfer by
//! polling the status register. The [`Stop`] argument selects whether the
//! bus is released at the end or held for a repeated start:
//!
//! ```
//! // Set the register pointer, keep the bus, then read two bytes
//! i2c.write_bytes(0x50, &[0x00, 0x20], Stop::RepeatStart)?;
//! let mut read = [0u8; 2];
//! i2c.read_bytes(0x50, &mut read, Stop::Release)?;
//! ```
//!
//! The same transfers are available through the embedded-hal
//! [`I2c`](embedded_hal::i2c::I2c) trait.
//!
//! ## Interrupt driven transfers
//!
//! [`I2c::start_write`] and [`I2c::start_read`] issue the start condition and
//! return. The event and error interrupt handlers then call
//! [`I2c::handle_event_interrupt`] and [`I2c::handle_error_interrupt`], which
//! advance the transfer and hand completion or failure back to the caller.
//! The transfer works on the caller's `'static` buffer, which comes back with
//! the completion event:
//!
//! ```
//! static mut TIME: [u8; 7] = [0; 7];
//!
//! i2c.start_read(0x68, unsafe { &mut TIME }, Stop::Release)?;
//!
//! #[interrupt]
//! fn I2C1_EV() {
//!     if let Some(Event::RxComplete(time)) = i2c.handle_event_interrupt() {
//!         ...
//!     }
//! }
//! ```
//!
//! Only one transfer can be in flight. Any request made while the controller
//! is not [`TransferState::Ready`] is rejected with [`Error::Busy`].

use crate::time::Hertz;

pub mod config;
pub use config::{Config, DutyCycle};

pub mod timing;
pub use timing::{SpeedMode, Timing, TimingError};

mod hal;
mod interrupt;
pub use interrupt::{Buffer, ErrorEvent, Errors, Event};
use interrupt::Transfer;

pub mod shared;

#[cfg(feature = "device-selected")]
mod i2c_def;

#[cfg(test)]
pub(crate) mod mock;

/// What to do with the bus once a transfer completes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stop {
    /// Generate a stop condition, releasing the bus
    Release,
    /// Keep the bus so that the next transfer starts with a repeated start
    RepeatStart,
}

/// Direction of transfer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Read operation
    Read,
    /// Write operation
    Write,
}

/// Occupancy of the controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    /// No transfer is in flight
    Ready,
    /// An interrupt driven write is in flight
    BusyTx,
    /// An interrupt driven read is in flight
    BusyRx,
}

/// Errors flagged by the peripheral in SR1
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// Misplaced start or stop condition
    Bus,
    /// Arbitration lost to another controller
    ArbitrationLost,
    /// The target did not acknowledge a data byte
    AckFailure,
    /// Overrun or underrun of the data register
    Overrun,
    /// SCL held low beyond the SMBus timeout
    Timeout,
}

/// I2C error
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The peripheral flagged a protocol error
    Protocol(ProtocolError),
    /// The target did not acknowledge its address
    DeviceNotReady,
    /// A transfer is already in flight
    Busy,
    /// An interrupt driven transfer was requested with an empty buffer
    InvalidLength,
    /// A blocking wait exceeded the configured poll limit
    PollTimeout,
}

impl From<ProtocolError> for Error {
    fn from(error: ProtocolError) -> Self {
        Error::Protocol(error)
    }
}

/// One read of the SR1 status register
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status {
    /// SB: start condition generated
    pub start: bool,
    /// ADDR: address sent and acknowledged
    pub address: bool,
    /// BTF: byte transfer finished
    pub byte_finished: bool,
    /// RXNE: data register not empty
    pub rx_not_empty: bool,
    /// TXE: data register empty
    pub tx_empty: bool,
    /// BERR
    pub bus_error: bool,
    /// ARLO
    pub arbitration_lost: bool,
    /// AF
    pub ack_failure: bool,
    /// OVR
    pub overrun: bool,
    /// TIMEOUT
    pub timeout: bool,
}

impl Status {
    /// Error flags that are set, in the order they are serviced
    pub fn errors(&self) -> impl Iterator<Item = ProtocolError> {
        [
            (self.bus_error, ProtocolError::Bus),
            (self.arbitration_lost, ProtocolError::ArbitrationLost),
            (self.ack_failure, ProtocolError::AckFailure),
            (self.overrun, ProtocolError::Overrun),
            (self.timeout, ProtocolError::Timeout),
        ]
        .into_iter()
        .filter_map(|(set, error)| set.then_some(error))
    }

    /// The first error flag to service, if any
    pub fn error(&self) -> Option<ProtocolError> {
        self.errors().next()
    }
}

/// Interrupt sources of the peripheral, enabled in CR2
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    /// ITBUFEN: TXE and RXNE raise an event interrupt
    Buffer,
    /// ITEVTEN: SB, ADDR and BTF raise an event interrupt
    Event,
    /// ITERREN: error flags raise an error interrupt
    Error,
}

/// Operations on one I2C v1 peripheral.
///
/// Implemented for the device's `I2C1`, `I2C2` and `I2C3` when a device
/// feature is selected. Reads of SR1, SR2 and DR have side effects on the
/// peripheral, so each method touches those registers exactly as documented.
pub trait Instance: crate::Sealed {
    /// Program CR2.FREQ, OAR1, CCR and TRISE. The peripheral must be
    /// disabled.
    fn configure(&self, timing: &Timing, own_address: u8);

    /// Set or clear CR1.PE
    fn set_enabled(&self, enable: bool);

    /// Request a start condition
    fn start(&self);

    /// Request a stop condition
    fn stop(&self);

    /// Set or clear CR1.ACK
    fn set_ack(&self, enable: bool);

    /// Write DR
    fn write_data(&self, byte: u8);

    /// Read DR
    fn read_data(&self) -> u8;

    /// Read SR1 once
    fn status(&self) -> Status;

    /// Read SR1 then SR2, which clears ADDR
    fn clear_address(&self);

    /// Clear one rc_w0 error flag in SR1, leaving the others set
    fn clear_error(&self, error: ProtocolError);

    /// SR2.MSL: the peripheral is the bus controller
    fn is_controller(&self) -> bool;

    /// Enable or disable an interrupt source
    fn set_interrupt(&self, interrupt: Interrupt, enable: bool);

    /// Whether an interrupt source is enabled
    fn is_listening(&self, interrupt: Interrupt) -> bool;

    #[doc(hidden)]
    fn enable_clock(&self) {}

    #[doc(hidden)]
    fn disable_clock(&self) {}
}

/// Address byte for a 7-bit `address`: the address shifted up by one with
/// the R/W bit set for reads.
#[inline(always)]
pub const fn address_byte(address: u8, direction: Direction) -> u8 {
    match direction {
        Direction::Write => address << 1,
        Direction::Read => (address << 1) | 1,
    }
}

/// I2C bus controller
#[derive(Debug)]
pub struct I2c<I2C> {
    i2c: I2C,
    config: Config,
    timing: Timing,
    transfer: Option<Transfer>,
}

pub trait I2cExt<I2C: Instance>: Sized {
    /// Create an I2c controller running from a peripheral clock of
    /// `bus_clock`
    fn i2c(
        self,
        config: impl Into<Config>,
        bus_clock: Hertz,
    ) -> Result<I2c<I2C>, TimingError>;
}

impl<I2C: Instance> I2cExt<I2C> for I2C {
    fn i2c(
        self,
        config: impl Into<Config>,
        bus_clock: Hertz,
    ) -> Result<I2c<I2C>, TimingError> {
        I2c::new(self, config, bus_clock)
    }
}

impl<I2C: Instance> I2c<I2C> {
    /// Create and initialise a new I2C peripheral.
    ///
    /// The timing registers are derived from `bus_clock`, the frequency of
    /// the APB clock feeding the peripheral. Nothing is programmed if the
    /// requested configuration cannot be met.
    pub fn new(
        i2c: I2C,
        config: impl Into<Config>,
        bus_clock: Hertz,
    ) -> Result<Self, TimingError> {
        let config = config.into();
        let timing =
            Timing::compute(bus_clock, config.frequency, config.duty_cycle)?;

        i2c.enable_clock();

        // Timing can only be changed while the peripheral is disabled
        i2c.set_enabled(false);
        i2c.configure(&timing, config.own_address);
        i2c.set_enabled(true);

        // ACK is held cleared by hardware while PE = 0
        if config.ack {
            i2c.set_ack(true);
        }

        debug!(
            "i2c: scl {} Hz, ccr {}, trise {}",
            config.frequency.raw(),
            timing.divider,
            timing.max_rise_time
        );

        Ok(I2c {
            i2c,
            config,
            timing,
            transfer: None,
        })
    }

    /// Disable the peripheral and release it
    pub fn free(self) -> I2C {
        self.i2c.set_enabled(false);
        self.i2c.disable_clock();
        self.i2c
    }

    /// Configuration the controller was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Timing programmed into the peripheral
    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Current occupancy of the controller
    pub fn state(&self) -> TransferState {
        match &self.transfer {
            None => TransferState::Ready,
            Some(t) if t.direction() == Direction::Write => {
                TransferState::BusyTx
            }
            Some(_) => TransferState::BusyRx,
        }
    }

    #[inline(always)]
    fn ensure_ready(&self) -> Result<(), Error> {
        match self.state() {
            TransferState::Ready => Ok(()),
            state => {
                debug!("i2c: request rejected, controller is {:?}", state);
                Err(Error::Busy)
            }
        }
    }
}

/// Bus transaction primitives
///
/// These infallible methods begin or end parts of a transaction. They do not
/// wait for the peripheral, and they do not check whether a transfer is in
/// flight. Use the blocking or interrupt driven transfers unless you need to
/// build a framing the engines do not provide.
impl<I2C: Instance> I2c<I2C> {
    /// Request a start (or repeated start) condition. The start has been
    /// generated once SR1.SB is set.
    pub fn generate_start(&self) {
        self.i2c.start();
    }

    /// Request a stop condition once the current byte has been transferred.
    pub fn generate_stop(&self) {
        self.i2c.stop();
    }

    /// Send the address byte for `address` and `direction`. Must follow SB.
    pub fn send_address(&self, address: u8, direction: Direction) {
        self.i2c.write_data(address_byte(address, direction));
    }

    /// Clear ADDR by reading SR1 then SR2.
    ///
    /// When receiving a single byte the ACK bit must be cleared before ADDR,
    /// otherwise the peripheral acknowledges the byte and the target goes on
    /// to send a second one.
    pub fn clear_address_ack(&self, single_byte_read: bool) {
        if single_byte_read {
            self.manage_ack(false);
        }
        self.i2c.clear_address();
    }

    /// Set or clear the ACK bit
    pub fn manage_ack(&self, enable: bool) {
        self.i2c.set_ack(enable);
    }

    /// Whether the peripheral is currently the bus controller
    pub fn is_bus_controller(&self) -> bool {
        self.i2c.is_controller()
    }
}

/// Blocking engine
///
/// Every wait polls SR1 until the expected flags are set. There is no
/// timeout unless the configuration sets a poll limit: a target that holds
/// SCL low keeps these methods spinning.
impl<I2C: Instance> I2c<I2C> {
    /// Read SR1, returning the first error flag found. The flag is cleared,
    /// and after an acknowledge failure a stop condition is requested to
    /// release the bus.
    #[inline(always)]
    fn read_status_and_check_errors(&self) -> Result<Status, ProtocolError> {
        let status = self.i2c.status();
        match status.error() {
            None => Ok(status),
            Some(error) => {
                self.i2c.clear_error(error);
                if error == ProtocolError::AckFailure {
                    self.generate_stop();
                }
                Err(error)
            }
        }
    }

    /// Blocks until `ready` holds for SR1
    fn wait_for(&self, ready: impl Fn(&Status) -> bool) -> Result<(), Error> {
        let mut polls: u32 = 0;
        loop {
            let status = self.read_status_and_check_errors()?;
            if ready(&status) {
                return Ok(());
            }

            if let Some(limit) = self.config.poll_limit {
                polls += 1;
                if polls >= limit {
                    warn!("i2c: gave up waiting, status {:?}", status);
                    self.generate_stop();
                    return Err(Error::PollTimeout);
                }
            }
            core::hint::spin_loop();
        }
    }

    /// Start condition and address phase. Returns once ADDR is set; the
    /// caller clears it.
    fn address_phase(
        &self,
        address: u8,
        direction: Direction,
    ) -> Result<(), Error> {
        self.generate_start();
        self.wait_for(|s| s.start)?;

        self.send_address(address, direction);
        match self.wait_for(|s| s.address) {
            Err(Error::Protocol(ProtocolError::AckFailure)) => {
                Err(Error::DeviceNotReady)
            }
            result => result,
        }
    }

    /// Send `bytes` to `address` as a single bus phase
    pub(crate) fn write_from<B>(
        &mut self,
        address: u8,
        bytes: B,
        stop: Stop,
    ) -> Result<(), Error>
    where
        B: IntoIterator<Item = u8>,
    {
        self.address_phase(address, Direction::Write)?;
        self.clear_address_ack(false);

        let mut sent = false;
        for byte in bytes {
            self.wait_for(|s| s.tx_empty)?;
            self.i2c.write_data(byte);
            sent = true;
        }

        // BTF guarantees the final byte has left the shift register
        if sent {
            self.wait_for(|s| s.tx_empty && s.byte_finished)?;
        } else {
            self.wait_for(|s| s.tx_empty)?;
        }

        if stop == Stop::Release {
            self.generate_stop();
        }
        Ok(())
    }

    /// Receive `len` bytes from `address` into `slots`
    pub(crate) fn read_into<'b, S>(
        &mut self,
        address: u8,
        len: usize,
        slots: S,
        stop: Stop,
    ) -> Result<(), Error>
    where
        S: IntoIterator<Item = &'b mut u8>,
    {
        if len == 0 {
            return Ok(());
        }

        let result = self.receive(address, len, slots, stop);

        if self.config.ack {
            self.manage_ack(true);
        }
        result
    }

    fn receive<'b, S>(
        &mut self,
        address: u8,
        len: usize,
        slots: S,
        stop: Stop,
    ) -> Result<(), Error>
    where
        S: IntoIterator<Item = &'b mut u8>,
    {
        self.address_phase(address, Direction::Read)?;
        self.clear_address_ack(len == 1);

        for (slot, remaining) in slots.into_iter().zip((1..=len).rev()) {
            self.wait_for(|s| s.rx_not_empty)?;

            // NACK the last byte
            if remaining == 2 {
                self.manage_ack(false);
            }
            // The stop must be requested before the last byte is read
            if remaining == 1 && stop == Stop::Release {
                self.generate_stop();
            }

            *slot = self.i2c.read_data();
        }
        Ok(())
    }

    /// Write `bytes` to the target at `address`, blocking until the last byte
    /// has been transferred.
    ///
    /// With [`Stop::RepeatStart`] the bus is kept for a following transfer.
    /// An address that is not acknowledged fails with
    /// [`Error::DeviceNotReady`], a data byte that is not acknowledged with
    /// [`ProtocolError::AckFailure`].
    pub fn write_bytes(
        &mut self,
        address: u8,
        bytes: &[u8],
        stop: Stop,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        self.write_from(address, bytes.iter().copied(), stop)
    }

    /// Fill `buffer` with bytes read from the target at `address`, blocking
    /// until the last byte has been received.
    ///
    /// The last byte is not acknowledged. With [`Stop::Release`] the stop is
    /// requested before the last byte is read from the data register.
    pub fn read_bytes(
        &mut self,
        address: u8,
        buffer: &mut [u8],
        stop: Stop,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        let len = buffer.len();
        self.read_into(address, len, buffer.iter_mut(), stop)
    }

    /// Check whether the target at `address` acknowledges its address.
    ///
    /// Issues an address-only write followed by a stop. Fails with
    /// [`Error::DeviceNotReady`] if the address is not acknowledged, which is
    /// how an EEPROM signals an internal write cycle in progress.
    pub fn probe(&mut self, address: u8) -> Result<(), Error> {
        self.ensure_ready()?;
        self.write_from(address, core::iter::empty(), Stop::Release)
    }
}
