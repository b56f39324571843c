//! Paged I2C EEPROM used as an append-only sample log
//!
//! Writes are split so that no bus transaction crosses a page boundary, and
//! each transaction is framed as a big-endian two byte address followed by
//! the data. Appends go to a cursor that walks a configurable address range
//! and wraps back to its start once the end is reached.
//!
//! The EEPROM does not answer its address while an internal write cycle is
//! running. Before every transaction the adapter probes the address until it
//! is acknowledged, waiting between attempts.
//!
//! ```
//! let mut log = Eeprom::new(i2c, delay, EepromConfig::at24c32());
//! log.append(&sample)?;
//! log.read(0x0000, &mut page)?;
//! ```

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};

use crate::policy::ErrorPolicy;

/// Largest page the adapter can frame in one transaction
pub const MAX_PAGE_SIZE: u16 = 64;

/// EEPROM error
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus reported an error
    I2c(E),
    /// The device did not acknowledge its address within the configured
    /// number of attempts
    DeviceNotReady,
    /// The requested range is outside the configured address range
    OutOfRange,
}

/// Geometry and readiness polling of an EEPROM
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EepromConfig {
    /// 7-bit bus address
    pub address: u8,
    /// Write page size in bytes
    pub page_size: u16,
    /// First address of the log range
    pub start: u16,
    /// End of the log range, exclusive
    pub end: u16,
    /// Address probes to spend on a busy device before giving up
    pub ready_attempts: u32,
    /// Wait between two address probes
    pub ready_poll_us: u32,
}

impl EepromConfig {
    /// AT24C32: 4 KiB, 32 byte pages, address 0x50
    pub const fn at24c32() -> Self {
        EepromConfig {
            address: 0x50,
            page_size: 32,
            start: 0x0000,
            end: 0x1000,
            ready_attempts: 20,
            ready_poll_us: 1_000,
        }
    }
}

impl Default for EepromConfig {
    fn default() -> Self {
        Self::at24c32()
    }
}

/// Append position within the range `[start, end)`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EepromCursor {
    start: u16,
    end: u16,
    current: u16,
}

impl EepromCursor {
    /// A cursor at the start of `[start, end)`
    ///
    /// # Panics
    ///
    /// Panics if the range is empty.
    pub const fn new(start: u16, end: u16) -> Self {
        assert!(start < end, "empty cursor range");
        EepromCursor {
            start,
            end,
            current: start,
        }
    }

    /// Address the next append starts at
    pub const fn position(&self) -> u16 {
        self.current
    }

    /// Move to `address`. An address outside the range moves the cursor
    /// back to the start of the range.
    pub fn seek(&mut self, address: u16) {
        self.current = if (self.start..self.end).contains(&address) {
            address
        } else {
            self.start
        };
    }

    /// Move forward by `len` bytes, wrapping at the end of the range
    pub fn advance(&mut self, len: usize) {
        let span = (self.end - self.start) as usize;
        let offset = (self.current - self.start) as usize + len;
        self.current = self.start + (offset % span) as u16;
    }

    /// Split an append of `len` bytes from the current position into
    /// transactions that neither cross a page boundary nor the end of the
    /// range. The cursor itself is not moved.
    pub fn chunks(&self, page_size: u16, len: usize) -> Chunks {
        Chunks {
            cursor: *self,
            page_size,
            remaining: len,
        }
    }
}

/// One write transaction of an append
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chunk {
    pub address: u16,
    pub len: usize,
}

/// Iterator returned by [`EepromCursor::chunks`]
#[derive(Clone, Debug)]
pub struct Chunks {
    cursor: EepromCursor,
    page_size: u16,
    remaining: usize,
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 || self.page_size == 0 {
            return None;
        }

        let address = self.cursor.current;
        let to_page_end = (self.page_size - address % self.page_size) as usize;
        let to_range_end = (self.cursor.end - address) as usize;
        let len = self.remaining.min(to_page_end).min(to_range_end);

        self.cursor.advance(len);
        self.remaining -= len;
        Some(Chunk { address, len })
    }
}

/// Paged EEPROM on an I2C bus
pub struct Eeprom<I2C, D> {
    i2c: I2C,
    delay: D,
    config: EepromConfig,
    cursor: EepromCursor,
    policy: ErrorPolicy,
}

impl<I2C: I2c, D: DelayNs> Eeprom<I2C, D> {
    /// Create an adapter with the cursor at the start of the range
    ///
    /// # Panics
    ///
    /// Panics if the page size is zero or above [`MAX_PAGE_SIZE`], or if the
    /// range is empty.
    pub fn new(i2c: I2C, delay: D, config: EepromConfig) -> Self {
        assert!(
            config.page_size > 0 && config.page_size <= MAX_PAGE_SIZE,
            "unsupported page size"
        );
        Eeprom {
            i2c,
            delay,
            config,
            cursor: EepromCursor::new(config.start, config.end),
            policy: ErrorPolicy::default(),
        }
    }

    /// Select how failed operations are handled
    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &EepromConfig {
        &self.config
    }

    /// Current append position
    pub fn cursor(&self) -> EepromCursor {
        self.cursor
    }

    /// Move the append position, for instance to resume a log after reset
    pub fn set_cursor(&mut self, address: u16) {
        self.cursor.seek(address);
    }

    /// Write `data` at the cursor and advance it.
    ///
    /// The data is written one page-bounded chunk per transaction, waiting
    /// for the device to finish the previous write cycle before each one. If
    /// a chunk fails the cursor stays after the last chunk that was written.
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        let result = self.write_chunks(data);
        self.policy.apply("eeprom append", result)
    }

    fn write_chunks(&mut self, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        let mut offset = 0;
        for chunk in self.cursor.chunks(self.config.page_size, data.len()) {
            self.poll_ready()?;

            let mut frame =
                heapless::Vec::<u8, { MAX_PAGE_SIZE as usize + 2 }>::new();
            // A chunk never exceeds the page size
            let _ = frame.extend_from_slice(&chunk.address.to_be_bytes());
            let _ = frame.extend_from_slice(&data[offset..offset + chunk.len]);

            trace!("eeprom: write {} bytes at {}", chunk.len, chunk.address);
            self.i2c
                .write(self.config.address, &frame)
                .map_err(Error::I2c)?;

            self.cursor.advance(chunk.len);
            offset += chunk.len;
        }
        Ok(())
    }

    /// Fill `buffer` from `address`. The address pointer is sent first and
    /// the data is read after a repeated start.
    pub fn read(
        &mut self,
        address: u16,
        buffer: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        let result = self.read_at(address, buffer);
        self.policy.apply("eeprom read", result)
    }

    fn read_at(
        &mut self,
        address: u16,
        buffer: &mut [u8],
    ) -> Result<(), Error<I2C::Error>> {
        let end = address as usize + buffer.len();
        if address < self.config.start || end > self.config.end as usize {
            return Err(Error::OutOfRange);
        }

        self.poll_ready()?;
        self.i2c
            .write_read(self.config.address, &address.to_be_bytes(), buffer)
            .map_err(Error::I2c)
    }

    /// Block until the device acknowledges its address
    pub fn wait_ready(&mut self) -> Result<(), Error<I2C::Error>> {
        let result = self.poll_ready();
        self.policy.apply("eeprom ready", result)
    }

    fn poll_ready(&mut self) -> Result<(), Error<I2C::Error>> {
        for _ in 0..self.config.ready_attempts {
            match self.i2c.write(self.config.address, &[]) {
                Ok(()) => return Ok(()),
                Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => {
                    self.delay.delay_us(self.config.ready_poll_us);
                }
                Err(e) => return Err(Error::I2c(e)),
            }
        }

        warn!(
            "eeprom: no answer after {} polls",
            self.config.ready_attempts
        );
        Err(Error::DeviceNotReady)
    }

    /// Release the bus and the delay
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}
