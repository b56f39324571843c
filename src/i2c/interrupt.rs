//! Interrupt driven transfers
//!
//! A transfer is started from thread mode and then advanced one step per
//! event interrupt. It works directly on a `'static` buffer lent by the
//! caller, so a request may be as long as the buffer. The buffer is handed
//! back with the completion event, or by the error interrupt when the
//! transfer is abandoned.

use super::{Direction, Error, I2c, Instance, Interrupt, ProtocolError, Stop};

/// Buffer lent to an interrupt driven transfer
#[derive(Debug, PartialEq, Eq)]
pub enum Buffer {
    /// Bytes to send
    Write(&'static [u8]),
    /// Storage for the bytes to receive
    Read(&'static mut [u8]),
}

impl Buffer {
    fn len(&self) -> usize {
        match self {
            Buffer::Write(bytes) => bytes.len(),
            Buffer::Read(slots) => slots.len(),
        }
    }
}

/// Completion of an interrupt driven transfer
#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// All bytes of a write were transferred
    TxComplete(&'static [u8]),
    /// The buffer of a read has been filled
    RxComplete(&'static mut [u8]),
}

/// Error flags serviced by one call of the error interrupt handler
pub type Errors = heapless::Vec<ProtocolError, 5>;

/// Outcome of one call of the error interrupt handler
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Flags found and cleared, in service order
    pub errors: Errors,
    /// Buffer of the transfer these errors abandoned
    pub buffer: Option<Buffer>,
}

/// An interrupt driven transfer in flight
#[derive(Debug)]
pub(super) struct Transfer {
    address: u8,
    buffer: Buffer,
    /// Next byte to send or receive
    cursor: usize,
    stop: Stop,
}

impl Transfer {
    pub(super) fn direction(&self) -> Direction {
        match self.buffer {
            Buffer::Write(_) => Direction::Write,
            Buffer::Read(_) => Direction::Read,
        }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    fn into_event(self) -> Event {
        match self.buffer {
            Buffer::Write(bytes) => Event::TxComplete(bytes),
            Buffer::Read(slots) => Event::RxComplete(slots),
        }
    }
}

impl<I2C: Instance> I2c<I2C> {
    /// Start an interrupt driven write of `bytes` to `address`.
    ///
    /// Returns once the start condition has been requested. Completion is
    /// reported by [`handle_event_interrupt`](I2c::handle_event_interrupt)
    /// as [`Event::TxComplete`].
    ///
    /// Fails with [`Error::Busy`] while another transfer is in flight and
    /// with [`Error::InvalidLength`] if `bytes` is empty. A rejected request
    /// does not touch the peripheral.
    pub fn start_write(
        &mut self,
        address: u8,
        bytes: &'static [u8],
        stop: Stop,
    ) -> Result<(), Error> {
        self.ensure_ready()?;
        if bytes.is_empty() {
            return Err(Error::InvalidLength);
        }

        self.start_transfer(Transfer {
            address,
            buffer: Buffer::Write(bytes),
            cursor: 0,
            stop,
        });
        Ok(())
    }

    /// Start an interrupt driven read from `address` that fills `buffer`.
    ///
    /// Completion is reported by
    /// [`handle_event_interrupt`](I2c::handle_event_interrupt) as
    /// [`Event::RxComplete`] carrying the filled buffer. A rejected request
    /// hands `buffer` back along with the error.
    pub fn start_read(
        &mut self,
        address: u8,
        buffer: &'static mut [u8],
        stop: Stop,
    ) -> Result<(), (Error, &'static mut [u8])> {
        if let Err(error) = self.ensure_ready() {
            return Err((error, buffer));
        }
        if buffer.is_empty() {
            return Err((Error::InvalidLength, buffer));
        }

        self.start_transfer(Transfer {
            address,
            buffer: Buffer::Read(buffer),
            cursor: 0,
            stop,
        });
        Ok(())
    }

    fn start_transfer(&mut self, transfer: Transfer) {
        trace!(
            "i2c: start {:?} of {} bytes at {}",
            transfer.direction(),
            transfer.buffer.len(),
            transfer.address
        );
        self.transfer = Some(transfer);

        self.generate_start();
        self.i2c.set_interrupt(Interrupt::Buffer, true);
        self.i2c.set_interrupt(Interrupt::Event, true);
        self.i2c.set_interrupt(Interrupt::Error, true);
    }

    /// Silence the event interrupts and restore ACK. Leaves the error
    /// interrupt enabled.
    fn close_transfer(&mut self) {
        self.i2c.set_interrupt(Interrupt::Buffer, false);
        self.i2c.set_interrupt(Interrupt::Event, false);
        if self.config.ack {
            self.manage_ack(true);
        }
    }

    /// Advance the transfer in flight. Call from the I2Cx_EV interrupt.
    ///
    /// Returns the completion event once the last byte has been handled, and
    /// `None` for every intermediate step or when event interrupts are not
    /// enabled.
    pub fn handle_event_interrupt(&mut self) -> Option<Event> {
        if !self.i2c.is_listening(Interrupt::Event) {
            return None;
        }

        let Some(mut transfer) = self.transfer.take() else {
            // Nothing to drive, silence the interrupt
            self.i2c.set_interrupt(Interrupt::Buffer, false);
            self.i2c.set_interrupt(Interrupt::Event, false);
            return None;
        };

        let status = self.i2c.status();
        let buffer_events = self.i2c.is_listening(Interrupt::Buffer);
        let remaining = transfer.remaining();
        let mut done = false;

        if status.start {
            self.send_address(transfer.address, transfer.direction());
        } else if status.address {
            let single_byte_read = matches!(
                &transfer.buffer,
                Buffer::Read(slots) if slots.len() == 1
            );
            self.clear_address_ack(single_byte_read);
        } else {
            match &mut transfer.buffer {
                Buffer::Write(bytes) => {
                    if status.tx_empty
                        && status.byte_finished
                        && remaining == 0
                    {
                        if transfer.stop == Stop::Release {
                            self.generate_stop();
                        }
                        done = true;
                    } else if status.tx_empty && buffer_events {
                        if remaining > 0 {
                            self.i2c.write_data(bytes[transfer.cursor]);
                            transfer.cursor += 1;
                        } else {
                            // Only BTF is left to wait for
                            self.i2c.set_interrupt(Interrupt::Buffer, false);
                        }
                    }
                }
                Buffer::Read(slots) => {
                    if status.rx_not_empty && buffer_events {
                        if remaining == 2 {
                            self.manage_ack(false);
                        }
                        if remaining == 1 && transfer.stop == Stop::Release {
                            self.generate_stop();
                        }

                        slots[transfer.cursor] = self.i2c.read_data();
                        transfer.cursor += 1;
                        done = transfer.cursor == slots.len();
                    }
                }
            }
        }

        if done {
            self.close_transfer();
            trace!("i2c: {:?} complete", transfer.direction());
            return Some(transfer.into_event());
        }

        self.transfer = Some(transfer);
        None
    }

    /// Service the error flags. Call from the I2Cx_ER interrupt.
    ///
    /// Every flag found is cleared and returned. If a transfer is in flight
    /// it is abandoned, its buffer is handed back and the controller returns
    /// to [`TransferState::Ready`](super::TransferState::Ready); after an
    /// acknowledge failure a stop condition is requested as well.
    pub fn handle_error_interrupt(&mut self) -> ErrorEvent {
        let mut event = ErrorEvent::default();
        if !self.i2c.is_listening(Interrupt::Error) {
            return event;
        }

        for error in self.i2c.status().errors() {
            self.i2c.clear_error(error);
            warn!("i2c: {:?}", error);
            // One slot per flag
            let _ = event.errors.push(error);
        }
        interrupt_clear_clock_sync_delay!(
            self.i2c.is_listening(Interrupt::Error)
        );

        if event.errors.is_empty() {
            return event;
        }
        if let Some(transfer) = self.transfer.take() {
            if event.errors.contains(&ProtocolError::AckFailure) {
                self.generate_stop();
            }
            self.close_transfer();
            event.buffer = Some(transfer.buffer);
        }
        event
    }
}
