use embedded_hal::i2c;

use super::*;

impl i2c::Error for Error {
    fn kind(&self) -> i2c::ErrorKind {
        match self {
            Error::DeviceNotReady => i2c::ErrorKind::NoAcknowledge(
                i2c::NoAcknowledgeSource::Address,
            ),
            Error::Protocol(ProtocolError::AckFailure) => {
                i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Data)
            }
            Error::Protocol(ProtocolError::Bus) => i2c::ErrorKind::Bus,
            Error::Protocol(ProtocolError::ArbitrationLost) => {
                i2c::ErrorKind::ArbitrationLoss
            }
            Error::Protocol(ProtocolError::Overrun) => i2c::ErrorKind::Overrun,
            _ => i2c::ErrorKind::Other,
        }
    }
}

impl<I2C> i2c::ErrorType for I2c<I2C> {
    type Error = Error;
}

trait OperationExt {
    fn direction(&self) -> Direction;
    fn length(&self) -> usize;
    fn outgoing(&self) -> &[u8];
    fn incoming(&mut self) -> &mut [u8];
}

impl OperationExt for i2c::Operation<'_> {
    fn direction(&self) -> Direction {
        match self {
            Self::Read(_) => Direction::Read,
            Self::Write(_) => Direction::Write,
        }
    }

    fn length(&self) -> usize {
        match self {
            Self::Read(b) => b.len(),
            Self::Write(b) => b.len(),
        }
    }

    fn outgoing(&self) -> &[u8] {
        match self {
            Self::Write(b) => b,
            Self::Read(_) => &[],
        }
    }

    fn incoming(&mut self) -> &mut [u8] {
        match self {
            Self::Read(b) => b,
            Self::Write(_) => Default::default(),
        }
    }
}

impl<I2C: Instance> I2c<I2C> {
    /// Run `operations` as one bus transaction.
    ///
    /// Adjacent operations of the same direction are merged into a single
    /// bus phase. Each change of direction is a repeated start, and the last
    /// phase ends with a stop.
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Error> {
        self.ensure_ready()?;

        let mut first = 0;
        while first < operations.len() {
            let kind = core::mem::discriminant(&operations[first]);
            let end = operations[first..]
                .iter()
                .position(|op| core::mem::discriminant(op) != kind)
                .map_or(operations.len(), |n| first + n);
            let stop = if end == operations.len() {
                Stop::Release
            } else {
                Stop::RepeatStart
            };

            let group = &mut operations[first..end];
            match group[0].direction() {
                Direction::Write => {
                    let bytes = group
                        .iter()
                        .flat_map(|op| op.outgoing().iter().copied());
                    self.write_from(address, bytes, stop)?;
                }
                Direction::Read => {
                    let len: usize = group.iter().map(|op| op.length()).sum();
                    if len == 0 && first > 0 && stop == Stop::Release {
                        // Nothing to read, but the bus is still held
                        self.generate_stop();
                    }
                    let slots = group
                        .iter_mut()
                        .flat_map(|op| op.incoming().iter_mut());
                    self.read_into(address, len, slots, stop)?;
                }
            }

            first = end;
        }

        Ok(())
    }
}

impl<I2C: Instance> i2c::I2c<i2c::SevenBitAddress> for I2c<I2C> {
    fn transaction(
        &mut self,
        address: i2c::SevenBitAddress,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        I2c::transaction(self, address, operations)
    }
}
