//! Simulated I2C v1 peripheral and bus targets for host tests.
//!
//! The model follows the flag sequencing of the reference manual closely
//! enough to exercise the controller's ordering rules. Every observable bus
//! action is appended to an operation log that tests inspect.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Instance, Interrupt, ProtocolError, Status, Timing};

/// A bus action observed by the simulated peripheral
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Start,
    Stop,
    /// CR1.ACK changed to the given value
    Ack(bool),
    /// Address byte sent after a start
    Address(u8),
    /// Data byte sent to the target
    Write(u8),
    /// Data byte taken out of DR
    Read(u8),
    /// ADDR cleared by the SR1, SR2 read sequence
    ClearAddr,
    /// BTF first reported after the last byte written
    ByteFinished,
    /// rc_w0 error flag cleared
    ClearError(ProtocolError),
}

/// A target on the simulated bus
pub trait Device {
    fn address(&self) -> u8;
    /// Whether the target ignores its address right now
    fn busy(&mut self) -> bool {
        false
    }
    fn begin(&mut self, read: bool);
    /// Accept a byte. Returns false to not acknowledge it.
    fn write(&mut self, byte: u8) -> bool;
    fn read(&mut self) -> u8;
    fn stop(&mut self);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Started,
    /// Address acknowledged, ADDR set
    Addressed { read: bool },
    /// Address not acknowledged, waiting for a stop
    Rejected,
    Transmit,
    Receive,
}

struct State {
    enabled: bool,
    ack: bool,
    configured: Option<(Timing, u8)>,
    buffer_interrupt: bool,
    event_interrupt: bool,
    error_interrupt: bool,
    errors: Vec<ProtocolError>,
    phase: Phase,
    /// Byte waiting in DR, and whether it was acknowledged
    latched: Option<(u8, bool)>,
    /// Status reads taken to shift one byte out
    byte_time: u32,
    /// Status reads left before the byte in the shift register is out
    shifting: u32,
    /// A byte was written since the address phase
    sent: bool,
    finished_reported: bool,
    stalled: bool,
    selected: Option<usize>,
    devices: Vec<Rc<RefCell<dyn Device>>>,
    ops: Vec<Op>,
}

impl State {
    fn device(&self) -> Option<Rc<RefCell<dyn Device>>> {
        self.selected.map(|i| self.devices[i].clone())
    }

    fn latch_next(&mut self) {
        let byte = match self.device() {
            Some(device) => device.borrow_mut().read(),
            None => 0xFF,
        };
        self.latched = Some((byte, self.ack));
    }

    fn raise(&mut self, error: ProtocolError) {
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    fn status(&mut self) -> Status {
        let mut status = Status {
            bus_error: self.errors.contains(&ProtocolError::Bus),
            arbitration_lost: self
                .errors
                .contains(&ProtocolError::ArbitrationLost),
            ack_failure: self.errors.contains(&ProtocolError::AckFailure),
            overrun: self.errors.contains(&ProtocolError::Overrun),
            timeout: self.errors.contains(&ProtocolError::Timeout),
            ..Status::default()
        };
        if self.stalled {
            return status;
        }

        match self.phase {
            Phase::Started => status.start = true,
            Phase::Addressed { .. } => status.address = true,
            Phase::Transmit => {
                status.tx_empty = true;
                if self.shifting > 0 {
                    self.shifting -= 1;
                } else if self.sent {
                    status.byte_finished = true;
                    if !self.finished_reported {
                        self.finished_reported = true;
                        self.ops.push(Op::ByteFinished);
                    }
                }
            }
            _ => {}
        }
        status.rx_not_empty = self.latched.is_some();
        status
    }

    fn clear_address(&mut self) {
        if let Phase::Addressed { read } = self.phase {
            self.ops.push(Op::ClearAddr);
            if read {
                self.phase = Phase::Receive;
                self.latch_next();
            } else {
                self.phase = Phase::Transmit;
            }
        }
    }

    fn read_data(&mut self) -> u8 {
        let Some((byte, acked)) = self.latched.take() else {
            return 0;
        };
        self.ops.push(Op::Read(byte));
        if acked && self.phase == Phase::Receive {
            self.latch_next();
        }
        byte
    }

    fn write_data(&mut self, byte: u8) {
        match self.phase {
            Phase::Started => {
                self.ops.push(Op::Address(byte));
                let read = byte & 1 != 0;
                let target = self
                    .devices
                    .iter()
                    .position(|d| d.borrow().address() == byte >> 1);
                let answered = match target {
                    Some(i) => !self.devices[i].borrow_mut().busy(),
                    None => false,
                };
                if let (Some(i), true) = (target, answered) {
                    self.selected = Some(i);
                    self.devices[i].borrow_mut().begin(read);
                    self.phase = Phase::Addressed { read };
                } else {
                    self.raise(ProtocolError::AckFailure);
                    self.phase = Phase::Rejected;
                }
            }
            Phase::Transmit => {
                self.ops.push(Op::Write(byte));
                self.sent = true;
                self.shifting = self.byte_time;
                self.finished_reported = false;
                let acked = match self.device() {
                    Some(device) => device.borrow_mut().write(byte),
                    None => false,
                };
                if !acked {
                    self.raise(ProtocolError::AckFailure);
                }
            }
            _ => self.ops.push(Op::Write(byte)),
        }
    }

    fn start(&mut self) {
        self.ops.push(Op::Start);
        self.latched = None;
        self.sent = false;
        self.shifting = 0;
        self.phase = Phase::Started;
    }

    fn stop(&mut self) {
        self.ops.push(Op::Stop);
        if let Some(device) = self.device() {
            device.borrow_mut().stop();
        }
        self.selected = None;
        self.phase = Phase::Idle;
    }
}

/// Handle to a simulated peripheral. Clones share the same state, so a test
/// keeps one handle while the controller owns another.
#[derive(Clone)]
pub struct MockI2c(Rc<RefCell<State>>);

impl core::fmt::Debug for MockI2c {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("MockI2c")
    }
}

impl MockI2c {
    pub fn new() -> Self {
        MockI2c(Rc::new(RefCell::new(State {
            enabled: false,
            ack: false,
            configured: None,
            buffer_interrupt: false,
            event_interrupt: false,
            error_interrupt: false,
            errors: Vec::new(),
            phase: Phase::Idle,
            latched: None,
            byte_time: 1,
            shifting: 0,
            sent: false,
            finished_reported: false,
            stalled: false,
            selected: None,
            devices: Vec::new(),
            ops: Vec::new(),
        })))
    }

    /// Put a target on the bus, returning a handle for inspecting it
    pub fn attach<D: Device + 'static>(&self, device: D) -> Rc<RefCell<D>> {
        let device = Rc::new(RefCell::new(device));
        self.0.borrow_mut().devices.push(device.clone());
        device
    }

    pub fn ops(&self) -> Vec<Op> {
        self.0.borrow().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.0.borrow_mut().ops.clear();
    }

    /// Index of the first occurrence of `op` in the log
    pub fn position(&self, op: &Op) -> Option<usize> {
        self.0.borrow().ops.iter().position(|o| o == op)
    }

    /// Timing and own address last programmed
    pub fn configured(&self) -> Option<(Timing, u8)> {
        self.0.borrow().configured
    }

    /// CR1.PE
    pub fn enabled(&self) -> bool {
        self.0.borrow().enabled
    }

    /// CR1.ACK
    pub fn ack_enabled(&self) -> bool {
        self.0.borrow().ack
    }

    /// Error flags currently set in SR1
    pub fn errors(&self) -> Vec<ProtocolError> {
        self.0.borrow().errors.clone()
    }

    /// Set an error flag in SR1, as the hardware would on a bus fault
    pub fn raise(&self, error: ProtocolError) {
        self.0.borrow_mut().raise(error);
    }

    /// Number of status reads between a DR write and BTF
    pub fn set_byte_time(&self, reads: u32) {
        self.0.borrow_mut().byte_time = reads;
    }

    /// Freeze the event flags, as if SCL were held low
    pub fn stall(&self, stalled: bool) {
        self.0.borrow_mut().stalled = stalled;
    }
}

impl crate::Sealed for MockI2c {}

impl Instance for MockI2c {
    fn configure(&self, timing: &Timing, own_address: u8) {
        self.0.borrow_mut().configured = Some((*timing, own_address));
    }

    fn set_enabled(&self, enable: bool) {
        self.0.borrow_mut().enabled = enable;
    }

    fn start(&self) {
        self.0.borrow_mut().start();
    }

    fn stop(&self) {
        self.0.borrow_mut().stop();
    }

    fn set_ack(&self, enable: bool) {
        let mut state = self.0.borrow_mut();
        if state.ack != enable {
            state.ops.push(Op::Ack(enable));
        }
        state.ack = enable;
    }

    fn write_data(&self, byte: u8) {
        self.0.borrow_mut().write_data(byte);
    }

    fn read_data(&self) -> u8 {
        self.0.borrow_mut().read_data()
    }

    fn status(&self) -> Status {
        self.0.borrow_mut().status()
    }

    fn clear_address(&self) {
        self.0.borrow_mut().clear_address();
    }

    fn clear_error(&self, error: ProtocolError) {
        let mut state = self.0.borrow_mut();
        if let Some(i) = state.errors.iter().position(|e| *e == error) {
            state.errors.remove(i);
            state.ops.push(Op::ClearError(error));
        }
    }

    fn is_controller(&self) -> bool {
        self.0.borrow().phase != Phase::Idle
    }

    fn set_interrupt(&self, interrupt: Interrupt, enable: bool) {
        let mut state = self.0.borrow_mut();
        match interrupt {
            Interrupt::Buffer => state.buffer_interrupt = enable,
            Interrupt::Event => state.event_interrupt = enable,
            Interrupt::Error => state.error_interrupt = enable,
        }
    }

    fn is_listening(&self, interrupt: Interrupt) -> bool {
        let state = self.0.borrow();
        match interrupt {
            Interrupt::Buffer => state.buffer_interrupt,
            Interrupt::Event => state.event_interrupt,
            Interrupt::Error => state.error_interrupt,
        }
    }
}

/// 24-series EEPROM with a two byte address pointer
pub struct Eeprom24 {
    pub address: u8,
    pub page_size: usize,
    pub memory: Vec<u8>,
    pointer: usize,
    /// Bytes received in the current write, pointer included
    received: usize,
    /// First data address and length of every completed write
    pub writes: Vec<(usize, usize)>,
    /// A write wrapped inside a page
    pub page_wrapped: bool,
    /// Number of address polls ignored after a write
    pub busy_polls: usize,
    busy: usize,
    /// Stop acknowledging after this many bytes of a write
    pub nack_data_after: Option<usize>,
    write_start: usize,
}

impl Eeprom24 {
    pub fn new(address: u8, busy_polls: usize) -> Self {
        Eeprom24 {
            address,
            page_size: 32,
            memory: vec![0xFF; 4096],
            pointer: 0,
            received: 0,
            writes: Vec::new(),
            page_wrapped: false,
            busy_polls,
            busy: 0,
            nack_data_after: None,
            write_start: 0,
        }
    }
}

impl Device for Eeprom24 {
    fn address(&self) -> u8 {
        self.address
    }

    fn busy(&mut self) -> bool {
        if self.busy > 0 {
            self.busy -= 1;
            true
        } else {
            false
        }
    }

    fn begin(&mut self, read: bool) {
        if !read {
            self.received = 0;
        }
    }

    fn write(&mut self, byte: u8) -> bool {
        if let Some(limit) = self.nack_data_after {
            if self.received >= limit {
                return false;
            }
        }
        let len = self.memory.len();
        match self.received {
            0 => self.pointer = ((byte as usize) << 8) % len,
            1 => {
                self.pointer = (self.pointer | byte as usize) % len;
                self.write_start = self.pointer;
            }
            _ => {
                let page = self.pointer - self.pointer % self.page_size;
                let offset = self.received - 2;
                let start = self.write_start % self.page_size;
                if start + offset >= self.page_size {
                    self.page_wrapped = true;
                }
                let address = page + (start + offset) % self.page_size;
                self.memory[address] = byte;
            }
        }
        self.received += 1;
        true
    }

    fn read(&mut self) -> u8 {
        let byte = self.memory[self.pointer];
        self.pointer = (self.pointer + 1) % self.memory.len();
        byte
    }

    fn stop(&mut self) {
        if self.received > 2 {
            self.writes.push((self.write_start, self.received - 2));
            self.busy = self.busy_polls;
        }
        self.received = 0;
    }
}

/// Register file of a DS1307 real-time clock
pub struct Rtc1307 {
    pub registers: [u8; 64],
    pointer: usize,
    received: usize,
}

impl Rtc1307 {
    pub fn new() -> Self {
        Rtc1307 {
            registers: [0; 64],
            pointer: 0,
            received: 0,
        }
    }
}

impl Device for Rtc1307 {
    fn address(&self) -> u8 {
        0x68
    }

    fn begin(&mut self, read: bool) {
        if !read {
            self.received = 0;
        }
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.received == 0 {
            self.pointer = byte as usize % self.registers.len();
        } else {
            self.registers[self.pointer] = byte;
            self.pointer = (self.pointer + 1) % self.registers.len();
        }
        self.received += 1;
        true
    }

    fn read(&mut self) -> u8 {
        let byte = self.registers[self.pointer];
        self.pointer = (self.pointer + 1) % self.registers.len();
        byte
    }

    fn stop(&mut self) {
        self.received = 0;
    }
}
