use crate::time::Hertz;

/// Fast-mode SCL duty cycle (t_low / t_high)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyCycle {
    /// t_low / t_high = 2
    Ratio2to1,
    /// t_low / t_high = 16 / 9
    Ratio16to9,
}

/// A structure for specifying the I2C controller configuration
///
/// This structure uses the builder pattern to generate the configuration:
///
/// ```
/// let config = Config::new(400.kHz()).duty_cycle(DutyCycle::Ratio16to9);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Requested SCL frequency. At or below 100kHz the peripheral runs in
    /// standard mode, above that in fast mode.
    pub(crate) frequency: Hertz,
    /// Fast mode duty cycle. Ignored in standard mode.
    pub(crate) duty_cycle: DutyCycle,
    /// 7-bit own address, programmed into OAR1
    pub(crate) own_address: u8,
    /// Whether the ACK bit is set while idle
    pub(crate) ack: bool,
    /// Number of status polls a blocking wait may spend before giving up
    pub(crate) poll_limit: Option<u32>,
}

impl Config {
    /// Create a default configuration for the given SCL frequency: 2:1 duty
    /// cycle, own address 0, ACK enabled and unbounded blocking waits.
    pub const fn new(frequency: Hertz) -> Self {
        Config {
            frequency,
            duty_cycle: DutyCycle::Ratio2to1,
            own_address: 0,
            ack: true,
            poll_limit: None,
        }
    }

    /// Select the SCL duty cycle used in fast mode.
    pub const fn duty_cycle(mut self, duty_cycle: DutyCycle) -> Self {
        self.duty_cycle = duty_cycle;
        self
    }

    /// Set the 7-bit own address. The address should be specified unshifted.
    pub const fn own_address(mut self, own_address: u8) -> Self {
        self.own_address = own_address & 0x7F;
        self
    }

    /// Whether the peripheral acknowledges received bytes by default. The
    /// receive paths clear ACK around the final byte and restore this setting
    /// afterwards.
    pub const fn ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    /// Bound every blocking wait to `polls` reads of the status register.
    ///
    /// Without a bound a target that never answers keeps the blocking engine
    /// spinning forever. With a bound the wait ends with
    /// [`Error::PollTimeout`](super::Error::PollTimeout).
    pub const fn poll_limit(mut self, polls: u32) -> Self {
        self.poll_limit = Some(polls);
        self
    }

    /// SCL frequency requested by this configuration
    pub const fn frequency(&self) -> Hertz {
        self.frequency
    }
}

impl From<Hertz> for Config {
    fn from(frequency: Hertz) -> Self {
        Config::new(frequency)
    }
}
