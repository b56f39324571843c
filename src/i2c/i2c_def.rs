use cortex_m::interrupt;

use crate::stm32::{I2C1, I2C2, I2C3, RCC};

use super::{Instance, Interrupt, ProtocolError, Status, Timing};

/// OAR1 bit 14 has no field and must be kept at 1 by software
const OAR1_RESERVED: u16 = 1 << 14;

// Implemented by all I2C instances
macro_rules! i2c {
    ($($I2CX:ident),+) => {
        $(
            paste::item! {
                impl Instance for $I2CX {
                    #[allow(unused_unsafe)]
                    fn configure(&self, timing: &Timing, own_address: u8) {
                        self.cr2().modify(|_, w| unsafe {
                            w.freq().bits(timing.freq_mhz)
                        });
                        self.oar1().write(|w| unsafe {
                            w.bits(OAR1_RESERVED).add7().bits(own_address)
                        });
                        self.ccr().write(|w| unsafe {
                            w.f_s()
                                .bit(timing.fast_mode())
                                .duty()
                                .bit(timing.duty_16_9())
                                .ccr()
                                .bits(timing.divider)
                        });
                        self.trise().write(|w| unsafe {
                            w.trise().bits(timing.max_rise_time)
                        });
                    }

                    #[inline(always)]
                    fn set_enabled(&self, enable: bool) {
                        self.cr1().modify(|_, w| w.pe().bit(enable));
                    }

                    #[inline(always)]
                    fn start(&self) {
                        self.cr1().modify(|_, w| w.start().set_bit());
                    }

                    #[inline(always)]
                    fn stop(&self) {
                        self.cr1().modify(|_, w| w.stop().set_bit());
                    }

                    #[inline(always)]
                    fn set_ack(&self, enable: bool) {
                        self.cr1().modify(|_, w| w.ack().bit(enable));
                    }

                    #[inline(always)]
                    #[allow(unused_unsafe)]
                    fn write_data(&self, byte: u8) {
                        self.dr().write(|w| unsafe { w.dr().bits(byte) });
                    }

                    #[inline(always)]
                    fn read_data(&self) -> u8 {
                        self.dr().read().dr().bits()
                    }

                    #[inline(always)]
                    fn status(&self) -> Status {
                        let sr1 = self.sr1().read();
                        Status {
                            start: sr1.sb().bit_is_set(),
                            address: sr1.addr().bit_is_set(),
                            byte_finished: sr1.btf().bit_is_set(),
                            rx_not_empty: sr1.rx_ne().bit_is_set(),
                            tx_empty: sr1.tx_e().bit_is_set(),
                            bus_error: sr1.berr().bit_is_set(),
                            arbitration_lost: sr1.arlo().bit_is_set(),
                            ack_failure: sr1.af().bit_is_set(),
                            overrun: sr1.ovr().bit_is_set(),
                            timeout: sr1.timeout().bit_is_set(),
                        }
                    }

                    #[inline(always)]
                    fn clear_address(&self) {
                        let _ = self.sr1().read();
                        let _ = self.sr2().read();
                    }

                    fn clear_error(&self, error: ProtocolError) {
                        // rc_w0: writing 1 leaves a flag as it is
                        self.sr1().write(|w| {
                            w.berr()
                                .bit(error != ProtocolError::Bus)
                                .arlo()
                                .bit(error != ProtocolError::ArbitrationLost)
                                .af()
                                .bit(error != ProtocolError::AckFailure)
                                .ovr()
                                .bit(error != ProtocolError::Overrun)
                                .timeout()
                                .bit(error != ProtocolError::Timeout)
                        });
                    }

                    #[inline(always)]
                    fn is_controller(&self) -> bool {
                        self.sr2().read().msl().bit_is_set()
                    }

                    fn set_interrupt(&self, interrupt: Interrupt, on: bool) {
                        self.cr2().modify(|_, w| match interrupt {
                            Interrupt::Buffer => w.itbufen().bit(on),
                            Interrupt::Event => w.itevten().bit(on),
                            Interrupt::Error => w.iterren().bit(on),
                        });
                    }

                    fn is_listening(&self, interrupt: Interrupt) -> bool {
                        let cr2 = self.cr2().read();
                        match interrupt {
                            Interrupt::Buffer => cr2.itbufen().bit_is_set(),
                            Interrupt::Event => cr2.itevten().bit_is_set(),
                            Interrupt::Error => cr2.iterren().bit_is_set(),
                        }
                    }

                    fn enable_clock(&self) {
                        // unsafe: Owned exclusive access to this bitfield
                        interrupt::free(|_| {
                            let rcc = unsafe { &*RCC::ptr() };
                            rcc.apb1enr()
                                .modify(|_, w| w.[<$I2CX:lower en>]().set_bit());
                            rcc.apb1rstr()
                                .modify(|_, w| w.[<$I2CX:lower rst>]().set_bit());
                            rcc.apb1rstr()
                                .modify(|_, w| w.[<$I2CX:lower rst>]().clear_bit());
                        });
                    }

                    fn disable_clock(&self) {
                        // unsafe: Owned exclusive access to this bitfield
                        interrupt::free(|_| {
                            let rcc = unsafe { &*RCC::ptr() };
                            rcc.apb1enr()
                                .modify(|_, w| w.[<$I2CX:lower en>]().clear_bit());
                        });
                    }
                }

                impl crate::Sealed for $I2CX {}
            }
        )+
    };
}

i2c! { I2C1, I2C2, I2C3 }
