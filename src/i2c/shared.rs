//! Controller shared between thread mode and the I2C interrupt handlers
//!
//! ```
//! static I2C: SharedI2c<pac::I2C1> = SharedI2c::new();
//! static mut TIME: [u8; 7] = [0; 7];
//!
//! // thread mode
//! I2C.install(i2c);
//! I2C.with(|i2c| i2c.start_read(0x68, unsafe { &mut TIME }, Stop::Release));
//!
//! #[interrupt]
//! fn I2C1_EV() {
//!     if let Some(Some(event)) = I2C.with(|i2c| i2c.handle_event_interrupt()) {
//!         ...
//!     }
//! }
//! ```

use core::cell::RefCell;

use critical_section::Mutex;

use super::{I2c, Instance};

/// An [`I2c`] controller behind a critical section mutex
pub struct SharedI2c<I2C> {
    inner: Mutex<RefCell<Option<I2c<I2C>>>>,
}

impl<I2C> SharedI2c<I2C> {
    /// An empty slot, usable as a `static` initializer
    pub const fn new() -> Self {
        SharedI2c {
            inner: Mutex::new(RefCell::new(None)),
        }
    }
}

impl<I2C> Default for SharedI2c<I2C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I2C: Instance> SharedI2c<I2C> {
    /// Place a controller in the slot, returning the one it replaces
    pub fn install(&self, i2c: I2c<I2C>) -> Option<I2c<I2C>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(i2c))
    }

    /// Run `f` on the controller inside a critical section.
    ///
    /// Returns `None` if no controller is installed.
    pub fn with<R>(&self, f: impl FnOnce(&mut I2c<I2C>) -> R) -> Option<R> {
        critical_section::with(|cs| {
            self.inner.borrow_ref_mut(cs).as_mut().map(f)
        })
    }

    /// Remove the controller from the slot
    pub fn take(&self) -> Option<I2c<I2C>> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take())
    }
}
