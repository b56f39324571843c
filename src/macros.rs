#![allow(unused_macros)]

/// This macro is used to insert a double read of a peripheral register to give the peripheral
/// enough time to process a write that clears an interrupt flag. This prevents the error
/// interrupt from firing a second time for a flag that was already cleared. The expression that
/// is passed in must read a register without side effects, so never SR1/SR2 or DR.
///
/// See ARM Application Note 321 Section 4.9
macro_rules! interrupt_clear_clock_sync_delay {
    ($read:expr) => {
        let _ = $read;
        let _ = $read;
    };
}

// Logging front-ends. Each forwards to `log` and/or `defmt` depending on the
// enabled features and expands to nothing when neither is enabled. Arguments
// must be usable with both `core::fmt` and `defmt` formatting.

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::trace!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::trace!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($( &$x, )*);
        }
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::debug!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::debug!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($( &$x, )*);
        }
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "log")]
            ::log::warn!($s $(, $x)*);
            #[cfg(feature = "defmt")]
            ::defmt::warn!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt")))]
            let _ = ($( &$x, )*);
        }
    };
}
