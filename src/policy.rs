//! What a device adapter does with a failed bus operation

use core::fmt::Debug;

/// Reaction of a device adapter to an error
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorPolicy {
    /// Panic, stopping the firmware at the failing call
    Halt,
    /// Log a warning and hand the error back to the caller
    #[default]
    LogAndContinue,
}

impl ErrorPolicy {
    /// Apply the policy to the outcome of the operation named `context`
    pub fn apply<T, E: Debug>(
        self,
        context: &str,
        result: Result<T, E>,
    ) -> Result<T, E> {
        let error = match result {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match self {
            ErrorPolicy::Halt => panic!("{}: {:?}", context, error),
            ErrorPolicy::LogAndContinue => {
                #[cfg(feature = "log")]
                log::warn!("{}: {:?}", context, error);

                #[cfg(feature = "defmt")]
                defmt::warn!("{}: {}", context, defmt::Debug2Format(&error));

                Err(error)
            }
        }
    }
}
