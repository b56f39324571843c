//! Time units

pub use fugit::{
    HertzU32 as Hertz, KilohertzU32 as KiloHertz, MegahertzU32 as MegaHertz,
    MicrosDurationU32 as MicroSeconds, MillisDurationU32 as MilliSeconds,
};

/// Upper bound of the I2C standard-mode SCL frequency
pub const STANDARD_MODE_MAX: Hertz = Hertz::kHz(100);

/// Upper bound of the I2C fast-mode SCL frequency
pub const FAST_MODE_MAX: Hertz = Hertz::kHz(400);
