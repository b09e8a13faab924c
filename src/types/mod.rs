//! Measurement model.
//!
//! Plain data with no behaviour of its own:
//! - Channels and their values
//! - Samples (one readout)
//! - Devices (a meter found during discovery)

pub mod channel;
pub mod device;
pub mod sample;

pub use channel::{Channel, Value};
pub use device::{Device, Protocol};
pub use sample::Sample;
