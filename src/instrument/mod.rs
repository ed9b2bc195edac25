//! Instrument sessions and capability traits.
//!
//! The bench talks to exactly two physical instruments, a DC source powering
//! the target rail and a multimeter sampling its current draw. Both are
//! reached through an injected [`link::InstrumentLink`] transport and exposed
//! to the rest of the application as the capability traits
//! [`power::PowerSource`] and [`meter::CurrentMeter`]. The
//! [`session::InstrumentSession`] owns both handles for the lifetime of a
//! batch run.

pub mod link;
pub mod meter;
pub mod mock;
pub mod power;
pub mod session;

pub use link::InstrumentLink;
pub use meter::{CurrentMeter, GpibCurrentMeter, SampleError};
pub use mock::MockLink;
pub use power::{GpibPowerSupply, PowerSource};
pub use session::InstrumentSession;
