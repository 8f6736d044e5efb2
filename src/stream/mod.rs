//! Stream combinators used by location streams

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
