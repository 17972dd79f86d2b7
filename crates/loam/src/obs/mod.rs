pub mod metrics;
pub mod sink;

pub use metrics::{Counters, report, reset};
pub use sink::{ObsEvent, ObsSink, with_sink};

pub(crate) use sink::record;
