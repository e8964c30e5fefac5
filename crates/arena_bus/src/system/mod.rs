/// In-process bus implementation - broken down into manageable components
mod core;
mod stats;
mod tests;

pub use core::LocalBus;
pub use stats::BusStats;
pub(crate) use stats::Counters;
