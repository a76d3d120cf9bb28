//! Delivery scheduler — priority-ordered ready queue, time-keyed deferred
//! set, and the supervised background loops that promote, dispatch, and
//! evict.

pub mod biorhythm;
pub mod deferred;
pub mod ready;
pub mod scheduler;
pub mod supervisor;

pub use deferred::DeferredSet;
pub use ready::{ReadyItem, ReadyQueue};
pub use scheduler::DeliveryScheduler;
pub use supervisor::Supervisor;
