// Application layer: wires the engine to seeded in-memory stores and snapshots.

pub mod seed;
pub mod service;
pub mod simulate;
pub mod snapshot;

pub use service::EnrollmentService;
