pub mod qsub;

pub use qsub::QsubScheduler;
