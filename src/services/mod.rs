pub mod clock;
pub mod error;
pub mod relay;
pub mod remote;
pub mod staging;
pub mod worker;
