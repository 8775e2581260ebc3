pub mod staging;
pub mod upstream;
