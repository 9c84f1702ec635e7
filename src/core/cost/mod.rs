pub mod aggregate;
pub mod money;
pub mod trend;
