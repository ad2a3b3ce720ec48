pub mod precision;
pub mod tick_generator;
