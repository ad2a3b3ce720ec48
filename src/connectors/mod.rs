pub mod random;
pub mod traits;
