pub mod downsample;
pub mod engine;
pub mod feed;
pub mod snapshot;
pub mod stats;
pub mod traits;
