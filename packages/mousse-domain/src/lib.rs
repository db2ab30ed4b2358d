pub mod cluster;
pub mod epoch;
pub mod filter;
pub mod geometry;
pub mod kmeans;

mod error;

pub use error::{Error, Result};
