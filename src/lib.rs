pub mod arch;
pub mod dataset;
pub mod error;
pub mod storage;
pub mod training;

pub use error::{NetErr, Result};
