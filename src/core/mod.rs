pub mod errors;
pub mod logging;
pub mod types;
pub mod utils;

pub use errors::{UniqueStorageError, UniqueStorageResult};
pub use types::*;
