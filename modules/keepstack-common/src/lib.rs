pub mod error;
pub mod tuning;
pub mod types;

pub use error::{KeepstackError, Result};
pub use tuning::{Tuning, MAX_USERNAME_LEN};
pub use types::*;
