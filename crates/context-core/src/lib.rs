pub mod daily_index;
pub mod error;
pub mod traits;
pub mod types;

pub use daily_index::*;
pub use error::*;
pub use traits::*;
pub use types::*;
