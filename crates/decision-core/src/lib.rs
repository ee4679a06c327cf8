pub mod error;
pub mod math;
pub mod profile;
pub mod traits;
pub mod types;

pub use error::*;
pub use profile::*;
pub use traits::*;
pub use types::*;
