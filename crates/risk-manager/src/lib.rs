pub mod checker;
pub mod models;
#[cfg(test)]
mod tests;

pub use checker::LimitChecker;
pub use models::*;
