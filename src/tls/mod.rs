// Re-export submodules
pub mod constants;
pub mod types;

// Re-export main types from child modules
pub use constants::*;
pub use types::*;
