pub mod error;
pub mod serde;
pub mod tree_math;
