pub mod node;
pub mod signature;
