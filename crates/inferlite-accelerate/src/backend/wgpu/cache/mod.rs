pub mod key;
pub mod persist;
pub mod registry;
