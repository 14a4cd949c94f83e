pub mod mul;
pub mod registry;
pub mod reshape;
