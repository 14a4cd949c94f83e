pub mod mul;
pub mod reshape;
