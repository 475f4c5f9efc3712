pub mod fixed;
pub mod lmsr;
pub mod tokens;
pub mod transcendental;
pub mod wide;
