pub mod plan;
pub mod system;
