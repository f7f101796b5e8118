pub mod describe;
pub mod sweep;
