pub mod host;
pub mod uart;
