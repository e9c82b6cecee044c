pub mod subscribe;
#[cfg(feature = "tokio")]
pub mod wait;

pub use subscribe::*;
#[cfg(feature = "tokio")]
pub use wait::*;
