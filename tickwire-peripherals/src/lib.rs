//! Generic devices built on the TICKWIRE core: memory, a bank-select latch, a parallel I/O port,
//! timers and a 74164 shift register.
#[macro_use]
extern crate bitflags;

pub mod latch;
pub mod memory;
pub mod port;
pub mod timer;
pub mod ttl74164;

pub use latch::BankLatch;
pub use memory::{Ram, Rom, MemoryError};
pub use port::Port;
pub use timer::Timer;
pub use ttl74164::Ttl74164;
