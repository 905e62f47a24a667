mod memory;
pub use memory::{MemorySequencer, SeqOp};

#[cfg(feature = "alsa")]
mod kernel;
#[cfg(feature = "alsa")]
pub use kernel::AlsaSequencer;
