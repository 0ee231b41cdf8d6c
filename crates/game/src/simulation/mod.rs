mod input;
mod tick;

pub use input::{InputAdmission, InputBuffer, InputBufferConfig};
pub use tick::FixedTimestep;
