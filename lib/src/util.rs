mod definition_cache;
mod offset_vec;

pub use definition_cache::*;
pub use offset_vec::*;
