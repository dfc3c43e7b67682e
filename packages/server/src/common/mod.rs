// Common types shared by the kernel, domains and HTTP layer

pub mod entity_ids;
pub mod id;

pub use entity_ids::*;
pub use id::Id;
