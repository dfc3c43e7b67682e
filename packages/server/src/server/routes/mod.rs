// HTTP routes
pub mod health;
pub mod runs;
pub mod stream;

pub use health::*;
pub use runs::*;
pub use stream::*;
