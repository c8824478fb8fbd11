pub mod curve;
pub mod hub;
pub mod room;
pub mod snapshot;
pub mod types;

pub use curve::*;
pub use hub::*;
pub use room::*;
pub use snapshot::*;
pub use types::*;
