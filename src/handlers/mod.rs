pub mod archive;
pub mod rooms;

pub use archive::*;
pub use rooms::*;
