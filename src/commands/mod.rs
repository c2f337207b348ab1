//! CLI commands implementation

pub mod add;
pub mod collections;
pub mod init;
pub mod search;

pub use add::*;
pub use collections::*;
pub use init::*;
pub use search::*;
