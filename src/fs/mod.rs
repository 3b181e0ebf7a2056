pub mod backend;
pub mod local;
pub mod memory;
pub mod types;
pub mod watcher;

pub use backend::FileSystem;
pub use local::LocalFs;
pub use memory::MemoryFs;
pub use types::*;
