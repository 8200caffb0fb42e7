pub mod block;
pub mod error;
pub mod format;
pub mod node;
pub mod options;
pub mod skiplist;

pub use block::{BlockBuilder, BlockReader, Encode};
pub use error::{Error, Result};
pub use format::LineFormat;
pub use node::Node;
pub use options::Options;
pub use skiplist::{Iter, SkipList};
