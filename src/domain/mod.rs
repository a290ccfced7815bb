pub mod event;
pub mod fragment;
pub mod merge;
pub mod process;
pub mod replacement;
pub mod types;

pub use event::*;
pub use fragment::*;
pub use merge::*;
pub use process::*;
pub use replacement::*;
pub use types::*;
