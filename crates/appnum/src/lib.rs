#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod allocator;
mod counter;
mod error;
mod institute;
mod key;
mod number;
mod store;
mod time;

pub use crate::allocator::*;
pub use crate::counter::*;
pub use crate::error::*;
pub use crate::institute::*;
pub use crate::key::*;
pub use crate::number::*;
pub use crate::store::*;
pub use crate::time::*;
