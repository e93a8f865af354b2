//! Control flow discovery
//!
//! A [`Segment`] is swept once for candidate entry points; each candidate
//! is then explored with a work queue of branch targets, slicing the code
//! into non-overlapping [`Block`]s grouped into a [`Function`].

pub mod block;
pub mod function;
pub mod segment;

pub use block::Block;
pub use function::Function;
pub use segment::Segment;
