mod byte_op;
mod marker;
mod signature;

pub use byte_op::*;
pub use marker::*;
pub use signature::*;
