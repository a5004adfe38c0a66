mod pack_error;
pub use pack_error::*;

mod unpack_error;
pub use unpack_error::*;

mod bolt_read_marker_error;
pub use bolt_read_marker_error::*;
