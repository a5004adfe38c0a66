use crate::packing::error::UnpackError;
use std::io::Read;

pub trait Unpackable
where
    Self: Sized,
{
    fn unpack_from<T: Read>(buf: &mut T) -> Result<Self, UnpackError>;
}
