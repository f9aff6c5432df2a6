//! Error types shared by every driver operation.

use crate::device::AttrField;
use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

pub const EPERM: i32 = 1;
pub const ENODEV: i32 = 19;
pub const EAGAIN: i32 = 11;
pub const EIO: i32 = 5;
pub const EBUSY: i32 = 16;
pub const EINVAL: i32 = 22;
pub const ENOSPC: i32 = 28;
pub const ENOTSUP: i32 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A specific attribute field was rejected
    InvalidAttribute(AttrField),
    /// Bad transfer argument (offset, length)
    InvalidArgument,
    /// A transfer is already in flight on the port
    Busy,
    /// The callback does not belong to the caller's privilege domain
    PermissionDenied,
    /// Not available on this device variant
    Unsupported,
    /// The pin is owned by another function or can't carry this one
    PinClaim { pin: u8 },
    /// The DMA engine refused the descriptor
    Dma,
    /// No such port or device
    NoDevice,
    /// A fixed-capacity table is full
    TableFull,
}

impl Error {
    pub const fn errno(&self) -> i32 {
        match self {
            Error::InvalidAttribute(_) | Error::InvalidArgument => EINVAL,
            Error::Busy => EAGAIN,
            Error::PermissionDenied => EPERM,
            Error::Unsupported => ENOTSUP,
            Error::PinClaim { .. } => EBUSY,
            Error::Dma => EIO,
            Error::NoDevice => ENODEV,
            Error::TableFull => ENOSPC,
        }
    }

    /// Encodes the error the way existing callers of the ioctl interface expect
    /// it: attribute errors carry `-(1 + offset)` of the offending field inside
    /// [`crate::device::Attr`], everything else is `-1`.
    pub const fn as_return_code(&self) -> isize {
        match self {
            Error::InvalidAttribute(field) => -1 - field.offset() as isize,
            _ => -1,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidAttribute(field) => write!(f, "Invalid attribute field {field:?}"),
            Error::InvalidArgument => write!(f, "Invalid argument"),
            Error::Busy => write!(f, "Resource busy"),
            Error::PermissionDenied => write!(f, "Permission denied"),
            Error::Unsupported => write!(f, "Operation not supported"),
            Error::PinClaim { pin } => write!(f, "Unable to claim pin {pin}"),
            Error::Dma => write!(f, "DMA error"),
            Error::NoDevice => write!(f, "No such device"),
            Error::TableFull => write!(f, "Table full"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Attr;

    #[test]
    fn test_attribute_error_encodes_field_offset() {
        let err = Error::InvalidAttribute(AttrField::Freq);
        let offset = core::mem::offset_of!(Attr, freq) as isize;

        assert_eq!(err.as_return_code(), -1 - offset);
        assert_eq!(err.errno(), EINVAL);
    }

    #[test]
    fn test_other_errors_encode_minus_one() {
        assert_eq!(Error::Busy.as_return_code(), -1);
        assert_eq!(Error::Busy.errno(), EAGAIN);
        assert_eq!(Error::Unsupported.errno(), ENOTSUP);
        assert_eq!(Error::PermissionDenied.errno(), EPERM);
    }
}
