//! Small shared helpers.
use num::FromPrimitive;
use crate::errors::GatewayResult;

/// Converts a `+CME`/`+CMS ERROR: <n>` numeric code into its typed enum,
/// producing `GatewayError::UnknownErrorCode` for a code this build's
/// tables don't name rather than panicking on an unrecognized modem.
pub trait FromErrorCode: Sized {
    fn from_code(code: u32, kind: &'static str) -> GatewayResult<Self>;
}
impl<T> FromErrorCode for T
where
    T: FromPrimitive,
{
    fn from_code(code: u32, kind: &'static str) -> GatewayResult<T> {
        T::from_u32(code).ok_or(crate::errors::GatewayError::UnknownErrorCode(kind, code))
    }
}
