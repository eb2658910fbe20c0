//! Builtin scalar conversion rules.
//!
//! Every builtin scalar converts through a small exact intermediate
//! [`Value`]: integers widen to `i128`, reals to `f64`, complex numbers to a
//! pair of `f64`. The destination decides, per [`ErrorMode`], whether the
//! value is representable and reports the first [`Loss`] it finds.
//!
//! | mode | integer dst | real dst | bool dst |
//! |------|-------------|----------|----------|
//! | nocheck | `as` cast | `as` cast | `!= 0` |
//! | overflow | range | finite range | 0 or 1 |
//! | fractional | range, integral | finite range | 0 or 1 |
//! | inexact | range, integral | round trip | 0 or 1 |
//!
//! A complex source with a nonzero imaginary part is rejected by every mode
//! except nocheck.

use std::fmt;

use num_complex::Complex;

use continuum_ndt::{ErrorMode, TypeId};

use crate::error::Error;

/// Exact intermediate form of a builtin scalar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i128),
    Real(f64),
    Complex(f64, f64),
}

/// Why a value cannot be represented in a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loss {
    Overflow,
    Fractional,
    Inexact,
    Imaginary,
}

impl Loss {
    /// Attach the value and both type names.
    pub fn into_error(
        self,
        src_tp: impl ToString,
        value: impl ToString,
        dst_tp: impl ToString,
    ) -> Error {
        let (src_tp, value, dst_tp) = (src_tp.to_string(), value.to_string(), dst_tp.to_string());
        match self {
            Loss::Overflow => Error::Overflow {
                src_tp,
                value,
                dst_tp,
            },
            Loss::Fractional => Error::Fractional {
                src_tp,
                value,
                dst_tp,
            },
            Loss::Inexact => Error::Inexact {
                src_tp,
                value,
                dst_tp,
            },
            Loss::Imaginary => Error::ImaginaryLoss {
                src_tp,
                value,
                dst_tp,
            },
        }
    }
}

/// A builtin scalar that kernels can load, store and convert.
pub trait Scalar: Copy + Send + Sync + fmt::Display + 'static {
    /// The builtin type id this Rust type stores.
    const ID: TypeId;

    fn to_value(self) -> Value;

    /// Convert `value` under `mode`, or report the loss.
    fn from_value(value: Value, mode: ErrorMode) -> Result<Self, Loss>;

    /// Text form used when assigning to a string.
    fn to_text(self) -> String {
        self.to_string()
    }

    /// Read one element.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `size_of::<Self>()` bytes. No
    /// alignment is required.
    #[inline]
    unsafe fn load(ptr: *const u8) -> Self {
        unsafe { ptr.cast::<Self>().read_unaligned() }
    }

    /// Write one element.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `size_of::<Self>()` bytes. No
    /// alignment is required.
    #[inline]
    unsafe fn store(self, ptr: *mut u8) {
        unsafe { ptr.cast::<Self>().write_unaligned(self) }
    }
}

/// Convert `value` to `D`, mapping a loss to the matching error.
#[inline]
pub fn convert<D: Scalar, S: Scalar>(value: S, mode: ErrorMode) -> crate::Result<D> {
    D::from_value(value.to_value(), mode)
        .map_err(|loss| loss.into_error(S::ID.name(), value, D::ID.name()))
}

// ============================================================================
// Checks
// ============================================================================

fn real_to_integer(x: f64, mode: ErrorMode, min: f64, max: f64) -> Result<f64, Loss> {
    if mode.checks_overflow() && !(x >= min && x < max + 1.0) {
        return Err(Loss::Overflow);
    }
    if mode.checks_fractional() && x.floor() != x {
        return Err(Loss::Fractional);
    }
    Ok(x)
}

fn real_part(re: f64, im: f64, mode: ErrorMode) -> Result<f64, Loss> {
    if mode.checks_overflow() && im != 0.0 {
        return Err(Loss::Imaginary);
    }
    Ok(re)
}

fn narrow_f32(x: f64, mode: ErrorMode) -> Result<f32, Loss> {
    let d = x as f32;
    if mode.checks_overflow() && x.is_finite() && x.abs() > f32::MAX as f64 {
        return Err(Loss::Overflow);
    }
    if mode.checks_inexact() && !x.is_nan() && d as f64 != x {
        return Err(Loss::Inexact);
    }
    Ok(d)
}

fn int_to_f32(i: i128, mode: ErrorMode) -> Result<f32, Loss> {
    let d = i as f32;
    if mode.checks_inexact() && d as i128 != i {
        return Err(Loss::Inexact);
    }
    Ok(d)
}

fn int_to_f64(i: i128, mode: ErrorMode) -> Result<f64, Loss> {
    let d = i as f64;
    if mode.checks_inexact() && d as i128 != i {
        return Err(Loss::Inexact);
    }
    Ok(d)
}

fn flag(x: f64, mode: ErrorMode) -> Result<bool, Loss> {
    if !mode.checks_overflow() {
        return Ok(x != 0.0);
    }
    if x == 0.0 {
        Ok(false)
    } else if x == 1.0 {
        Ok(true)
    } else {
        Err(Loss::Overflow)
    }
}

// ============================================================================
// Implementations
// ============================================================================

impl Scalar for bool {
    const ID: TypeId = TypeId::Bool;

    fn to_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value, mode: ErrorMode) -> Result<Self, Loss> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) if !mode.checks_overflow() => Ok(i != 0),
            Value::Int(i) => match i {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(Loss::Overflow),
            },
            Value::Real(x) => flag(x, mode),
            Value::Complex(re, im) if !mode.checks_overflow() => Ok(re != 0.0 || im != 0.0),
            Value::Complex(re, im) => flag(real_part(re, im, mode)?, mode),
        }
    }

    /// Any nonzero byte reads as true.
    #[inline]
    unsafe fn load(ptr: *const u8) -> Self {
        unsafe { ptr.read() != 0 }
    }
}

macro_rules! integer_scalar {
    ($($t:ty => $id:ident),* $(,)?) => {
        $(
            impl Scalar for $t {
                const ID: TypeId = TypeId::$id;

                #[inline]
                fn to_value(self) -> Value {
                    Value::Int(self as i128)
                }

                fn from_value(value: Value, mode: ErrorMode) -> Result<Self, Loss> {
                    let real = match value {
                        Value::Bool(b) => return Ok(b as $t),
                        Value::Int(i) => {
                            return match <$t>::try_from(i) {
                                Ok(v) => Ok(v),
                                Err(_) if mode.checks_overflow() => Err(Loss::Overflow),
                                Err(_) => Ok(i as $t),
                            };
                        }
                        Value::Real(x) => x,
                        Value::Complex(re, im) => real_part(re, im, mode)?,
                    };
                    real_to_integer(real, mode, <$t>::MIN as f64, <$t>::MAX as f64)
                        .map(|x| x as $t)
                }
            }
        )*
    };
}

integer_scalar! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
}

impl Scalar for f32 {
    const ID: TypeId = TypeId::Float32;

    /// Shortest round-tripping form, with an exponent for very large or
    /// small magnitudes.
    fn to_text(self) -> String {
        format!("{self:?}")
    }

    fn to_value(self) -> Value {
        Value::Real(self as f64)
    }

    fn from_value(value: Value, mode: ErrorMode) -> Result<Self, Loss> {
        match value {
            Value::Bool(b) => Ok(b as u8 as f32),
            Value::Int(i) => int_to_f32(i, mode),
            Value::Real(x) => narrow_f32(x, mode),
            Value::Complex(re, im) => narrow_f32(real_part(re, im, mode)?, mode),
        }
    }
}

impl Scalar for f64 {
    const ID: TypeId = TypeId::Float64;

    /// Shortest round-tripping form, with an exponent for very large or
    /// small magnitudes.
    fn to_text(self) -> String {
        format!("{self:?}")
    }

    fn to_value(self) -> Value {
        Value::Real(self)
    }

    fn from_value(value: Value, mode: ErrorMode) -> Result<Self, Loss> {
        match value {
            Value::Bool(b) => Ok(b as u8 as f64),
            Value::Int(i) => int_to_f64(i, mode),
            Value::Real(x) => Ok(x),
            Value::Complex(re, im) => real_part(re, im, mode),
        }
    }
}

impl Scalar for Complex<f32> {
    const ID: TypeId = TypeId::Complex64;

    fn to_value(self) -> Value {
        Value::Complex(self.re as f64, self.im as f64)
    }

    fn from_value(value: Value, mode: ErrorMode) -> Result<Self, Loss> {
        match value {
            Value::Bool(b) => Ok(Complex::new(b as u8 as f32, 0.0)),
            Value::Int(i) => Ok(Complex::new(int_to_f32(i, mode)?, 0.0)),
            Value::Real(x) => Ok(Complex::new(narrow_f32(x, mode)?, 0.0)),
            Value::Complex(re, im) => {
                Ok(Complex::new(narrow_f32(re, mode)?, narrow_f32(im, mode)?))
            }
        }
    }
}

impl Scalar for Complex<f64> {
    const ID: TypeId = TypeId::Complex128;

    fn to_value(self) -> Value {
        Value::Complex(self.re, self.im)
    }

    fn from_value(value: Value, mode: ErrorMode) -> Result<Self, Loss> {
        match value {
            Value::Bool(b) => Ok(Complex::new(b as u8 as f64, 0.0)),
            Value::Int(i) => Ok(Complex::new(int_to_f64(i, mode)?, 0.0)),
            Value::Real(x) => Ok(Complex::new(x, 0.0)),
            Value::Complex(re, im) => Ok(Complex::new(re, im)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOCHECK: ErrorMode = ErrorMode::NoCheck;
    const OVERFLOW: ErrorMode = ErrorMode::Overflow;
    const FRACTIONAL: ErrorMode = ErrorMode::Fractional;
    const INEXACT: ErrorMode = ErrorMode::Inexact;

    #[test]
    fn test_int_narrowing() {
        assert_eq!(convert::<i8, i64>(i64::MAX, NOCHECK).unwrap(), -1);
        let err = convert::<i8, i64>(i64::MAX, OVERFLOW).unwrap_err();
        assert_eq!(
            err.to_string(),
            "overflow while assigning int64 value 9223372036854775807 to int8"
        );
        assert_eq!(convert::<u8, i32>(255, INEXACT).unwrap(), 255);
        assert!(convert::<u8, i32>(-1, FRACTIONAL).is_err());
    }

    #[test]
    fn test_real_to_int_modes() {
        assert_eq!(convert::<i32, f64>(3.5, NOCHECK).unwrap(), 3);
        assert_eq!(convert::<i32, f64>(3.5, OVERFLOW).unwrap(), 3);
        assert!(matches!(
            convert::<i32, f64>(3.5, FRACTIONAL),
            Err(Error::Fractional { .. })
        ));
        assert!(matches!(
            convert::<i32, f64>(3.5, INEXACT),
            Err(Error::Fractional { .. })
        ));
        assert_eq!(convert::<i32, f64>(3.0, INEXACT).unwrap(), 3);
        assert!(matches!(
            convert::<i8, f64>(128.0, OVERFLOW),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(convert::<i8, f64>(127.9, OVERFLOW).unwrap(), 127);
        assert!(convert::<i64, f64>(f64::NAN, OVERFLOW).is_err());
        assert_eq!(convert::<i64, f64>(f64::NAN, NOCHECK).unwrap(), 0);
        assert_eq!(convert::<u8, f64>(1e9, NOCHECK).unwrap(), 255);
    }

    #[test]
    fn test_int_to_real_inexact() {
        assert_eq!(convert::<f64, i64>(1 << 53, INEXACT).unwrap(), 9007199254740992.0);
        assert!(matches!(
            convert::<f64, i64>((1 << 53) + 1, INEXACT),
            Err(Error::Inexact { .. })
        ));
        assert!(convert::<f64, i64>((1 << 53) + 1, FRACTIONAL).is_ok());
        assert!(convert::<f32, u64>(u64::MAX, INEXACT).is_err());
    }

    #[test]
    fn test_real_narrowing() {
        assert!(matches!(
            convert::<f32, f64>(1e300, OVERFLOW),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(convert::<f32, f64>(1e300, NOCHECK).unwrap(), f32::INFINITY);
        assert!(convert::<f32, f64>(f64::INFINITY, OVERFLOW).is_ok());
        assert!(convert::<f32, f64>(0.1, OVERFLOW).is_ok());
        assert!(matches!(
            convert::<f32, f64>(0.1, INEXACT),
            Err(Error::Inexact { .. })
        ));
        assert!(convert::<f32, f64>(f64::NAN, INEXACT).unwrap().is_nan());
    }

    #[test]
    fn test_complex_sources() {
        let z = Complex::new(1.5f64, 2.0);
        assert_eq!(convert::<f64, Complex<f64>>(z, NOCHECK).unwrap(), 1.5);
        let err = convert::<f64, Complex<f64>>(z, OVERFLOW).unwrap_err();
        assert!(matches!(err, Error::ImaginaryLoss { .. }));
        assert!(err.to_string().starts_with("loss of imaginary component"));
        assert_eq!(
            convert::<f32, Complex<f64>>(Complex::new(2.0, 0.0), INEXACT).unwrap(),
            2.0
        );
        let narrowed = convert::<Complex<f32>, Complex<f64>>(z, INEXACT).unwrap();
        assert_eq!(narrowed, Complex::new(1.5f32, 2.0));
        assert!(convert::<Complex<f32>, Complex<f64>>(Complex::new(0.1, 0.0), INEXACT).is_err());
    }

    #[test]
    fn test_bool_rules() {
        assert!(convert::<bool, i32>(7, NOCHECK).unwrap());
        assert!(convert::<bool, i32>(7, OVERFLOW).is_err());
        assert!(convert::<bool, f64>(1.0, INEXACT).unwrap());
        assert!(!convert::<bool, f64>(0.0, FRACTIONAL).unwrap());
        assert_eq!(convert::<i16, bool>(true, INEXACT).unwrap(), 1);
        assert_eq!(convert::<f64, bool>(false, INEXACT).unwrap(), 0.0);
        let one = 3u8;
        assert!(unsafe { bool::load(&one) });
    }
}
