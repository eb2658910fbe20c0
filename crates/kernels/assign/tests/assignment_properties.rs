//! End-to-end assignment properties.
//!
//! Each test builds kernels through [`AssignEngine`] exactly as a caller
//! would and checks one observable guarantee: lossless widening, range and
//! fraction checks by mode, option composition, struct permutation and
//! complex narrowing.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use num_complex::Complex;
use proptest::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use continuum_assign::kernels::missing::{AssignNa, SentinelMissing, marker_of};
use continuum_assign::{
    AssignEngine, AssignKernel, Error, Kernel, KernelBuilder, KernelRequest, MissingValues, Node,
    Result, Scalar,
};
use continuum_ndt::{ErrorMode, Type};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,continuum_assign=debug"));
    let _ = fmt().with_env_filter(filter).with_test_writer().try_init();
}

fn kernel(dst: &Type, src: &Type, mode: ErrorMode) -> AssignKernel {
    AssignEngine::default()
        .build(dst, src, mode, KernelRequest::Strided)
        .unwrap()
}

fn round_trip<W: Scalar + Default, N: Scalar + Default + PartialEq + std::fmt::Debug>(
    narrow_tp: &Type,
    wide_tp: &Type,
    value: N,
) {
    let widen = kernel(wide_tp, narrow_tp, ErrorMode::NoCheck);
    let narrow = kernel(narrow_tp, wide_tp, ErrorMode::NoCheck);
    let mut wide = W::default();
    let mut back = N::default();
    widen.assign(&mut wide, &value).unwrap();
    narrow.assign(&mut back, &wide).unwrap();
    assert_eq!(back, value);
}

proptest! {
    /// Widening then narrowing under `nocheck` returns the starting value.
    #[test]
    fn test_nocheck_widening_round_trip(
        a in any::<i8>(),
        b in any::<i16>(),
        c in any::<i32>(),
        d in any::<u8>(),
        e in any::<u32>(),
        f in -1.0e30f32..1.0e30f32,
    ) {
        round_trip::<i16, i8>(&Type::int8(), &Type::int16(), a);
        round_trip::<i64, i16>(&Type::int16(), &Type::int64(), b);
        round_trip::<f64, i32>(&Type::int32(), &Type::float64(), c);
        round_trip::<u16, u8>(&Type::uint8(), &Type::uint16(), d);
        round_trip::<i64, u32>(&Type::uint32(), &Type::int64(), e);
        round_trip::<f64, u32>(&Type::uint32(), &Type::float64(), e);
        round_trip::<f64, f32>(&Type::float32(), &Type::float64(), f);
        round_trip::<Complex<f64>, f32>(&Type::float32(), &Type::complex128(), f);
    }
}

/// `i64::MAX` into `int8` is an overflow error when checked and wraps when not.
#[test]
fn test_overflow_versus_nocheck() {
    init_logging();
    let mut out = 0i8;
    let err = kernel(&Type::int8(), &Type::int64(), ErrorMode::Overflow)
        .assign(&mut out, &i64::MAX)
        .unwrap_err();
    assert!(matches!(err, Error::Overflow { .. }));
    assert!(err.is_value_error());

    kernel(&Type::int8(), &Type::int64(), ErrorMode::NoCheck)
        .assign(&mut out, &i64::MAX)
        .unwrap();
    assert_eq!(out, -1);
}

/// `fractional` rejects 3.5 but accepts 3.0; `inexact` also rejects 3.5.
#[test]
fn test_fractional_checks() {
    init_logging();
    for mode in [ErrorMode::Fractional, ErrorMode::Inexact] {
        let kernel = kernel(&Type::int32(), &Type::float64(), mode);
        let mut out = 0i32;
        kernel.assign(&mut out, &3.0f64).unwrap();
        assert_eq!(out, 3);
        assert!(matches!(kernel.assign(&mut out, &3.5f64), Err(Error::Fractional { .. })));
    }

    let mut out = 0i32;
    kernel(&Type::int32(), &Type::float64(), ErrorMode::Overflow)
        .assign(&mut out, &3.5f64)
        .unwrap();
    assert_eq!(out, 3);
}

// ============================================================================
// Option composition
// ============================================================================

/// Counts how many elements its NA kernels write.
struct CountingMissing {
    writes: Arc<AtomicUsize>,
}

struct CountingNa {
    inner: AssignNa,
    writes: Arc<AtomicUsize>,
}

impl Kernel for CountingNa {
    unsafe fn single(&self, node: Node<'_>, dst: *mut u8, src: &[*const u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        unsafe { self.inner.single(node, dst, src) }
    }
}

impl MissingValues for CountingMissing {
    fn instantiate_assign_na(
        &self,
        builder: &mut KernelBuilder,
        value_tp: &Type,
        request: KernelRequest,
    ) -> Result<()> {
        let marker = marker_of(value_tp)
            .ok_or_else(|| Error::unsupported(value_tp, value_tp, "no NA"))?;
        let kernel = CountingNa {
            inner: AssignNa { marker },
            writes: self.writes.clone(),
        };
        builder.append(kernel, request)?;
        Ok(())
    }

    fn instantiate_is_missing(
        &self,
        builder: &mut KernelBuilder,
        value_tp: &Type,
        request: KernelRequest,
    ) -> Result<()> {
        SentinelMissing.instantiate_is_missing(builder, value_tp, request)
    }
}

/// `?int32 -> ?int64 -> ?int32` preserves values and NA positions, leaves the
/// source untouched, and writes NA only where the source had it.
#[test]
fn test_option_round_trip() {
    init_logging();
    let writes = Arc::new(AtomicUsize::new(0));
    let missing = Arc::new(CountingMissing {
        writes: writes.clone(),
    });
    let engine = AssignEngine::default().with_missing(missing);
    let narrow = Type::option(Type::int32());
    let wide = Type::option(Type::int64());
    let up = engine.build(&wide, &narrow, ErrorMode::Fractional, KernelRequest::Strided).unwrap();
    let down = engine.build(&narrow, &wide, ErrorMode::Fractional, KernelRequest::Strided).unwrap();

    let run = |src: &[i32]| -> Vec<i32> {
        let mut mid = vec![0i64; src.len()];
        let mut back = vec![0i32; src.len()];
        unsafe {
            up.strided(mid.as_mut_ptr().cast(), 8, src.as_ptr().cast(), 4, src.len()).unwrap();
            down.strided(back.as_mut_ptr().cast(), 4, mid.as_ptr().cast(), 8, src.len()).unwrap();
        }
        back
    };

    let present = [7, -3, 0, i32::MAX, 12];
    let snapshot = present;
    assert_eq!(run(&present), present);
    assert_eq!(present, snapshot);
    assert_eq!(writes.load(Ordering::Relaxed), 0);

    let sparse = [i32::MIN, 1, i32::MIN, i32::MIN, 5];
    assert_eq!(run(&sparse), sparse);
    // three NA per direction
    assert_eq!(writes.load(Ordering::Relaxed), 6);
}

/// Assigning an option holding NA to a plain type fails in every mode,
/// including the deferred default.
#[test]
fn test_option_to_value_always_checks() {
    init_logging();
    let modes = ErrorMode::CONCRETE.into_iter().chain([ErrorMode::Default]);
    for mode in modes {
        let kernel = AssignEngine::default()
            .build(&Type::float64(), &Type::option(Type::float32()), mode, KernelRequest::Single)
            .unwrap();
        let na = f32::from_bits(continuum_assign::kernels::missing::F32_NA_BITS);
        let mut out = 0f64;
        let err = unsafe {
            kernel.single((&mut out as *mut f64).cast(), (&na as *const f32).cast())
        }.unwrap_err();
        assert!(matches!(err, Error::MissingValue { .. }), "{mode}: {err}");

        unsafe {
            kernel.single((&mut out as *mut f64).cast(), (&1.25f32 as *const f32).cast()).unwrap()
        };
        assert_eq!(out, 1.25);
    }
}

// ============================================================================
// Struct permutation
// ============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Source {
    x: i32,
    y: f64,
    z: i16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Permuted {
    y: f32,
    z: i32,
    x: u8,
}

/// `{x: int32, y: float64, z: int16} -> {y: float32, z: int32, x: uint8}`
/// matches members by name and converts each under the request's mode.
#[test]
fn test_struct_permutation() {
    init_logging();
    let src_tp = Type::structure([
        ("x", Type::int32()),
        ("y", Type::float64()),
        ("z", Type::int16()),
    ])
    .unwrap();
    let dst_tp = Type::structure([
        ("y", Type::float32()),
        ("z", Type::int32()),
        ("x", Type::uint8()),
    ])
    .unwrap();
    assert_eq!(src_tp.data_size(), size_of::<Source>());
    assert_eq!(dst_tp.data_size(), size_of::<Permuted>());

    let kernel = kernel(&dst_tp, &src_tp, ErrorMode::Fractional);
    let src = [
        Source { x: 1, y: 0.5, z: -2 },
        Source { x: 255, y: -8.0, z: 300 },
    ];
    let mut dst = [Permuted::default(); 2];
    unsafe {
        kernel
            .strided(
                dst.as_mut_ptr().cast(),
                size_of::<Permuted>() as isize,
                src.as_ptr().cast(),
                size_of::<Source>() as isize,
                src.len(),
            )
            .unwrap()
    };
    assert_eq!(dst, [Permuted { y: 0.5, z: -2, x: 1 }, Permuted { y: -8.0, z: 300, x: 255 }]);

    let bad = Source { x: 256, y: 0.0, z: 0 };
    let mut out = Permuted::default();
    let err = unsafe {
        kernel.single((&mut out as *mut Permuted).cast(), (&bad as *const Source).cast())
    }.unwrap_err();
    assert!(matches!(err, Error::Overflow { .. }));
}

// ============================================================================
// Complex narrowing
// ============================================================================

/// `complex128 -> complex64` checks each part; `complex -> real` drops the
/// imaginary part only when overflow is not checked.
#[test]
fn test_complex_narrowing() {
    init_logging();
    let z = Complex::new(1.5f64, 2.0);
    let mut narrow = Complex::<f32>::default();
    kernel(&Type::complex64(), &Type::complex128(), ErrorMode::Inexact)
        .assign(&mut narrow, &z)
        .unwrap();
    assert_eq!(narrow, Complex::new(1.5f32, 2.0));

    let inexact = kernel(&Type::complex64(), &Type::complex128(), ErrorMode::Inexact);
    assert!(matches!(
        inexact.assign(&mut narrow, &Complex::new(0.1f64, 0.0)),
        Err(Error::Inexact { .. })
    ));

    let huge = Complex::new(1.0e300f64, 0.0);
    assert!(matches!(
        kernel(&Type::complex64(), &Type::complex128(), ErrorMode::Overflow)
            .assign(&mut narrow, &huge),
        Err(Error::Overflow { .. })
    ));
    kernel(&Type::complex64(), &Type::complex128(), ErrorMode::NoCheck)
        .assign(&mut narrow, &huge)
        .unwrap();
    assert!(narrow.re.is_infinite());

    let mut real = 0f64;
    kernel(&Type::float64(), &Type::complex128(), ErrorMode::NoCheck)
        .assign(&mut real, &z)
        .unwrap();
    assert_eq!(real, 1.5);
    assert!(matches!(
        kernel(&Type::float64(), &Type::complex128(), ErrorMode::Overflow).assign(&mut real, &z),
        Err(Error::ImaginaryLoss { .. })
    ));
}
