//! Dispatch table for assignment kernels.
//!
//! Two maps drive kernel selection: an exact map keyed by
//! `(dst id, src id, mode)` and a kind map keyed by
//! `(dst kind, src kind, mode)`. An entry is either a handler that appends a
//! kernel, or an alias that redirects to the same pair under another mode.
//! Aliases let one kernel serve every mode whose checks it already covers
//! (an int-to-int overflow check is also exact, so `inexact` aliases to
//! `overflow`).
//!
//! Registration order is preserved for introspection.

use std::fmt;

use indexmap::IndexMap;

use continuum_ndt::{ErrorMode, TypeId, TypeKind};

use crate::builder::KernelBuilder;
use crate::engine::{AssignEngine, AssignRequest};
use crate::error::{Error, Result};
use crate::kernels;

/// Appends the kernel for one request. The request's mode is already
/// resolved through aliases.
pub type Handler = fn(&AssignEngine, &mut KernelBuilder, &AssignRequest<'_>) -> Result<()>;

/// One dispatch table slot.
#[derive(Clone, Copy)]
pub enum Entry {
    /// Build with this handler.
    Handler(Handler),
    /// Look the same pair up again under this mode.
    Alias(ErrorMode),
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Handler(_) => f.write_str("Handler"),
            Entry::Alias(mode) => write!(f, "Alias({mode})"),
        }
    }
}

/// A handler found by lookup, with the mode reached after aliasing.
#[derive(Clone, Copy)]
pub struct Resolved {
    pub handler: Handler,
    pub mode: ErrorMode,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved").field("mode", &self.mode).finish()
    }
}

/// Exact and kind dispatch maps.
#[derive(Debug, Default, Clone)]
pub struct DispatchTable {
    exact: IndexMap<(TypeId, TypeId, ErrorMode), Entry>,
    kinds: IndexMap<(TypeKind, TypeKind, ErrorMode), Entry>,
}

/// Longest alias chain followed before declaring a cycle.
const MAX_ALIAS_HOPS: usize = ErrorMode::CONCRETE.len();

fn chase<K, F>(
    map: &IndexMap<K, Entry>,
    key: F,
    mode: ErrorMode,
    describe: impl Fn() -> String,
) -> Result<Option<Resolved>>
where
    K: std::hash::Hash + Eq,
    F: Fn(ErrorMode) -> K,
{
    let mut mode = mode;
    for _ in 0..=MAX_ALIAS_HOPS {
        match map.get(&key(mode)) {
            None => return Ok(None),
            Some(Entry::Handler(handler)) => {
                return Ok(Some(Resolved {
                    handler: *handler,
                    mode,
                }));
            }
            Some(Entry::Alias(next)) => mode = *next,
        }
    }
    Err(Error::DispatchCycle { entry: describe() })
}

impl DispatchTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The table with every built-in conversion registered.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        kernels::register_all(&mut table);
        table
    }

    /// Register `handler` for an exact pair under each of `modes`.
    pub fn register_exact(
        &mut self,
        dst: TypeId,
        src: TypeId,
        modes: &[ErrorMode],
        handler: Handler,
    ) {
        for mode in modes {
            self.exact.insert((dst, src, *mode), Entry::Handler(handler));
        }
    }

    /// Register `handler` for a kind pair under each of `modes`.
    pub fn register_kind(
        &mut self,
        dst: TypeKind,
        src: TypeKind,
        modes: &[ErrorMode],
        handler: Handler,
    ) {
        for mode in modes {
            self.kinds.insert((dst, src, *mode), Entry::Handler(handler));
        }
    }

    /// Redirect an exact pair under each of `modes` to `target`.
    pub fn alias_exact(
        &mut self,
        dst: TypeId,
        src: TypeId,
        modes: &[ErrorMode],
        target: ErrorMode,
    ) {
        for mode in modes {
            self.exact.insert((dst, src, *mode), Entry::Alias(target));
        }
    }

    /// Redirect a kind pair under each of `modes` to `target`.
    pub fn alias_kind(
        &mut self,
        dst: TypeKind,
        src: TypeKind,
        modes: &[ErrorMode],
        target: ErrorMode,
    ) {
        for mode in modes {
            self.kinds.insert((dst, src, *mode), Entry::Alias(target));
        }
    }

    /// Resolve an exact pair, following aliases.
    pub fn lookup_exact(
        &self,
        dst: TypeId,
        src: TypeId,
        mode: ErrorMode,
    ) -> Result<Option<Resolved>> {
        chase(&self.exact, |m| (dst, src, m), mode, || format!("{dst} <- {src} ({mode})"))
    }

    /// Resolve a kind pair, following aliases.
    pub fn lookup_kind(
        &self,
        dst: TypeKind,
        src: TypeKind,
        mode: ErrorMode,
    ) -> Result<Option<Resolved>> {
        chase(&self.kinds, |m| (dst, src, m), mode, || format!("{dst} <- {src} ({mode})"))
    }

    /// Number of exact and kind entries, aliases included.
    pub fn len(&self) -> usize {
        self.exact.len() + self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.kinds.is_empty()
    }

    /// Exact entries in registration order.
    pub fn iter_exact(&self) -> impl Iterator<Item = (&(TypeId, TypeId, ErrorMode), &Entry)> {
        self.exact.iter()
    }

    /// Kind entries in registration order.
    pub fn iter_kinds(&self) -> impl Iterator<Item = (&(TypeKind, TypeKind, ErrorMode), &Entry)> {
        self.kinds.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
