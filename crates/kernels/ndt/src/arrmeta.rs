//! Layout metadata accompanying a type descriptor.
//!
//! Arrmeta carries the runtime layout parameters a kernel needs that are not
//! fixed by the type itself. For tuples and structs these are the member byte
//! offsets, which let a view reorder or pad members without a new type.

use crate::types::Type;

static EMPTY: Arrmeta = Arrmeta::Empty;

/// Read-only layout metadata for one type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Arrmeta {
    /// Scalars, strings and other types with no runtime layout parameters.
    #[default]
    Empty,
    /// Member offsets and per-member metadata of a tuple or struct.
    Fields {
        offsets: Vec<usize>,
        children: Vec<Arrmeta>,
    },
    /// Metadata of an option's payload.
    Option(Box<Arrmeta>),
}

impl Arrmeta {
    /// The standard layout for `tp`.
    pub fn default_for(tp: &Type) -> Arrmeta {
        if let (Some(fields), Some(offsets)) = (tp.fields(), tp.default_offsets()) {
            return Arrmeta::Fields {
                offsets: offsets.to_vec(),
                children: fields.iter().map(|f| Arrmeta::default_for(&f.tp)).collect(),
            };
        }
        if let Some(value) = tp.option_value() {
            return Arrmeta::Option(Box::new(Arrmeta::default_for(value)));
        }
        Arrmeta::Empty
    }

    /// Container metadata with explicit member offsets and default children.
    pub fn with_offsets(tp: &Type, offsets: Vec<usize>) -> Arrmeta {
        let children = tp
            .fields()
            .map(|fields| fields.iter().map(|f| Arrmeta::default_for(&f.tp)).collect())
            .unwrap_or_default();
        Arrmeta::Fields { offsets, children }
    }

    /// Member offsets, when this describes a container.
    pub fn field_offsets(&self) -> Option<&[usize]> {
        match self {
            Arrmeta::Fields { offsets, .. } => Some(offsets),
            _ => None,
        }
    }

    /// Metadata of member `index`; empty when absent.
    pub fn field(&self, index: usize) -> &Arrmeta {
        match self {
            Arrmeta::Fields { children, .. } => children.get(index).unwrap_or(&EMPTY),
            _ => &EMPTY,
        }
    }

    /// Metadata of an option's payload; empty when absent.
    pub fn option_value(&self) -> &Arrmeta {
        match self {
            Arrmeta::Option(child) => child,
            _ => &EMPTY,
        }
    }
}
