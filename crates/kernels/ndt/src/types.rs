//! Type descriptors.
//!
//! A [`Type`] is an immutable, reference-counted description of how a value
//! is laid out in memory. Cloning is an `Arc` bump. Builtin scalars are
//! canonical singletons, so two `Type::int32()` handles are pointer-identical;
//! structured types compare structurally.
//!
//! # Layout
//!
//! Tuples and structs use the C layout rule: each field is aligned to its own
//! alignment in declaration order and the total size is padded to the largest
//! field alignment. The resulting offsets are the default
//! [`Arrmeta`](crate::Arrmeta) for the type.

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::error::{Error, Result};
use crate::error_mode::ErrorMode;
use crate::ids::{TypeId, TypeKind};
use crate::string::StringData;

/// Timezone attached to `time` and `datetime` types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timezone {
    /// No timezone; values are wall-clock.
    #[default]
    Naive,
    /// Values are UTC.
    Utc,
}

/// How an adapt type derives its value from its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptOp {
    /// Storage bytes are the value bytes in reversed order.
    ByteSwap,
    /// Storage is converted to the value type under the given error mode.
    Convert(ErrorMode),
}

/// A named member of a tuple or struct.
///
/// Tuple members are named by their position.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub tp: Type,
}

/// Expression type: a value type computed lazily from a storage type.
#[derive(Debug, Clone, PartialEq)]
pub struct Adapt {
    pub value: Type,
    pub storage: Type,
    pub op: AdaptOp,
}

#[derive(Debug, PartialEq)]
struct Fields {
    fields: Vec<Field>,
    offsets: Vec<usize>,
    size: usize,
    align: usize,
}

#[derive(Debug, PartialEq)]
enum Repr {
    Builtin(TypeId),
    FixedString(usize),
    String,
    FixedBytes { size: usize, align: usize },
    Date,
    Time(Timezone),
    DateTime(Timezone),
    Option(Type),
    Tuple(Fields),
    Struct(Fields),
    Adapt(Adapt),
}

/// Immutable type descriptor.
#[derive(Clone)]
pub struct Type(Arc<Repr>);

static BUILTIN_TYPES: LazyLock<Vec<Type>> = LazyLock::new(|| {
    TypeId::BUILTINS
        .iter()
        .map(|id| Type(Arc::new(Repr::Builtin(*id))))
        .collect()
});

macro_rules! builtin_constructors {
    ($($name:ident => $id:ident),* $(,)?) => {
        $(
            #[doc = concat!("The canonical `", stringify!($name), "` type.")]
            pub fn $name() -> Type {
                BUILTIN_TYPES[TypeId::$id as usize].clone()
            }
        )*
    };
}

const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

fn layout(fields: Vec<Field>) -> Fields {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut offset = 0;
    let mut align = 1;
    for field in &fields {
        let field_align = field.tp.data_alignment();
        offset = align_up(offset, field_align);
        offsets.push(offset);
        offset += field.tp.data_size();
        align = align.max(field_align);
    }
    Fields {
        fields,
        offsets,
        size: align_up(offset, align),
        align,
    }
}

impl Type {
    builtin_constructors! {
        bool => Bool,
        int8 => Int8,
        int16 => Int16,
        int32 => Int32,
        int64 => Int64,
        uint8 => UInt8,
        uint16 => UInt16,
        uint32 => UInt32,
        uint64 => UInt64,
        float16 => Float16,
        float32 => Float32,
        float64 => Float64,
        float128 => Float128,
        complex64 => Complex64,
        complex128 => Complex128,
    }

    /// The canonical builtin for `id`, or `None` when `id` is not a scalar.
    pub fn builtin(id: TypeId) -> Option<Type> {
        id.is_builtin().then(|| BUILTIN_TYPES[id as usize].clone())
    }

    /// Variable-length UTF-8 string.
    pub fn string() -> Type {
        Type(Arc::new(Repr::String))
    }

    /// Null-padded UTF-8 string of exactly `size` bytes.
    pub fn fixed_string(size: usize) -> Result<Type> {
        if size == 0 {
            return Err(Error::InvalidSize {
                what: "fixed_string",
                size,
            });
        }
        Ok(Type(Arc::new(Repr::FixedString(size))))
    }

    /// Opaque bytes of a fixed size and alignment.
    pub fn fixed_bytes(size: usize, align: usize) -> Result<Type> {
        if !align.is_power_of_two() || align > 8 {
            return Err(Error::InvalidAlignment(align));
        }
        if size == 0 || size % align != 0 {
            return Err(Error::InvalidSize {
                what: "fixed_bytes",
                size,
            });
        }
        Ok(Type(Arc::new(Repr::FixedBytes { size, align })))
    }

    /// Calendar date, stored as `i32` days since 1970-01-01.
    pub fn date() -> Type {
        Type(Arc::new(Repr::Date))
    }

    /// Time of day, stored as `i64` 100ns ticks since midnight.
    pub fn time(tz: Timezone) -> Type {
        Type(Arc::new(Repr::Time(tz)))
    }

    /// Date and time, stored as `i64` 100ns ticks since the Unix epoch.
    pub fn datetime(tz: Timezone) -> Type {
        Type(Arc::new(Repr::DateTime(tz)))
    }

    /// Nullable `value`. Wrapping an option returns it unchanged.
    pub fn option(value: Type) -> Type {
        if value.is_option() {
            return value;
        }
        Type(Arc::new(Repr::Option(value)))
    }

    /// Positional tuple.
    pub fn tuple(types: impl IntoIterator<Item = Type>) -> Type {
        let fields = types
            .into_iter()
            .enumerate()
            .map(|(i, tp)| Field {
                name: i.to_string(),
                tp,
            })
            .collect();
        Type(Arc::new(Repr::Tuple(layout(fields))))
    }

    /// Struct with named fields in declaration order.
    pub fn structure<N: Into<String>>(fields: impl IntoIterator<Item = (N, Type)>) -> Result<Type> {
        let mut out: Vec<Field> = Vec::new();
        for (name, tp) in fields {
            let name = name.into();
            if out.iter().any(|f| f.name == name) {
                return Err(Error::DuplicateField(name));
            }
            out.push(Field { name, tp });
        }
        Ok(Type(Arc::new(Repr::Struct(layout(out)))))
    }

    /// `value` stored with its bytes reversed.
    pub fn byteswap(value: Type) -> Result<Type> {
        let reject = |reason| Error::InvalidAdapt {
            value: value.to_string(),
            storage: format!("bytes[{}]", value.data_size()),
            reason,
        };
        if !value.is_builtin() || value.kind() == TypeKind::Bool {
            return Err(reject("byteswap needs a numeric builtin value type"));
        }
        if matches!(value.id(), TypeId::Float16 | TypeId::Float128) {
            return Err(reject("byteswap of float16/float128 is not supported"));
        }
        let storage = Type::fixed_bytes(value.data_size(), value.data_alignment())?;
        Ok(Type(Arc::new(Repr::Adapt(Adapt {
            value,
            storage,
            op: AdaptOp::ByteSwap,
        }))))
    }

    /// `value` computed from `storage` by assignment under `mode`.
    pub fn convert(value: Type, storage: Type, mode: ErrorMode) -> Result<Type> {
        if value.is_expression() || storage.is_expression() {
            return Err(Error::InvalidAdapt {
                value: value.to_string(),
                storage: storage.to_string(),
                reason: "nested expression types are not supported",
            });
        }
        Ok(Type(Arc::new(Repr::Adapt(Adapt {
            value,
            storage,
            op: AdaptOp::Convert(mode),
        }))))
    }

    pub fn id(&self) -> TypeId {
        match &*self.0 {
            Repr::Builtin(id) => *id,
            Repr::FixedString(_) => TypeId::FixedString,
            Repr::String => TypeId::String,
            Repr::FixedBytes { .. } => TypeId::FixedBytes,
            Repr::Date => TypeId::Date,
            Repr::Time(_) => TypeId::Time,
            Repr::DateTime(_) => TypeId::DateTime,
            Repr::Option(_) => TypeId::Option,
            Repr::Tuple(_) => TypeId::Tuple,
            Repr::Struct(_) => TypeId::Struct,
            Repr::Adapt(_) => TypeId::Adapt,
        }
    }

    pub fn kind(&self) -> TypeKind {
        self.id().kind()
    }

    /// Bytes occupied by one element.
    pub fn data_size(&self) -> usize {
        match &*self.0 {
            Repr::Builtin(id) => id.builtin_size().unwrap_or(0),
            Repr::FixedString(size) => *size,
            Repr::String => std::mem::size_of::<StringData>(),
            Repr::FixedBytes { size, .. } => *size,
            Repr::Date => 4,
            Repr::Time(_) | Repr::DateTime(_) => 8,
            Repr::Option(value) => value.data_size(),
            Repr::Tuple(fields) | Repr::Struct(fields) => fields.size,
            Repr::Adapt(adapt) => adapt.storage.data_size(),
        }
    }

    /// Required alignment of one element.
    pub fn data_alignment(&self) -> usize {
        match &*self.0 {
            Repr::Builtin(id) => id.builtin_alignment().unwrap_or(1),
            Repr::FixedString(_) => 1,
            Repr::String => std::mem::align_of::<StringData>(),
            Repr::FixedBytes { align, .. } => *align,
            Repr::Date => 4,
            Repr::Time(_) | Repr::DateTime(_) => 8,
            Repr::Option(value) => value.data_alignment(),
            Repr::Tuple(fields) | Repr::Struct(fields) => fields.align,
            Repr::Adapt(adapt) => adapt.storage.data_alignment(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(&*self.0, Repr::Builtin(_))
    }

    pub fn is_option(&self) -> bool {
        matches!(&*self.0, Repr::Option(_))
    }

    pub fn is_expression(&self) -> bool {
        matches!(&*self.0, Repr::Adapt(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(&*self.0, Repr::Tuple(_) | Repr::Struct(_))
    }

    /// Whether elements can be copied bytewise.
    ///
    /// False for anything holding a [`StringData`], which owns heap memory.
    pub fn is_pod(&self) -> bool {
        match &*self.0 {
            Repr::String => false,
            Repr::Option(value) => value.is_pod(),
            Repr::Tuple(fields) | Repr::Struct(fields) => {
                fields.fields.iter().all(|f| f.tp.is_pod())
            }
            Repr::Adapt(adapt) => adapt.storage.is_pod(),
            _ => true,
        }
    }

    /// The type values are presented as. Expression types yield their value
    /// type; everything else yields itself.
    pub fn value_type(&self) -> &Type {
        match &*self.0 {
            Repr::Adapt(adapt) => &adapt.value,
            _ => self,
        }
    }

    /// The type values are stored as.
    pub fn storage_type(&self) -> &Type {
        match &*self.0 {
            Repr::Adapt(adapt) => &adapt.storage,
            _ => self,
        }
    }

    /// Payload type of an option.
    pub fn option_value(&self) -> Option<&Type> {
        match &*self.0 {
            Repr::Option(value) => Some(value),
            _ => None,
        }
    }

    /// Members of a tuple or struct.
    pub fn fields(&self) -> Option<&[Field]> {
        match &*self.0 {
            Repr::Tuple(fields) | Repr::Struct(fields) => Some(&fields.fields),
            _ => None,
        }
    }

    /// C-layout member offsets of a tuple or struct.
    pub fn default_offsets(&self) -> Option<&[usize]> {
        match &*self.0 {
            Repr::Tuple(fields) | Repr::Struct(fields) => Some(&fields.offsets),
            _ => None,
        }
    }

    /// Index of the struct member called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        match &*self.0 {
            Repr::Struct(fields) => fields.fields.iter().position(|f| f.name == name),
            _ => None,
        }
    }

    pub fn adapt(&self) -> Option<&Adapt> {
        match &*self.0 {
            Repr::Adapt(adapt) => Some(adapt),
            _ => None,
        }
    }

    pub fn fixed_string_size(&self) -> Option<usize> {
        match &*self.0 {
            Repr::FixedString(size) => Some(*size),
            _ => None,
        }
    }

    pub fn timezone(&self) -> Option<Timezone> {
        match &*self.0 {
            Repr::Time(tz) | Repr::DateTime(tz) => Some(*tz),
            _ => None,
        }
    }

    /// Whether both handles share the same descriptor object.
    pub fn ptr_eq(&self, other: &Type) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for Type {}

fn write_tz(f: &mut fmt::Formatter<'_>, name: &str, tz: Timezone) -> fmt::Result {
    match tz {
        Timezone::Naive => f.write_str(name),
        Timezone::Utc => write!(f, "{name}[tz='UTC']"),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Repr::Builtin(id) => f.write_str(id.name()),
            Repr::FixedString(size) => write!(f, "fixed_string[{size}]"),
            Repr::String => f.write_str("string"),
            Repr::FixedBytes { size, align } => write!(f, "bytes[{size}, align={align}]"),
            Repr::Date => f.write_str("date"),
            Repr::Time(tz) => write_tz(f, "time", *tz),
            Repr::DateTime(tz) => write_tz(f, "datetime", *tz),
            Repr::Option(value) => write!(f, "?{value}"),
            Repr::Tuple(fields) => {
                f.write_str("(")?;
                for (i, field) in fields.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", field.tp)?;
                }
                f.write_str(")")
            }
            Repr::Struct(fields) => {
                f.write_str("{")?;
                for (i, field) in fields.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} : {}", field.name, field.tp)?;
                }
                f.write_str("}")
            }
            Repr::Adapt(adapt) => match adapt.op {
                AdaptOp::ByteSwap => write!(f, "byteswap[{}]", adapt.value),
                AdaptOp::Convert(_) => {
                    write!(f, "convert[to={}, from={}]", adapt.value, adapt.storage)
                }
            },
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({self})")
    }
}
