//! A library for parsing go1.4 heap dumps into a navigable object graph.
//!
//! See [read] to get started. The returned [Dump] owns every entity decoded
//! from the dump stream: heap objects, goroutines and their stack frames, the
//! data and bss segments, runtime type descriptors, itabs, finalizers and the
//! memory profile. When the originating executable is supplied as well, heap
//! objects additionally carry types recovered from DWARF by propagating the
//! static types of globals and stack slots through the pointer graph.
//!
//! # Examples
//!
//! Finding the most-pointed-at objects in a dump (no executable needed):
//!
//! ```
//! use std::collections::HashMap;
//! use std::path::Path;
//! use go_heapdump::{read, ObjId};
//!
//! fn popular_objects(dump_path: &Path) {
//!     let mut dump = read(dump_path, None).unwrap();
//!
//!     let mut in_degree: HashMap<ObjId, u64> = HashMap::new();
//!     for i in 0..dump.num_objects() {
//!         let from = ObjId::from(i);
//!         for e in dump.edges(from).unwrap() {
//!             *in_degree.entry(e.to()).or_insert(0) += 1;
//!         }
//!     }
//!
//!     let mut ranked: Vec<(ObjId, u64)> = in_degree.into_iter().collect();
//!     ranked.sort_unstable_by_key(|&(_, n)| n);
//!     ranked.reverse();
//!
//!     for (x, n) in ranked.into_iter().take(10) {
//!         println!(
//!             "{:#x} {} ({} inbound pointers)",
//!             dump.addr(x),
//!             dump.ft(x).name(),
//!             n
//!         );
//!     }
//! }
//! ```
use getset::{CopyGetters, Getters};
use std::fmt;
use std::fmt::Formatter;
use std::path::Path;
use strum_macros::EnumIter;

mod dump;
mod dwarf;
mod error;
mod link;
mod name;
mod propagate;
mod raw;

pub use dump::{
    AllocSample, Defer, Dump, Finalizer, FullType, GoRoutine, MemProfEntry, MemProfFrame,
    MemStats, OsThread, OtherRoot, Panic, QFinalizer, Segment, StackFrame, Type,
};
pub use error::Error;
pub use raw::RecordTag;

/// Reads a heap dump, builds the object index, and links the object graph.
///
/// With `exec_path` present, the executable's DWARF info additionally drives
/// type propagation (heap objects are retagged with their recovered types) and
/// field naming; without it, fields get positional fallback names.
///
/// This is the only constructor for [Dump]; all passes run inside it and the
/// result is read-only apart from the scratch buffer behind [Dump::edges].
pub fn read<P: AsRef<Path>>(dump_path: P, exec_path: Option<&Path>) -> Result<Dump, Error> {
    let mut d = raw::parse(dump_path.as_ref())?;
    d.build_index()?;
    match exec_path {
        Some(exec) => {
            let mut dw = dwarf::DwarfInfo::from_exec(exec, d.ptr_size())?;
            propagate::propagate_types(&mut d, &mut dw)?;
            name::name_with_dwarf(&mut d, &mut dw)?;
        }
        None => name::name_fallback(&mut d),
    }
    link::link(&mut d)?;
    Ok(d)
}

/// Identifies a heap object in a [Dump].
///
/// Ids are dense indexes assigned after objects are sorted by address, so they
/// are stable for the lifetime of the Dump and iterating `0..num_objects()`
/// visits the heap in address order. [ObjId::NIL] is the "no object here"
/// sentinel returned by [Dump::find_obj].
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjId {
    id: i64,
}

impl ObjId {
    /// No object at the queried address.
    pub const NIL: ObjId = ObjId { id: -1 };

    pub fn is_nil(self) -> bool {
        self.id < 0
    }

    pub(crate) fn index(self) -> usize {
        debug_assert!(self.id >= 0);
        self.id as usize
    }
}

impl From<usize> for ObjId {
    fn from(i: usize) -> ObjId {
        ObjId { id: i as i64 }
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            write!(f, "nil")
        } else {
            write!(f, "{}", self.id)
        }
    }
}

/// How a pointer-sized (or wider) slot in an object, frame or segment is
/// interpreted when walking the graph.
///
/// `Ptr`, `Iface`, `Eface`, `String` and `Slice` can produce [Edge]s; the base
/// kinds only name scalar data. `Bytes8`/`Bytes16`/`BytesElided` never appear
/// on the wire, they are synthesised when naming large untyped regions.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq, EnumIter)]
pub enum FieldKind {
    Ptr,
    Iface,
    Eface,
    String,
    Slice,
    Bool,
    SInt8,
    UInt8,
    SInt16,
    UInt16,
    SInt32,
    UInt32,
    SInt64,
    UInt64,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Bytes8,
    Bytes16,
    BytesElided,
}

impl FieldKind {
    pub(crate) fn from_num(num: u64) -> Option<FieldKind> {
        match num {
            1 => Some(FieldKind::Ptr),
            2 => Some(FieldKind::Iface),
            3 => Some(FieldKind::Eface),
            4 => Some(FieldKind::String),
            5 => Some(FieldKind::Slice),
            6 => Some(FieldKind::Bool),
            7 => Some(FieldKind::SInt8),
            8 => Some(FieldKind::UInt8),
            9 => Some(FieldKind::SInt16),
            10 => Some(FieldKind::UInt16),
            11 => Some(FieldKind::SInt32),
            12 => Some(FieldKind::UInt32),
            13 => Some(FieldKind::SInt64),
            14 => Some(FieldKind::UInt64),
            15 => Some(FieldKind::Float32),
            16 => Some(FieldKind::Float64),
            17 => Some(FieldKind::Complex64),
            18 => Some(FieldKind::Complex128),
            19 => Some(FieldKind::Bytes8),
            20 => Some(FieldKind::Bytes16),
            21 => Some(FieldKind::BytesElided),
            _ => None,
        }
    }

    pub fn num(self) -> u64 {
        match self {
            FieldKind::Ptr => 1,
            FieldKind::Iface => 2,
            FieldKind::Eface => 3,
            FieldKind::String => 4,
            FieldKind::Slice => 5,
            FieldKind::Bool => 6,
            FieldKind::SInt8 => 7,
            FieldKind::UInt8 => 8,
            FieldKind::SInt16 => 9,
            FieldKind::UInt16 => 10,
            FieldKind::SInt32 => 11,
            FieldKind::UInt32 => 12,
            FieldKind::SInt64 => 13,
            FieldKind::UInt64 => 14,
            FieldKind::Float32 => 15,
            FieldKind::Float64 => 16,
            FieldKind::Complex64 => 17,
            FieldKind::Complex128 => 18,
            FieldKind::Bytes8 => 19,
            FieldKind::Bytes16 => 20,
            FieldKind::BytesElided => 21,
        }
    }

    /// Whether slots of this kind hold a pointer the garbage collector traces.
    pub fn is_pointerish(self) -> bool {
        match self {
            FieldKind::Ptr
            | FieldKind::Iface
            | FieldKind::Eface
            | FieldKind::String
            | FieldKind::Slice => true,
            _ => false,
        }
    }
}

/// One typed slot of an object, stack frame, segment or [FullType] layout.
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct Field {
    #[get_copy = "pub"]
    pub(crate) kind: FieldKind,
    /// Offset within the containing entity's contents.
    #[get_copy = "pub"]
    pub(crate) offset: u64,
    /// Human-readable name, filled in by the naming pass.
    #[get = "pub"]
    pub(crate) name: Option<String>,
    /// For `Ptr` fields lifted from DWARF, the name of the pointee type.
    #[get = "pub"]
    pub(crate) base_type: Option<String>,
}

impl Field {
    pub(crate) fn new(kind: FieldKind, offset: u64) -> Field {
        Field {
            kind,
            offset,
            name: None,
            base_type: None,
        }
    }
}

/// A pointer from one entity to a heap object.
#[derive(Clone, Debug, Eq, PartialEq, Getters, CopyGetters)]
pub struct Edge {
    /// The object pointed to.
    #[get_copy = "pub"]
    pub(crate) to: ObjId,
    /// Offset of the pointer slot within the source entity.
    #[get_copy = "pub"]
    pub(crate) from_offset: u64,
    /// Offset within the target object that the pointer lands on.
    #[get_copy = "pub"]
    pub(crate) to_offset: u64,
    /// Name of the source field, when the naming pass produced one.
    #[get = "pub"]
    pub(crate) field_name: Option<String>,
}

/// Allow iterating over enum variants for enums that have `#[derive(EnumIter)]`.
///
/// Wrapper around `strum`'s `IntoEnumIter` so that users don't need to know
/// about `strum`.
pub trait EnumIterable {
    type Iterator: Iterator<Item = Self>;

    fn iter() -> Self::Iterator;
}

impl<T: strum::IntoEnumIterator> EnumIterable for T {
    type Iterator = T::Iterator;

    fn iter() -> Self::Iterator {
        T::iter()
    }
}
