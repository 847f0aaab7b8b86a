use thiserror::Error;

/// Everything that can go wrong while reading a dump.
///
/// The dump is a single trusted artifact written by the runtime, so any
/// structural anomaly aborts the read; there is no partial recovery.
/// Non-structural oddities (layout mismatches between DWARF and the dump,
/// globals outside the data segments, conflicting propagated types) are
/// logged and skipped instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a go1.4 heap dump (bad header line)")]
    BadHeader,

    #[error("dump truncated (record at offset {0} runs past end of file)")]
    Truncated(u64),

    #[error("unknown record tag {tag} at offset {offset}")]
    UnknownTag { tag: u64, offset: u64 },

    #[error("dump has no params record")]
    MissingParams,

    #[error("bad params record: {0}")]
    BadParams(String),

    #[error("unsupported pointer size {0} (expected 4 or 8)")]
    UnsupportedPointerSize(u64),

    #[error("itab {0:#x} does not resolve to a known type descriptor")]
    MissingItab(u64),

    #[error("no type descriptor recorded at address {0:#x}")]
    MissingType(u64),

    #[error("goroutine {goid} has no bottom-of-stack frame at {addr:#x}")]
    MissingBos { goid: u64, addr: u64 },

    #[error(
        "type {name} (size {type_size}) does not fit at {addr:#x} in object of size {obj_size}"
    )]
    TypeDoesNotFit {
        name: String,
        type_size: u64,
        addr: u64,
        obj_size: u64,
    },

    #[error("unsupported DWARF location expression for {0}")]
    BadDwarfLocation(String),

    #[error("unsupported DWARF base type {name}: encoding {encoding} with size {size}")]
    BadBaseType {
        name: String,
        encoding: u16,
        size: u64,
    },

    #[error("alloc sample references unseen memory profile bucket {0:#x}")]
    MissingMemProf(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Exec(#[from] object::Error),

    #[error(transparent)]
    Dwarf(#[from] gimli::Error),
}
