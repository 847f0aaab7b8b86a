//! The in-memory representation of a decoded heap dump.
//!
//! [Dump] owns every entity vector for the lifetime of the analysis; all
//! cross-entity references are dense indexes ([ObjId], full-type ids, frame
//! and goroutine indexes), so entities never own each other and mutual
//! frame/goroutine references stay cycle-free.
use getset::{CopyGetters, Getters};
use log::warn;
use std::collections::HashMap;
use std::mem;

use crate::error::Error;
use crate::raw::Scan;
use crate::{Edge, Field, FieldKind, ObjId};

/// Heap addresses are bucketed in windows of this many bytes; each bucket
/// remembers the lowest-index object overlapping it, so a lookup scans at
/// most one bucket's worth of objects.
const BUCKET_SIZE: u64 = 512;

/// The cutoff past which synthesised field lists stop enumerating scalar
/// slots and collapse the remainder into one `BytesElided` field.
pub(crate) const FIELDS_ELIDE_AT: u64 = 65536;

/// A heap-allocated region. Internal: the public view is through
/// [Dump::addr], [Dump::size], [Dump::ft] and [Dump::contents].
pub(crate) struct Object {
    pub(crate) addr: u64,
    /// Index into the full-type list.
    pub(crate) ft: usize,
    /// File offset of the object contents in the dump.
    pub(crate) offset: u64,
}

/// A runtime type descriptor, recorded so interface payloads can be resolved.
#[derive(Getters, CopyGetters)]
pub struct Type {
    /// Address of the type descriptor in the dumped process.
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    #[get_copy = "pub"]
    pub(crate) size: u64,
    /// Not unique: generic instantiations and renames collide.
    #[get = "pub"]
    pub(crate) name: String,
    /// Whether an empty-interface payload of this type is stored as a
    /// pointer rather than inline.
    #[get_copy = "pub"]
    pub(crate) eface_ptr: bool,
    #[get = "pub"]
    pub(crate) fields: Vec<Field>,
}

impl Type {
    pub(crate) fn parse(s: &mut Scan) -> Result<Type, Error> {
        Ok(Type {
            addr: s.uvarint()?,
            size: s.uvarint()?,
            name: s.string()?,
            eface_ptr: s.boolean()?,
            fields: Vec::new(),
        })
    }
}

/// A deduplicated object shape: every object with the same size and GC
/// signature shares one FullType.
#[derive(Getters, CopyGetters)]
pub struct FullType {
    /// Dense id, also the index into [Dump::full_types].
    #[get_copy = "pub"]
    pub(crate) id: usize,
    #[get_copy = "pub"]
    pub(crate) size: u64,
    /// One char per pointer-sized slot: S scalar, P pointer, I/E interface
    /// halves. Empty for types recovered from DWARF.
    #[get = "pub"]
    pub(crate) gc_sig: String,
    #[get = "pub"]
    pub(crate) name: String,
    #[get = "pub"]
    pub(crate) fields: Vec<Field>,
}

/// A goroutine, with its stack entered through [GoRoutine::bos].
#[derive(Getters, CopyGetters)]
pub struct GoRoutine {
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    pub(crate) bos_addr: u64,
    #[get_copy = "pub"]
    pub(crate) goid: u64,
    #[get_copy = "pub"]
    pub(crate) gopc: u64,
    #[get_copy = "pub"]
    pub(crate) status: u64,
    #[get_copy = "pub"]
    pub(crate) is_system: bool,
    #[get_copy = "pub"]
    pub(crate) is_background: bool,
    #[get_copy = "pub"]
    pub(crate) wait_since: u64,
    #[get = "pub"]
    pub(crate) wait_reason: String,
    pub(crate) ctxt_addr: u64,
    /// The scheduler context object, when it lives in the heap.
    #[get_copy = "pub"]
    pub(crate) ctxt: ObjId,
    /// Address of the OS thread (runtime M) running this goroutine, or 0.
    #[get_copy = "pub"]
    pub(crate) m_addr: u64,
    /// Head of the defer chain, or 0.
    #[get_copy = "pub"]
    pub(crate) defer_addr: u64,
    /// Head of the panic chain, or 0.
    #[get_copy = "pub"]
    pub(crate) panic_addr: u64,
    /// Index of the bottom-of-stack frame (depth 0). Set by the indexer.
    #[get_copy = "pub"]
    pub(crate) bos: Option<usize>,
}

impl GoRoutine {
    pub(crate) fn parse(s: &mut Scan) -> Result<GoRoutine, Error> {
        Ok(GoRoutine {
            addr: s.uvarint()?,
            bos_addr: s.uvarint()?,
            goid: s.uvarint()?,
            gopc: s.uvarint()?,
            status: s.uvarint()?,
            is_system: s.boolean()?,
            is_background: s.boolean()?,
            wait_since: s.uvarint()?,
            wait_reason: s.string()?,
            ctxt_addr: s.uvarint()?,
            m_addr: s.uvarint()?,
            defer_addr: s.uvarint()?,
            panic_addr: s.uvarint()?,
            ctxt: ObjId::NIL,
            bos: None,
        })
    }
}

/// One stack frame. Frames are keyed by `(addr, depth)` since zero-sized
/// frames can share an address.
#[derive(Getters, CopyGetters)]
pub struct StackFrame {
    /// Lowest address of the frame.
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    /// 0 at the bottom of the stack, increasing toward the outermost frame.
    #[get_copy = "pub"]
    pub(crate) depth: u64,
    /// Address of the frame below this one, or 0 at the bottom.
    #[get_copy = "pub"]
    pub(crate) child_addr: u64,
    #[get = "pub"]
    pub(crate) data: Vec<u8>,
    #[get_copy = "pub"]
    pub(crate) entry: u64,
    #[get_copy = "pub"]
    pub(crate) pc: u64,
    #[get_copy = "pub"]
    pub(crate) contin_pc: u64,
    #[get = "pub"]
    pub(crate) name: String,
    /// Live pointer slots, as recorded by the collector at dump time.
    #[get = "pub"]
    pub(crate) fields: Vec<Field>,
    #[get = "pub"]
    pub(crate) edges: Vec<Edge>,
    /// Index of the frame above (this frame's caller). Set by the indexer.
    #[get_copy = "pub"]
    pub(crate) parent: Option<usize>,
    /// Index of the owning goroutine. Set by the indexer.
    #[get_copy = "pub"]
    pub(crate) goroutine: Option<usize>,
}

impl StackFrame {
    pub(crate) fn parse(s: &mut Scan) -> Result<StackFrame, Error> {
        Ok(StackFrame {
            addr: s.uvarint()?,
            depth: s.uvarint()?,
            child_addr: s.uvarint()?,
            data: s.bytes()?.to_vec(),
            entry: s.uvarint()?,
            pc: s.uvarint()?,
            contin_pc: s.uvarint()?,
            name: s.string()?,
            fields: s.fields()?,
            edges: Vec::new(),
            parent: None,
            goroutine: None,
        })
    }
}

/// The data or bss segment.
#[derive(Getters, CopyGetters)]
pub struct Segment {
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    #[get = "pub"]
    pub(crate) data: Vec<u8>,
    #[get = "pub"]
    pub(crate) fields: Vec<Field>,
    #[get = "pub"]
    pub(crate) edges: Vec<Edge>,
}

impl Segment {
    pub(crate) fn parse(s: &mut Scan) -> Result<Segment, Error> {
        Ok(Segment {
            addr: s.uvarint()?,
            data: s.bytes()?.to_vec(),
            fields: s.fields()?,
            edges: Vec::new(),
        })
    }
}

/// A root the runtime knows about that is none of the typed kinds.
#[derive(Getters, CopyGetters)]
pub struct OtherRoot {
    #[get = "pub"]
    pub(crate) description: String,
    pub(crate) to_addr: u64,
    #[get = "pub"]
    pub(crate) edges: Vec<Edge>,
}

impl OtherRoot {
    pub(crate) fn parse(s: &mut Scan) -> Result<OtherRoot, Error> {
        Ok(OtherRoot {
            description: s.string()?,
            to_addr: s.uvarint()?,
            edges: Vec::new(),
        })
    }
}

/// A finalizer registered on a heap object but not yet ready to run.
#[derive(CopyGetters)]
pub struct Finalizer {
    #[get_copy = "pub"]
    pub(crate) obj: u64,
    #[get_copy = "pub"]
    pub(crate) fn_addr: u64,
    /// Entry pc of the finalizer function.
    #[get_copy = "pub"]
    pub(crate) code: u64,
    /// Type of the finalizer argument.
    #[get_copy = "pub"]
    pub(crate) fint: u64,
    /// Type of the object being finalized.
    #[get_copy = "pub"]
    pub(crate) ot: u64,
}

impl Finalizer {
    pub(crate) fn parse(s: &mut Scan) -> Result<Finalizer, Error> {
        Ok(Finalizer {
            obj: s.uvarint()?,
            fn_addr: s.uvarint()?,
            code: s.uvarint()?,
            fint: s.uvarint()?,
            ot: s.uvarint()?,
        })
    }
}

/// A finalizer whose object became unreachable and is queued to run; unlike
/// [Finalizer] it keeps its targets alive, so it links edges.
#[derive(Getters, CopyGetters)]
pub struct QFinalizer {
    #[get_copy = "pub"]
    pub(crate) obj: u64,
    #[get_copy = "pub"]
    pub(crate) fn_addr: u64,
    #[get_copy = "pub"]
    pub(crate) code: u64,
    #[get_copy = "pub"]
    pub(crate) fint: u64,
    #[get_copy = "pub"]
    pub(crate) ot: u64,
    #[get = "pub"]
    pub(crate) edges: Vec<Edge>,
}

impl QFinalizer {
    pub(crate) fn parse(s: &mut Scan) -> Result<QFinalizer, Error> {
        Ok(QFinalizer {
            obj: s.uvarint()?,
            fn_addr: s.uvarint()?,
            code: s.uvarint()?,
            fint: s.uvarint()?,
            ot: s.uvarint()?,
            edges: Vec::new(),
        })
    }
}

/// A deferred call record hanging off a goroutine.
#[derive(CopyGetters)]
pub struct Defer {
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    #[get_copy = "pub"]
    pub(crate) gp: u64,
    #[get_copy = "pub"]
    pub(crate) argp: u64,
    #[get_copy = "pub"]
    pub(crate) pc: u64,
    #[get_copy = "pub"]
    pub(crate) fn_addr: u64,
    #[get_copy = "pub"]
    pub(crate) code: u64,
    #[get_copy = "pub"]
    pub(crate) link: u64,
}

impl Defer {
    pub(crate) fn parse(s: &mut Scan) -> Result<Defer, Error> {
        Ok(Defer {
            addr: s.uvarint()?,
            gp: s.uvarint()?,
            argp: s.uvarint()?,
            pc: s.uvarint()?,
            fn_addr: s.uvarint()?,
            code: s.uvarint()?,
            link: s.uvarint()?,
        })
    }
}

/// An in-flight panic record hanging off a goroutine.
#[derive(CopyGetters)]
pub struct Panic {
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    #[get_copy = "pub"]
    pub(crate) gp: u64,
    /// Type word of the panic argument's eface.
    #[get_copy = "pub"]
    pub(crate) typ: u64,
    /// Data word of the panic argument's eface.
    #[get_copy = "pub"]
    pub(crate) data: u64,
    #[get_copy = "pub"]
    pub(crate) defr: u64,
    #[get_copy = "pub"]
    pub(crate) link: u64,
}

impl Panic {
    pub(crate) fn parse(s: &mut Scan) -> Result<Panic, Error> {
        Ok(Panic {
            addr: s.uvarint()?,
            gp: s.uvarint()?,
            typ: s.uvarint()?,
            data: s.uvarint()?,
            defr: s.uvarint()?,
            link: s.uvarint()?,
        })
    }
}

/// An OS thread (runtime M).
#[derive(CopyGetters)]
pub struct OsThread {
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    #[get_copy = "pub"]
    pub(crate) id: u64,
    #[get_copy = "pub"]
    pub(crate) proc_id: u64,
}

impl OsThread {
    pub(crate) fn parse(s: &mut Scan) -> Result<OsThread, Error> {
        Ok(OsThread {
            addr: s.uvarint()?,
            id: s.uvarint()?,
            proc_id: s.uvarint()?,
        })
    }
}

/// One call site in a memory-profile stack.
#[derive(Getters, CopyGetters)]
pub struct MemProfFrame {
    #[get = "pub"]
    pub(crate) func: String,
    #[get = "pub"]
    pub(crate) file: String,
    #[get_copy = "pub"]
    pub(crate) line: u64,
}

/// One allocation-site bucket of the memory profile.
#[derive(Getters, CopyGetters)]
pub struct MemProfEntry {
    /// The bucket address; alloc samples refer to it.
    #[get_copy = "pub"]
    pub(crate) key: u64,
    #[get_copy = "pub"]
    pub(crate) size: u64,
    #[get = "pub"]
    pub(crate) stack: Vec<MemProfFrame>,
    #[get_copy = "pub"]
    pub(crate) allocs: u64,
    #[get_copy = "pub"]
    pub(crate) frees: u64,
}

impl MemProfEntry {
    pub(crate) fn parse(s: &mut Scan) -> Result<MemProfEntry, Error> {
        let key = s.uvarint()?;
        let size = s.uvarint()?;
        let nstk = s.uvarint()?;
        let mut stack = Vec::with_capacity(nstk as usize);
        for _ in 0..nstk {
            stack.push(MemProfFrame {
                func: s.string()?,
                file: s.string()?,
                line: s.uvarint()?,
            });
        }
        Ok(MemProfEntry {
            key,
            size,
            stack,
            allocs: s.uvarint()?,
            frees: s.uvarint()?,
        })
    }
}

/// A sampled allocation attributed to a memory-profile bucket.
#[derive(CopyGetters)]
pub struct AllocSample {
    #[get_copy = "pub"]
    pub(crate) addr: u64,
    /// Index into [Dump::mem_prof].
    #[get_copy = "pub"]
    pub(crate) prof: usize,
}

/// The runtime's memstats block at dump time.
#[derive(Getters, CopyGetters)]
pub struct MemStats {
    #[get_copy = "pub"]
    pub(crate) alloc: u64,
    #[get_copy = "pub"]
    pub(crate) total_alloc: u64,
    #[get_copy = "pub"]
    pub(crate) sys: u64,
    #[get_copy = "pub"]
    pub(crate) lookups: u64,
    #[get_copy = "pub"]
    pub(crate) mallocs: u64,
    #[get_copy = "pub"]
    pub(crate) frees: u64,
    #[get_copy = "pub"]
    pub(crate) heap_alloc: u64,
    #[get_copy = "pub"]
    pub(crate) heap_sys: u64,
    #[get_copy = "pub"]
    pub(crate) heap_idle: u64,
    #[get_copy = "pub"]
    pub(crate) heap_inuse: u64,
    #[get_copy = "pub"]
    pub(crate) heap_released: u64,
    #[get_copy = "pub"]
    pub(crate) heap_objects: u64,
    #[get_copy = "pub"]
    pub(crate) stack_inuse: u64,
    #[get_copy = "pub"]
    pub(crate) stack_sys: u64,
    #[get_copy = "pub"]
    pub(crate) mspan_inuse: u64,
    #[get_copy = "pub"]
    pub(crate) mspan_sys: u64,
    #[get_copy = "pub"]
    pub(crate) mcache_inuse: u64,
    #[get_copy = "pub"]
    pub(crate) mcache_sys: u64,
    #[get_copy = "pub"]
    pub(crate) buck_hash_sys: u64,
    #[get_copy = "pub"]
    pub(crate) gc_sys: u64,
    #[get_copy = "pub"]
    pub(crate) other_sys: u64,
    #[get_copy = "pub"]
    pub(crate) next_gc: u64,
    #[get_copy = "pub"]
    pub(crate) last_gc: u64,
    #[get_copy = "pub"]
    pub(crate) pause_total_ns: u64,
    /// Circular buffer of recent GC pause durations.
    #[get = "pub"]
    pub(crate) pause_ns: Vec<u64>,
    #[get_copy = "pub"]
    pub(crate) num_gc: u64,
}

impl MemStats {
    pub(crate) fn parse(s: &mut Scan) -> Result<MemStats, Error> {
        let mut m = MemStats {
            alloc: s.uvarint()?,
            total_alloc: s.uvarint()?,
            sys: s.uvarint()?,
            lookups: s.uvarint()?,
            mallocs: s.uvarint()?,
            frees: s.uvarint()?,
            heap_alloc: s.uvarint()?,
            heap_sys: s.uvarint()?,
            heap_idle: s.uvarint()?,
            heap_inuse: s.uvarint()?,
            heap_released: s.uvarint()?,
            heap_objects: s.uvarint()?,
            stack_inuse: s.uvarint()?,
            stack_sys: s.uvarint()?,
            mspan_inuse: s.uvarint()?,
            mspan_sys: s.uvarint()?,
            mcache_inuse: s.uvarint()?,
            mcache_sys: s.uvarint()?,
            buck_hash_sys: s.uvarint()?,
            gc_sys: s.uvarint()?,
            other_sys: s.uvarint()?,
            next_gc: s.uvarint()?,
            last_gc: s.uvarint()?,
            pause_total_ns: s.uvarint()?,
            pause_ns: Vec::with_capacity(256),
            num_gc: 0,
        };
        for _ in 0..256 {
            m.pause_ns.push(s.uvarint()?);
        }
        m.num_gc = s.uvarint()?;
        Ok(m)
    }
}

/// Everything decoded from one heap dump.
///
/// Built exclusively by [crate::read]. The memory map of the dump file is
/// retained so [Dump::contents] and [Dump::edges] can re-read object payloads
/// by their recorded file offsets without copying them up front.
#[derive(Getters, CopyGetters)]
pub struct Dump {
    #[get_copy = "pub"]
    pub(crate) big_endian: bool,
    /// 4 or 8.
    #[get_copy = "pub"]
    pub(crate) ptr_size: u64,
    #[get_copy = "pub"]
    pub(crate) heap_start: u64,
    #[get_copy = "pub"]
    pub(crate) heap_end: u64,
    /// Size of the runtime channel header for this pointer width.
    #[get_copy = "pub"]
    pub(crate) hchan_size: u64,
    /// The architecture character of the toolchain that built the program.
    #[get_copy = "pub"]
    pub(crate) the_char: u8,
    #[get = "pub"]
    pub(crate) experiment: String,
    #[get_copy = "pub"]
    pub(crate) ncpu: u64,

    /// Type descriptors by their runtime address.
    #[get = "pub"]
    pub(crate) types: HashMap<u64, Type>,
    /// Itab address → concrete type descriptor address (or 0).
    #[get = "pub"]
    pub(crate) itabs: HashMap<u64, u64>,
    #[get = "pub"]
    pub(crate) full_types: Vec<FullType>,
    #[get = "pub"]
    pub(crate) goroutines: Vec<GoRoutine>,
    #[get = "pub"]
    pub(crate) frames: Vec<StackFrame>,
    #[get = "pub"]
    pub(crate) other_roots: Vec<OtherRoot>,
    #[get = "pub"]
    pub(crate) data: Option<Segment>,
    #[get = "pub"]
    pub(crate) bss: Option<Segment>,
    #[get = "pub"]
    pub(crate) finalizers: Vec<Finalizer>,
    #[get = "pub"]
    pub(crate) qfinalizers: Vec<QFinalizer>,
    #[get = "pub"]
    pub(crate) defers: Vec<Defer>,
    #[get = "pub"]
    pub(crate) panics: Vec<Panic>,
    #[get = "pub"]
    pub(crate) os_threads: Vec<OsThread>,
    #[get = "pub"]
    pub(crate) mem_prof: Vec<MemProfEntry>,
    #[get = "pub"]
    pub(crate) alloc_samples: Vec<AllocSample>,
    #[get = "pub"]
    pub(crate) mem_stats: Option<MemStats>,

    pub(crate) objects: Vec<Object>,
    /// Interning map for full types, keyed by (size, gc signature).
    pub(crate) ft_by_sig: HashMap<(u64, String), usize>,
    /// Bucket index: lowest object index overlapping each heap window.
    pub(crate) idx: Vec<u32>,
    /// The mapped dump file; object contents are slices into it.
    pub(crate) mmap: memmap::Mmap,
    /// Reused by [Dump::edges] so repeat calls do not allocate.
    pub(crate) edge_scratch: Vec<Edge>,
}

impl Dump {
    pub(crate) fn new(mmap: memmap::Mmap) -> Dump {
        Dump {
            big_endian: false,
            ptr_size: 0,
            heap_start: 0,
            heap_end: 0,
            hchan_size: 0,
            the_char: 0,
            experiment: String::new(),
            ncpu: 0,
            types: HashMap::new(),
            itabs: HashMap::new(),
            full_types: Vec::new(),
            goroutines: Vec::new(),
            frames: Vec::new(),
            other_roots: Vec::new(),
            data: None,
            bss: None,
            finalizers: Vec::new(),
            qfinalizers: Vec::new(),
            defers: Vec::new(),
            panics: Vec::new(),
            os_threads: Vec::new(),
            mem_prof: Vec::new(),
            alloc_samples: Vec::new(),
            mem_stats: None,
            objects: Vec::new(),
            ft_by_sig: HashMap::new(),
            idx: Vec::new(),
            mmap,
            edge_scratch: Vec::new(),
        }
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn addr(&self, x: ObjId) -> u64 {
        self.objects[x.index()].addr
    }

    pub fn size(&self, x: ObjId) -> u64 {
        self.full_types[self.objects[x.index()].ft].size
    }

    pub fn ft(&self, x: ObjId) -> &FullType {
        &self.full_types[self.objects[x.index()].ft]
    }

    /// The raw bytes of an object, read back from the mapped dump file.
    pub fn contents(&self, x: ObjId) -> &[u8] {
        let o = &self.objects[x.index()];
        let size = self.full_types[o.ft].size;
        &self.mmap[o.offset as usize..(o.offset + size) as usize]
    }

    /// Finds the object whose extent contains `addr`, or [ObjId::NIL].
    pub fn find_obj(&self, addr: u64) -> ObjId {
        if addr < self.heap_start || addr >= self.heap_end {
            return ObjId::NIL;
        }
        let b = ((addr - self.heap_start) / BUCKET_SIZE) as usize;
        if b >= self.idx.len() {
            return ObjId::NIL;
        }
        for i in self.idx[b] as usize..self.objects.len() {
            let o = &self.objects[i];
            if addr < o.addr {
                break;
            }
            if addr < o.addr + self.full_types[o.ft].size {
                return ObjId::from(i);
            }
        }
        ObjId::NIL
    }

    /// The pointers out of an object, resolved against its current type.
    ///
    /// The result is computed into a buffer owned by the Dump and borrowed
    /// back to the caller; repeat calls reuse it, which is why this takes
    /// `&mut self`. Callers needing to hold several edge lists at once must
    /// copy them out.
    pub fn edges(&mut self, x: ObjId) -> Result<&[Edge], Error> {
        let mut buf = mem::replace(&mut self.edge_scratch, Vec::new());
        buf.clear();
        let res = {
            let o = &self.objects[x.index()];
            let ft = &self.full_types[o.ft];
            let data = &self.mmap[o.offset as usize..(o.offset + ft.size) as usize];
            self.append_edges(&mut buf, data, &ft.fields)
        };
        self.edge_scratch = buf;
        res?;
        Ok(&self.edge_scratch)
    }

    /// Reads a pointer-sized word out of `data`, honoring the dump's byte
    /// order. Short reads yield 0.
    pub(crate) fn read_ptr(&self, data: &[u8]) -> u64 {
        if (data.len() as u64) < self.ptr_size {
            return 0;
        }
        match (self.ptr_size, self.big_endian) {
            (8, false) => u64::from_le_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]),
            (8, true) => u64::from_be_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]),
            (4, false) => u64::from(u32::from_le_bytes([data[0], data[1], data[2], data[3]])),
            (4, true) => u64::from(u32::from_be_bytes([data[0], data[1], data[2], data[3]])),
            _ => 0,
        }
    }

    fn append_edge(&self, buf: &mut Vec<Edge>, data: &[u8], off: u64, name: Option<&str>) {
        if off + self.ptr_size > data.len() as u64 {
            return;
        }
        let p = self.read_ptr(&data[off as usize..]);
        let to = self.find_obj(p);
        if !to.is_nil() {
            buf.push(Edge {
                to,
                from_offset: off,
                to_offset: p - self.addr(to),
                field_name: name.map(str::to_owned),
            });
        }
    }

    /// Walks a field list over `data` and appends an edge for every
    /// pointer-like slot that lands in a heap object.
    pub(crate) fn append_edges(
        &self,
        buf: &mut Vec<Edge>,
        data: &[u8],
        fields: &[Field],
    ) -> Result<(), Error> {
        for f in fields {
            let off = f.offset;
            if off + self.ptr_size > data.len() as u64 {
                continue;
            }
            match f.kind {
                FieldKind::Ptr | FieldKind::String | FieldKind::Slice => {
                    self.append_edge(buf, data, off, f.name.as_deref());
                }
                FieldKind::Eface => {
                    let taddr = self.read_ptr(&data[off as usize..]);
                    if taddr == 0 {
                        continue;
                    }
                    let t = self.types.get(&taddr).ok_or(Error::MissingType(taddr))?;
                    if t.eface_ptr {
                        self.append_edge(buf, data, off + self.ptr_size, f.name.as_deref());
                    }
                }
                FieldKind::Iface => {
                    let itab = self.read_ptr(&data[off as usize..]);
                    if itab == 0 {
                        continue;
                    }
                    let taddr = *self.itabs.get(&itab).ok_or(Error::MissingItab(itab))?;
                    if taddr == 0 {
                        continue;
                    }
                    let t = self.types.get(&taddr).ok_or(Error::MissingType(taddr))?;
                    if t.eface_ptr {
                        self.append_edge(buf, data, off + self.ptr_size, f.name.as_deref());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Returns the id of the full type for `(size, gc_sig)`, creating it on
    /// first sight.
    pub(crate) fn intern_full_type(&mut self, size: u64, gc_sig: String) -> usize {
        if let Some(&id) = self.ft_by_sig.get(&(size, gc_sig.clone())) {
            return id;
        }
        let id = self.full_types.len();
        let name = format!("{}_{}", size, gc_sig);
        self.full_types.push(FullType {
            id,
            size,
            gc_sig: gc_sig.clone(),
            name,
            fields: Vec::new(),
        });
        self.ft_by_sig.insert((size, gc_sig), id);
        id
    }

    /// Sorts the object table, builds the bucket index, chains stack frames
    /// and resolves goroutine anchors. Runs once, straight after decoding.
    pub(crate) fn build_index(&mut self) -> Result<(), Error> {
        self.objects.sort_unstable_by_key(|o| o.addr);

        let n = self.objects.len();
        let span = self.heap_end - self.heap_start;
        let nbuckets = ((span + BUCKET_SIZE - 1) / BUCKET_SIZE) as usize;
        self.idx = vec![n as u32; nbuckets];
        let mut prev_start = u64::MAX;
        for i in (0..n).rev() {
            let addr = self.objects[i].addr;
            let size = self.full_types[self.objects[i].ft].size;
            if size == 0 {
                continue;
            }
            if addr < self.heap_start || addr + size > self.heap_end {
                warn!("object {:#x}+{} lies outside the heap range", addr, size);
                continue;
            }
            if addr + size > prev_start {
                warn!(
                    "objects overlap: {:#x}+{} runs into the object at {:#x}",
                    addr, size, prev_start
                );
            }
            prev_start = addr;
            let lo = (addr - self.heap_start) / BUCKET_SIZE;
            let hi = (addr + size - 1 - self.heap_start) / BUCKET_SIZE;
            for j in lo..=hi {
                if (j as usize) < self.idx.len() {
                    self.idx[j as usize] = i as u32;
                }
            }
        }

        // frame chains: the frame naming a child at (addr, depth) is that
        // child's parent
        let mut by_key: HashMap<(u64, u64), usize> = HashMap::with_capacity(self.frames.len());
        for (i, f) in self.frames.iter().enumerate() {
            by_key.insert((f.addr, f.depth), i);
        }
        for i in 0..self.frames.len() {
            let (child_addr, depth) = (self.frames[i].child_addr, self.frames[i].depth);
            if depth > 0 {
                if let Some(&c) = by_key.get(&(child_addr, depth - 1)) {
                    self.frames[c].parent = Some(i);
                }
            }
        }

        for gi in 0..self.goroutines.len() {
            let (bos_addr, goid) = (self.goroutines[gi].bos_addr, self.goroutines[gi].goid);
            let bos = *by_key
                .get(&(bos_addr, 0))
                .ok_or(Error::MissingBos { goid, addr: bos_addr })?;
            self.goroutines[gi].bos = Some(bos);
            let mut f = Some(bos);
            while let Some(i) = f {
                self.frames[i].goroutine = Some(gi);
                f = self.frames[i].parent;
            }
            let ctxt_addr = self.goroutines[gi].ctxt_addr;
            self.goroutines[gi].ctxt = self.find_obj(ctxt_addr);
        }
        Ok(())
    }
}
