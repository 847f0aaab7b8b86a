//! DWARF type materialisation.
//!
//! The executable's DWARF tree (parsed by `gimli` over sections located by
//! `object`) is lowered into a small arena of type nodes with exactly the
//! variants the heap cares about: base, pointer, struct, array, typedef and
//! subroutine. Each node exposes two flattened projections, computed lazily
//! and memoised because unrolling a large array type eagerly would be
//! catastrophic:
//!
//! * [TypeGraph::fields] — the heap-dump layout view ([Field]s), used to
//!   retag objects and name runtime types;
//! * [TypeGraph::leaves] — the flattening that keeps typed leaves, used by
//!   the propagator to find pointer slots and by frame/global naming.
use log::{debug, warn};
use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use object::{Object, ObjectSection};

use crate::error::Error;
use crate::{Field, FieldKind};

type Slice<'a> = gimli::EndianSlice<'a, gimli::RunTimeEndian>;

pub(crate) type TypeId = usize;

#[derive(Clone, Debug)]
pub(crate) struct Member {
    pub(crate) offset: u64,
    pub(crate) name: String,
    /// None when the member's type was not modeled (unions, enums, ...).
    pub(crate) typ: Option<TypeId>,
}

#[derive(Clone, Debug)]
pub(crate) enum TypeKind {
    Base { encoding: gimli::DwAte },
    Ptr { elem: Option<TypeId> },
    Struct { members: Vec<Member> },
    Array { elem: Option<TypeId> },
    Typedef { target: Option<TypeId> },
    Subroutine,
}

#[derive(Clone, Debug)]
pub(crate) struct TypeNode {
    pub(crate) name: String,
    pub(crate) size: u64,
    pub(crate) kind: TypeKind,
}

/// A typed leaf of a flattened type: where it sits, what to call it, and the
/// node it belongs to.
#[derive(Clone, Debug)]
pub(crate) struct Leaf {
    pub(crate) offset: u64,
    pub(crate) name: String,
    pub(crate) typ: TypeId,
}

pub(crate) struct TypeGraph {
    ptr_size: u64,
    nodes: Vec<TypeNode>,
    fields_memo: HashMap<TypeId, Rc<Vec<Field>>>,
    leaves_memo: HashMap<TypeId, Rc<Vec<Leaf>>>,
}

impl TypeGraph {
    pub(crate) fn new(ptr_size: u64) -> TypeGraph {
        TypeGraph {
            ptr_size,
            nodes: Vec::new(),
            fields_memo: HashMap::new(),
            leaves_memo: HashMap::new(),
        }
    }

    pub(crate) fn add(&mut self, node: TypeNode) -> TypeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Fills in a struct's members after the fact, for the mutually
    /// referential nodes tests build by hand.
    #[cfg(test)]
    pub(crate) fn set_struct_members(&mut self, t: TypeId, members: Vec<Member>) {
        if let TypeKind::Struct { members: m } = &mut self.nodes[t].kind {
            *m = members;
        }
    }

    pub(crate) fn name(&self, t: TypeId) -> &str {
        &self.nodes[t].name
    }

    /// Size in bytes, following typedef chains.
    pub(crate) fn size(&self, t: TypeId) -> u64 {
        match self.nodes[t].kind {
            TypeKind::Typedef { target: Some(x) } => self.size(x),
            TypeKind::Typedef { target: None } => 0,
            _ => self.nodes[t].size,
        }
    }

    /// Follows typedefs to the underlying node.
    pub(crate) fn resolve(&self, t: TypeId) -> TypeId {
        match self.nodes[t].kind {
            TypeKind::Typedef { target: Some(x) } => self.resolve(x),
            _ => t,
        }
    }

    /// The element type when `t` is (a typedef of) a pointer with a known
    /// pointee.
    pub(crate) fn ptr_elem(&self, t: TypeId) -> Option<TypeId> {
        match self.nodes[self.resolve(t)].kind {
            TypeKind::Ptr { elem } => elem,
            _ => None,
        }
    }

    fn scalar_kind(&self) -> FieldKind {
        if self.ptr_size == 8 {
            FieldKind::UInt64
        } else {
            FieldKind::UInt32
        }
    }

    /// The heap-dump layout of `t`.
    pub(crate) fn fields(&mut self, t: TypeId) -> Result<Rc<Vec<Field>>, Error> {
        if let Some(f) = self.fields_memo.get(&t) {
            return Ok(Rc::clone(f));
        }
        let name = self.nodes[t].name.clone();
        let size = self.nodes[t].size;
        let kind = self.nodes[t].kind.clone();
        let fields = match kind {
            TypeKind::Base { encoding } => {
                let k = base_kind(encoding, size).ok_or_else(|| Error::BadBaseType {
                    name: name.clone(),
                    encoding: u16::from(encoding.0),
                    size,
                })?;
                vec![Field::new(k, 0)]
            }
            TypeKind::Ptr { .. } => {
                let mut f = Field::new(FieldKind::Ptr, 0);
                if let Some(stripped) = name.strip_prefix('*') {
                    f.base_type = Some(stripped.to_string());
                }
                vec![f]
            }
            TypeKind::Subroutine => vec![Field::new(FieldKind::Ptr, 0)],
            TypeKind::Typedef { target } => match target {
                Some(x) => self.fields(x)?.as_ref().clone(),
                None => Vec::new(),
            },
            TypeKind::Struct { members } => match name.as_str() {
                // layouts the runtime special-cases; preserved as-is
                "string" => vec![
                    named_field(FieldKind::Ptr, 0, "str"),
                    named_field(self.scalar_kind(), self.ptr_size, "len"),
                ],
                "runtime.iface" => vec![
                    named_field(FieldKind::Ptr, 0, "itab"),
                    named_field(FieldKind::Ptr, self.ptr_size, "data"),
                ],
                "runtime.eface" => vec![
                    named_field(FieldKind::Eface, 0, "type"),
                    named_field(FieldKind::Eface, self.ptr_size, "data"),
                ],
                _ => {
                    let mut out = Vec::new();
                    for m in &members {
                        let mt = match m.typ {
                            Some(mt) => mt,
                            None => continue,
                        };
                        for f in self.fields(mt)?.iter() {
                            out.push(Field {
                                kind: f.kind,
                                offset: m.offset + f.offset,
                                name: Some(join_names(
                                    &m.name,
                                    f.name.as_ref().map(String::as_str).unwrap_or(""),
                                )),
                                base_type: f.base_type.clone(),
                            });
                        }
                    }
                    out
                }
            },
            TypeKind::Array { elem } => {
                let mut out = Vec::new();
                if let Some(e) = elem {
                    let esize = self.size(e);
                    if esize > 0 {
                        let efields = self.fields(e)?;
                        for i in 0..size / esize {
                            for f in efields.iter() {
                                out.push(Field {
                                    kind: f.kind,
                                    offset: i * esize + f.offset,
                                    name: Some(join_names(
                                        &format!("[{}]", i),
                                        f.name.as_ref().map(String::as_str).unwrap_or(""),
                                    )),
                                    base_type: f.base_type.clone(),
                                });
                            }
                        }
                    }
                }
                out
            }
        };
        let rc = Rc::new(fields);
        self.fields_memo.insert(t, Rc::clone(&rc));
        Ok(rc)
    }

    /// The typed-leaf flattening of `t`.
    pub(crate) fn leaves(&mut self, t: TypeId) -> Rc<Vec<Leaf>> {
        if let Some(l) = self.leaves_memo.get(&t) {
            return Rc::clone(l);
        }
        let size = self.nodes[t].size;
        let kind = self.nodes[t].kind.clone();
        let leaves = match kind {
            TypeKind::Base { .. } | TypeKind::Ptr { .. } | TypeKind::Subroutine => vec![Leaf {
                offset: 0,
                name: String::new(),
                typ: t,
            }],
            TypeKind::Typedef { target } => match target {
                Some(x) => self.leaves(x).as_ref().clone(),
                None => Vec::new(),
            },
            TypeKind::Struct { members } => {
                let mut out = Vec::new();
                for m in &members {
                    let mt = match m.typ {
                        Some(mt) => mt,
                        None => continue,
                    };
                    for l in self.leaves(mt).iter() {
                        out.push(Leaf {
                            offset: m.offset + l.offset,
                            name: join_names(&m.name, &l.name),
                            typ: l.typ,
                        });
                    }
                }
                out
            }
            TypeKind::Array { elem } => {
                let mut out = Vec::new();
                if let Some(e) = elem {
                    let esize = self.size(e);
                    if esize > 0 {
                        let eleaves = self.leaves(e);
                        for i in 0..size / esize {
                            for l in eleaves.iter() {
                                out.push(Leaf {
                                    offset: i * esize + l.offset,
                                    name: join_names(&format!("[{}]", i), &l.name),
                                    typ: l.typ,
                                });
                            }
                        }
                    }
                }
                out
            }
        };
        let rc = Rc::new(leaves);
        self.leaves_memo.insert(t, Rc::clone(&rc));
        rc
    }
}

fn named_field(kind: FieldKind, offset: u64, name: &str) -> Field {
    let mut f = Field::new(kind, offset);
    f.name = Some(name.to_string());
    f
}

fn base_kind(encoding: gimli::DwAte, size: u64) -> Option<FieldKind> {
    match (encoding, size) {
        (gimli::DW_ATE_boolean, _) => Some(FieldKind::Bool),
        (gimli::DW_ATE_signed, 1) | (gimli::DW_ATE_signed_char, 1) => Some(FieldKind::SInt8),
        (gimli::DW_ATE_signed, 2) => Some(FieldKind::SInt16),
        (gimli::DW_ATE_signed, 4) => Some(FieldKind::SInt32),
        (gimli::DW_ATE_signed, 8) => Some(FieldKind::SInt64),
        (gimli::DW_ATE_unsigned, 1) | (gimli::DW_ATE_unsigned_char, 1) => Some(FieldKind::UInt8),
        (gimli::DW_ATE_unsigned, 2) => Some(FieldKind::UInt16),
        (gimli::DW_ATE_unsigned, 4) => Some(FieldKind::UInt32),
        (gimli::DW_ATE_unsigned, 8) => Some(FieldKind::UInt64),
        (gimli::DW_ATE_float, 4) => Some(FieldKind::Float32),
        (gimli::DW_ATE_float, 8) => Some(FieldKind::Float64),
        (gimli::DW_ATE_complex_float, 8) => Some(FieldKind::Complex64),
        (gimli::DW_ATE_complex_float, 16) => Some(FieldKind::Complex128),
        _ => None,
    }
}

/// Joins flattened field names: `a` then `b`, with array indexes glued on
/// without a separating dot.
pub(crate) fn join_names(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else if b.is_empty() {
        a.to_string()
    } else if b.starts_with('[') {
        format!("{}{}", a, b)
    } else {
        format!("{}.{}", a, b)
    }
}

/// Rewrites the compiler's internal map type names to their display form:
/// `hash<K,V>` becomes `map.hdr[K]V` and `bucket<K,V>` becomes
/// `map.bucket[K]V`.
pub(crate) fn map_name(name: &str) -> String {
    if let Some(s) = rewrite_generic(name, "hash<", "map.hdr[") {
        return s;
    }
    if let Some(s) = rewrite_generic(name, "bucket<", "map.bucket[") {
        return s;
    }
    name.to_string()
}

fn rewrite_generic(name: &str, prefix: &str, out_prefix: &str) -> Option<String> {
    let inner = name.strip_prefix(prefix)?.strip_suffix('>')?;
    let mut depth = 0u32;
    for (i, c) in inner.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                return Some(format!("{}{}]{}", out_prefix, &inner[..i], &inner[i + 1..]));
            }
            _ => {}
        }
    }
    None
}

/// Whether a pointer type legitimately has no pointee type.
fn is_untyped_ptr(name: &str) -> bool {
    name.is_empty() || name == "unsafe.Pointer" || name == "*void"
}

/// A module-level variable with a fixed address.
pub(crate) struct Global {
    pub(crate) name: String,
    pub(crate) addr: u64,
    pub(crate) typ: TypeId,
}

/// A local or formal parameter, at a CFA-relative offset (negative for
/// locals, which sit below the frame top; non-negative for parameters, which
/// sit in the adjacent frame's out-arg area).
pub(crate) struct FrameVar {
    pub(crate) name: String,
    pub(crate) offset: i64,
    pub(crate) typ: TypeId,
}

#[derive(Default)]
pub(crate) struct FuncLayout {
    pub(crate) locals: Vec<FrameVar>,
    pub(crate) params: Vec<FrameVar>,
}

/// Everything the later passes need from the executable: the type arena,
/// types by name, global variables, and per-function frame layouts.
pub(crate) struct DwarfInfo {
    pub(crate) graph: TypeGraph,
    pub(crate) by_name: HashMap<String, TypeId>,
    pub(crate) globals: Vec<Global>,
    pub(crate) funcs: HashMap<String, FuncLayout>,
}

struct RawMember {
    name: String,
    offset: u64,
    typ: Option<usize>,
}

enum RawKind {
    Base { encoding: gimli::DwAte },
    Ptr { elem: Option<usize> },
    Struct { members: Vec<RawMember> },
    Array { elem: Option<usize> },
    Typedef { target: Option<usize> },
    Subroutine,
}

/// Pass-1 skeleton of a type, keyed by its global `.debug_info` offset; type
/// references are still offsets.
struct RawType {
    off: usize,
    name: String,
    size: u64,
    kind: RawKind,
}

struct RawVar {
    func: Option<String>,
    name: String,
    offset_or_addr: i64,
    typ: usize,
    is_param: bool,
}

impl DwarfInfo {
    pub(crate) fn from_exec(path: &Path, ptr_size: u64) -> Result<DwarfInfo, Error> {
        let file = fs::File::open(path)?;
        let mmap = unsafe { memmap::Mmap::map(&file)? };
        let exec = object::File::parse(&*mmap)?;
        let endian = if exec.is_little_endian() {
            gimli::RunTimeEndian::Little
        } else {
            gimli::RunTimeEndian::Big
        };
        let load_section = |id: gimli::SectionId| -> Result<Cow<[u8]>, gimli::Error> {
            match exec.section_by_name(id.name()) {
                Some(section) => Ok(section
                    .uncompressed_data()
                    .unwrap_or(Cow::Borrowed(&[][..]))),
                None => Ok(Cow::Borrowed(&[][..])),
            }
        };
        let dwarf_cow = gimli::Dwarf::load(load_section)?;
        let dwarf = dwarf_cow.borrow(|section| gimli::EndianSlice::new(section, endian));
        DwarfInfo::from_dwarf(&dwarf, ptr_size)
    }

    /// Lowers a parsed DWARF tree. Two passes: collect skeletal types and
    /// variables with offset-valued references, then resolve references into
    /// arena indexes.
    pub(crate) fn from_dwarf(
        dwarf: &gimli::Dwarf<Slice>,
        ptr_size: u64,
    ) -> Result<DwarfInfo, Error> {
        let mut raws: Vec<RawType> = Vec::new();
        let mut raw_globals: Vec<RawVar> = Vec::new();
        let mut raw_frame_vars: Vec<RawVar> = Vec::new();

        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            let mut entries = unit.entries();
            let mut depth = 0isize;
            // innermost open struct, by (depth, raws index)
            let mut struct_stack: Vec<(isize, usize)> = Vec::new();
            let mut cur_func: Option<(isize, String)> = None;
            while let Some((delta, entry)) = entries.next_dfs()? {
                depth += delta;
                while let Some(&(d, _)) = struct_stack.last() {
                    if depth <= d {
                        struct_stack.pop();
                    } else {
                        break;
                    }
                }
                if let Some((d, _)) = &cur_func {
                    if depth <= *d {
                        cur_func = None;
                    }
                }

                let off = match entry.offset().to_debug_info_offset(&unit.header) {
                    Some(o) => o.0,
                    // type units are not referenced by go binaries
                    None => continue,
                };
                let name = attr_name(dwarf, &unit, entry)?;
                let size = attr_size(entry)?;
                let type_ref = attr_type_ref(entry, &unit)?;

                match entry.tag() {
                    gimli::DW_TAG_base_type => {
                        let encoding = attr_encoding(entry)?;
                        raws.push(RawType {
                            off,
                            name: name.unwrap_or_default(),
                            size,
                            kind: RawKind::Base { encoding },
                        });
                    }
                    gimli::DW_TAG_pointer_type => {
                        raws.push(RawType {
                            off,
                            name: name.unwrap_or_default(),
                            size: ptr_size,
                            kind: RawKind::Ptr { elem: type_ref },
                        });
                    }
                    gimli::DW_TAG_structure_type => {
                        raws.push(RawType {
                            off,
                            name: map_name(&name.unwrap_or_default()),
                            size,
                            kind: RawKind::Struct {
                                members: Vec::new(),
                            },
                        });
                        struct_stack.push((depth, raws.len() - 1));
                    }
                    gimli::DW_TAG_member => {
                        if let Some(&(d, si)) = struct_stack.last() {
                            if depth == d + 1 {
                                let mname = name.unwrap_or_default();
                                let moff = member_offset(entry, &unit, &mname)?;
                                if let RawKind::Struct { members } = &mut raws[si].kind {
                                    members.push(RawMember {
                                        name: mname,
                                        offset: moff,
                                        typ: type_ref,
                                    });
                                }
                            }
                        }
                    }
                    gimli::DW_TAG_array_type => {
                        raws.push(RawType {
                            off,
                            name: name.unwrap_or_default(),
                            size,
                            kind: RawKind::Array { elem: type_ref },
                        });
                    }
                    gimli::DW_TAG_typedef => {
                        raws.push(RawType {
                            off,
                            name: name.unwrap_or_default(),
                            size,
                            kind: RawKind::Typedef { target: type_ref },
                        });
                    }
                    gimli::DW_TAG_subroutine_type => {
                        raws.push(RawType {
                            off,
                            name: name.unwrap_or_default(),
                            size: ptr_size,
                            kind: RawKind::Subroutine,
                        });
                    }
                    gimli::DW_TAG_subprogram => {
                        if let Some(n) = name {
                            cur_func = Some((depth, n));
                        }
                    }
                    gimli::DW_TAG_variable => {
                        if depth == 1 {
                            // module-level global; only direct-address
                            // locations are usable
                            if let (Some(n), Some(t), Some(a)) =
                                (name, type_ref, global_addr(entry, &unit)?)
                            {
                                raw_globals.push(RawVar {
                                    func: None,
                                    name: n,
                                    offset_or_addr: a as i64,
                                    typ: t,
                                    is_param: false,
                                });
                            }
                        } else if let Some((_, func)) = &cur_func {
                            if let (Some(n), Some(t), Some(o)) =
                                (name, type_ref, frame_offset(entry, &unit)?)
                            {
                                raw_frame_vars.push(RawVar {
                                    func: Some(func.clone()),
                                    name: n,
                                    offset_or_addr: o,
                                    typ: t,
                                    is_param: false,
                                });
                            }
                        }
                    }
                    gimli::DW_TAG_formal_parameter => {
                        if let Some((_, func)) = &cur_func {
                            if let (Some(n), Some(t), Some(o)) =
                                (name, type_ref, frame_offset(entry, &unit)?)
                            {
                                raw_frame_vars.push(RawVar {
                                    func: Some(func.clone()),
                                    name: n,
                                    offset_or_addr: o,
                                    typ: t,
                                    is_param: true,
                                });
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        // pass 2: offsets become arena ids
        let mut id_by_off: HashMap<usize, TypeId> = HashMap::with_capacity(raws.len());
        for (i, r) in raws.iter().enumerate() {
            id_by_off.insert(r.off, i);
        }
        let resolve_ref = |o: Option<usize>| o.and_then(|o| id_by_off.get(&o).copied());

        let mut graph = TypeGraph::new(ptr_size);
        let mut by_name: HashMap<String, TypeId> = HashMap::new();
        for r in &raws {
            let kind = match &r.kind {
                RawKind::Base { encoding } => TypeKind::Base {
                    encoding: *encoding,
                },
                RawKind::Ptr { elem } => {
                    let resolved = resolve_ref(*elem);
                    if resolved.is_none() {
                        if elem.is_some() {
                            debug!("pointer type {} has an unmodeled element type", r.name);
                        } else if !is_untyped_ptr(&r.name) {
                            warn!("pointer type {} has no element type", r.name);
                        }
                    }
                    TypeKind::Ptr { elem: resolved }
                }
                RawKind::Struct { members } => TypeKind::Struct {
                    members: members
                        .iter()
                        .map(|m| Member {
                            offset: m.offset,
                            name: m.name.clone(),
                            typ: resolve_ref(m.typ),
                        })
                        .collect(),
                },
                RawKind::Array { elem } => TypeKind::Array {
                    elem: resolve_ref(*elem),
                },
                RawKind::Typedef { target } => TypeKind::Typedef {
                    target: resolve_ref(*target),
                },
                RawKind::Subroutine => TypeKind::Subroutine,
            };
            let id = graph.add(TypeNode {
                name: r.name.clone(),
                size: r.size,
                kind,
            });
            if !r.name.is_empty() {
                by_name.entry(r.name.clone()).or_insert(id);
            }
        }

        let mut globals = Vec::with_capacity(raw_globals.len());
        for v in raw_globals {
            match id_by_off.get(&v.typ) {
                Some(&t) => globals.push(Global {
                    name: v.name,
                    addr: v.offset_or_addr as u64,
                    typ: t,
                }),
                None => debug!("global {} has an unmodeled type", v.name),
            }
        }

        let mut funcs: HashMap<String, FuncLayout> = HashMap::new();
        for v in raw_frame_vars {
            let t = match id_by_off.get(&v.typ) {
                Some(&t) => t,
                None => {
                    debug!("frame variable {} has an unmodeled type", v.name);
                    continue;
                }
            };
            let func = v.func.unwrap_or_default();
            let layout = funcs.entry(func).or_insert_with(FuncLayout::default);
            let var = FrameVar {
                name: v.name,
                offset: v.offset_or_addr,
                typ: t,
            };
            if v.is_param {
                layout.params.push(var);
            } else {
                layout.locals.push(var);
            }
        }

        Ok(DwarfInfo {
            graph,
            by_name,
            globals,
            funcs,
        })
    }
}

fn attr_name(
    dwarf: &gimli::Dwarf<Slice>,
    unit: &gimli::Unit<Slice>,
    entry: &gimli::DebuggingInformationEntry<Slice>,
) -> Result<Option<String>, gimli::Error> {
    match entry.attr_value(gimli::DW_AT_name)? {
        Some(v) => {
            let s = dwarf.attr_string(unit, v)?;
            Ok(Some(s.to_string_lossy().into_owned()))
        }
        None => Ok(None),
    }
}

fn attr_size(entry: &gimli::DebuggingInformationEntry<Slice>) -> Result<u64, gimli::Error> {
    Ok(entry
        .attr_value(gimli::DW_AT_byte_size)?
        .and_then(|v| v.udata_value())
        .unwrap_or(0))
}

fn attr_encoding(
    entry: &gimli::DebuggingInformationEntry<Slice>,
) -> Result<gimli::DwAte, gimli::Error> {
    match entry.attr_value(gimli::DW_AT_encoding)? {
        Some(gimli::AttributeValue::Encoding(e)) => Ok(e),
        Some(v) => Ok(gimli::DwAte(v.udata_value().unwrap_or(0) as u8)),
        None => Ok(gimli::DwAte(0)),
    }
}

/// The referenced type's global `.debug_info` offset, if any.
fn attr_type_ref(
    entry: &gimli::DebuggingInformationEntry<Slice>,
    unit: &gimli::Unit<Slice>,
) -> Result<Option<usize>, gimli::Error> {
    match entry.attr_value(gimli::DW_AT_type)? {
        Some(gimli::AttributeValue::UnitRef(off)) => {
            Ok(off.to_debug_info_offset(&unit.header).map(|o| o.0))
        }
        Some(gimli::AttributeValue::DebugInfoRef(off)) => Ok(Some(off.0)),
        _ => Ok(None),
    }
}

/// Decodes a member offset. Accepted forms: a constant-class attribute, a
/// lone `DW_OP_plus_uconst u`, or `DW_OP_consts s; DW_OP_plus`. Anything
/// else is a hard error, the layout would be silently wrong otherwise.
fn member_offset(
    entry: &gimli::DebuggingInformationEntry<Slice>,
    unit: &gimli::Unit<Slice>,
    member_name: &str,
) -> Result<u64, Error> {
    let v = match entry.attr_value(gimli::DW_AT_data_member_location)? {
        None => return Ok(0),
        Some(v) => v,
    };
    if let Some(u) = v.udata_value() {
        return Ok(u);
    }
    if let gimli::AttributeValue::Exprloc(expr) = v {
        let mut ops = expr.operations(unit.encoding());
        match ops.next()? {
            Some(gimli::read::Operation::PlusConstant { value }) => {
                if ops.next()?.is_none() {
                    return Ok(value);
                }
            }
            Some(gimli::read::Operation::SignedConstant { value }) => {
                if let Some(gimli::read::Operation::Plus) = ops.next()? {
                    if ops.next()?.is_none() {
                        return Ok(u64::try_from(value).unwrap_or(0));
                    }
                }
            }
            _ => {}
        }
    }
    Err(Error::BadDwarfLocation(format!("member {}", member_name)))
}

/// A global's address, when its location is a lone `DW_OP_addr`.
fn global_addr(
    entry: &gimli::DebuggingInformationEntry<Slice>,
    unit: &gimli::Unit<Slice>,
) -> Result<Option<u64>, gimli::Error> {
    let expr = match entry.attr_value(gimli::DW_AT_location)? {
        Some(gimli::AttributeValue::Exprloc(e)) => e,
        _ => return Ok(None),
    };
    let mut ops = expr.operations(unit.encoding());
    if let Some(gimli::read::Operation::Address { address }) = ops.next()? {
        if ops.next()?.is_none() {
            return Ok(Some(address));
        }
    }
    Ok(None)
}

/// A frame variable's CFA-relative offset. Accepted forms:
/// `DW_OP_call_frame_cfa` alone (offset 0) or followed by
/// `DW_OP_consts s; DW_OP_plus`. Other shapes are skipped.
fn frame_offset(
    entry: &gimli::DebuggingInformationEntry<Slice>,
    unit: &gimli::Unit<Slice>,
) -> Result<Option<i64>, gimli::Error> {
    let expr = match entry.attr_value(gimli::DW_AT_location)? {
        Some(gimli::AttributeValue::Exprloc(e)) => e,
        _ => return Ok(None),
    };
    let mut ops = expr.operations(unit.encoding());
    match ops.next()? {
        Some(gimli::read::Operation::CallFrameCFA) => {}
        _ => {
            debug!("frame variable with a non-CFA location, skipping");
            return Ok(None);
        }
    }
    match ops.next()? {
        None => Ok(Some(0)),
        Some(gimli::read::Operation::SignedConstant { value }) => match ops.next()? {
            Some(gimli::read::Operation::Plus) => {
                if ops.next()?.is_none() {
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}
