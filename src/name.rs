//! Field naming.
//!
//! Runs after propagation and before edge linking, so every edge can carry
//! the name of the slot it came from. With DWARF, names come from the
//! executable; without it, positional placeholders keep the graph readable.
//! Either way, every full type built from a GC signature gets its field list
//! synthesised here.
use log::{debug, warn};
use std::cmp;
use std::collections::{HashMap, HashSet};

use crate::dump::{Dump, FIELDS_ELIDE_AT};
use crate::dwarf::{join_names, DwarfInfo};
use crate::error::Error;
use crate::{Field, FieldKind};

pub(crate) fn name_with_dwarf(d: &mut Dump, dw: &mut DwarfInfo) -> Result<(), Error> {
    name_runtime_types(d, dw)?;
    name_frames(d, dw);
    name_segments(d, dw);
    synth_full_type_fields(d);
    Ok(())
}

pub(crate) fn name_fallback(d: &mut Dump) {
    for t in d.types.values_mut() {
        for (i, f) in t.fields.iter_mut().enumerate() {
            f.name = Some(format!("field{}", i));
        }
    }
    for frame in &mut d.frames {
        for (i, f) in frame.fields.iter_mut().enumerate() {
            f.name = Some(format!("var{}", i));
        }
    }
    if let Some(seg) = &mut d.data {
        for (i, f) in seg.fields.iter_mut().enumerate() {
            f.name = Some(format!("data{}", i));
        }
    }
    if let Some(seg) = &mut d.bss {
        for (i, f) in seg.fields.iter_mut().enumerate() {
            f.name = Some(format!("bss{}", i));
        }
    }
    synth_full_type_fields(d);
}

/// Gives runtime type descriptors DWARF field layouts and names, but only
/// when the two views agree; a mismatch means the DWARF type of that name is
/// not the type the runtime dumped.
fn name_runtime_types(d: &mut Dump, dw: &mut DwarfInfo) -> Result<(), Error> {
    let addrs: Vec<u64> = d.types.keys().copied().collect();
    for addr in addrs {
        let tname = d.types[&addr].name.clone();
        let dt = match dw.by_name.get(&tname) {
            Some(&dt) => dt,
            None => {
                debug!("no DWARF type named {}", tname);
                continue;
            }
        };
        let dfields = dw.graph.fields(dt)?;
        let t = d.types.get_mut(&addr).unwrap();
        if t.fields.is_empty() {
            // this dump format never records fields on type descriptors, so
            // there is nothing to cross-check; adopt the DWARF layout
            t.fields = dfields.as_ref().clone();
            continue;
        }
        if layouts_consistent(&t.fields, &dfields) {
            let by_off: HashMap<u64, &Field> = dfields.iter().map(|f| (f.offset, f)).collect();
            for f in &mut t.fields {
                if let Some(df) = by_off.get(&f.offset) {
                    f.name = df.name.clone();
                    f.base_type = df.base_type.clone();
                }
            }
        } else {
            warn!("dump and DWARF layouts disagree for type {}", tname);
        }
    }
    Ok(())
}

/// Layouts agree when every dump field has a DWARF field of the same kind at
/// the same offset, and whatever DWARF describes beyond the dump's fields
/// carries no pointers.
fn layouts_consistent(dump_fields: &[Field], dwarf_fields: &[Field]) -> bool {
    let by_off: HashMap<u64, FieldKind> =
        dwarf_fields.iter().map(|f| (f.offset, f.kind)).collect();
    for f in dump_fields {
        match by_off.get(&f.offset) {
            Some(&k) if k == f.kind => {}
            _ => return false,
        }
    }
    let dump_offs: HashSet<u64> = dump_fields.iter().map(|f| f.offset).collect();
    for f in dwarf_fields {
        if !dump_offs.contains(&f.offset) && f.kind.is_pointerish() {
            return false;
        }
    }
    true
}

fn name_frames(d: &mut Dump, dw: &mut DwarfInfo) {
    // locals are keyed by distance below the frame top, parameters by their
    // offset into the out-arg area of the adjacent frame
    let mut locals: HashMap<(String, u64), String> = HashMap::new();
    let mut args: HashMap<(String, u64), String> = HashMap::new();
    let fnames: Vec<String> = dw.funcs.keys().cloned().collect();
    for fname in fnames {
        for vi in 0..dw.funcs[&fname].locals.len() {
            let (offset, vname, typ) = {
                let v = &dw.funcs[&fname].locals[vi];
                (v.offset, v.name.clone(), v.typ)
            };
            let leaves = dw.graph.leaves(typ);
            for leaf in leaves.iter() {
                let dist = -(offset + leaf.offset as i64);
                if dist < 0 {
                    continue;
                }
                locals.insert((fname.clone(), dist as u64), join_names(&vname, &leaf.name));
            }
        }
        for vi in 0..dw.funcs[&fname].params.len() {
            let (offset, vname, typ) = {
                let v = &dw.funcs[&fname].params[vi];
                (v.offset, v.name.clone(), v.typ)
            };
            if offset < 0 {
                continue;
            }
            let leaves = dw.graph.leaves(typ);
            for leaf in leaves.iter() {
                args.insert(
                    (fname.clone(), offset as u64 + leaf.offset),
                    join_names(&vname, &leaf.name),
                );
            }
        }
    }

    for gi in 0..d.goroutines.len() {
        let mut child: Option<usize> = None;
        let mut cur = d.goroutines[gi].bos;
        while let Some(fi) = cur {
            let flen = d.frames[fi].data.len() as u64;
            let fname = d.frames[fi].name.clone();
            let cname = child.map(|ci| d.frames[ci].name.clone());
            let frame = &mut d.frames[fi];
            for f in &mut frame.fields {
                let mut n = flen
                    .checked_sub(f.offset)
                    .and_then(|dist| locals.get(&(fname.clone(), dist)))
                    .cloned();
                if n.is_none() {
                    if let Some(cn) = &cname {
                        if let Some(an) = args.get(&(cn.clone(), f.offset)) {
                            n = Some(format!("outarg.{}", an));
                        }
                    }
                }
                f.name = Some(n.unwrap_or_else(|| format!("~{}", f.offset)));
            }
            child = Some(fi);
            cur = d.frames[fi].parent;
        }
    }

    // frames that no goroutine claims still get placeholders
    for frame in &mut d.frames {
        for f in &mut frame.fields {
            if f.name.is_none() {
                f.name = Some(format!("~{}", f.offset));
            }
        }
    }
}

fn name_segments(d: &mut Dump, dw: &mut DwarfInfo) {
    // sorted intervals over the global variables' extents
    let mut intervals: Vec<(u64, u64, String)> = Vec::new();
    for g in &dw.globals {
        let size = cmp::max(dw.graph.size(g.typ), 1);
        intervals.push((g.addr, g.addr + size, g.name.clone()));
    }
    intervals.sort_unstable_by_key(|&(start, _, _)| start);

    let lookup = |addr: u64| -> Option<(u64, &str)> {
        let i = match intervals.binary_search_by_key(&addr, |&(start, _, _)| start) {
            Ok(i) => i,
            Err(0) => return None,
            Err(i) => i - 1,
        };
        let (start, end, ref name) = intervals[i];
        if addr < end {
            Some((addr - start, name))
        } else {
            None
        }
    };

    for seg in d.data.iter_mut().chain(d.bss.iter_mut()) {
        let base = seg.addr;
        for f in &mut seg.fields {
            f.name = Some(match lookup(base + f.offset) {
                Some((0, n)) => n.to_string(),
                Some((delta, n)) => format!("{}+{}", n, delta),
                None => format!("~{}", f.offset),
            });
        }
    }
}

/// Builds the field list of every signature-derived full type. `S` becomes a
/// pointer-sized scalar, `P` a pointer, `I`/`E` an interface covering two
/// words; untracked tail bytes become scalars up to [FIELDS_ELIDE_AT], the
/// rest collapses into a single `BytesElided` field.
pub(crate) fn synth_full_type_fields(d: &mut Dump) {
    let ptr_size = d.ptr_size;
    for ft in &mut d.full_types {
        if ft.fields.is_empty() {
            ft.fields = fields_for_signature(&ft.gc_sig, ft.size, ptr_size);
        }
        // non-empty means DWARF already laid the type out
    }
}

fn fields_for_signature(gc_sig: &str, size: u64, ptr_size: u64) -> Vec<Field> {
    let scalar = if ptr_size == 8 {
        FieldKind::UInt64
    } else {
        FieldKind::UInt32
    };
    let mut fields = Vec::new();
    let push = |kind: FieldKind, off: u64, fields: &mut Vec<Field>| {
        let mut f = Field::new(kind, off);
        f.name = Some(format!("f{}", off));
        fields.push(f);
    };
    let sig = gc_sig.as_bytes();
    let mut off = 0u64;
    let mut i = 0;
    while i < sig.len() {
        match sig[i] {
            b'P' => {
                push(FieldKind::Ptr, off, &mut fields);
                off += ptr_size;
                i += 1;
            }
            b'I' => {
                push(FieldKind::Iface, off, &mut fields);
                off += 2 * ptr_size;
                i += 2;
            }
            b'E' => {
                push(FieldKind::Eface, off, &mut fields);
                off += 2 * ptr_size;
                i += 2;
            }
            _ => {
                push(scalar, off, &mut fields);
                off += ptr_size;
                i += 1;
            }
        }
    }
    let limit = cmp::min(size, cmp::max(off, FIELDS_ELIDE_AT));
    while off + ptr_size <= limit {
        push(scalar, off, &mut fields);
        off += ptr_size;
    }
    if size > limit {
        push(FieldKind::BytesElided, off, &mut fields);
    }
    fields
}
