//! Static-to-dynamic type propagation.
//!
//! Heap objects carry no type in the dump, only a GC signature. DWARF gives
//! exact types for globals and stack slots; following the pointers out of
//! those into the heap labels the objects they reach, and a worklist then
//! pushes types through pointer fields of already-labeled objects until
//! nothing new is learned. Labeled objects are finally retagged with a
//! DWARF-derived [FullType].
use log::{debug, warn};
use std::collections::{HashMap, HashSet};

use crate::dump::{Dump, FullType};
use crate::dwarf::{DwarfInfo, TypeGraph, TypeId};
use crate::error::Error;
use crate::FieldKind;

pub(crate) fn propagate_types(d: &mut Dump, dw: &mut DwarfInfo) -> Result<(), Error> {
    // heap address -> recovered type, plus the addresses still to walk
    let mut htypes: HashMap<u64, TypeId> = HashMap::new();
    let mut worklist: Vec<u64> = Vec::new();

    // seed from globals
    for gi in 0..dw.globals.len() {
        let (addr, typ) = (dw.globals[gi].addr, dw.globals[gi].typ);
        let (base, data) = match segment_with(d, addr) {
            Some(x) => x,
            None => {
                warn!(
                    "global {} at {:#x} is outside data and bss",
                    dw.globals[gi].name, addr
                );
                continue;
            }
        };
        let leaves = dw.graph.leaves(typ);
        for leaf in leaves.iter() {
            let elem = match dw.graph.ptr_elem(leaf.typ) {
                Some(e) => e,
                None => continue,
            };
            let off = addr - base + leaf.offset;
            if off + d.ptr_size() > data.len() as u64 {
                continue;
            }
            let p = d.read_ptr(&data[off as usize..]);
            set_type(d, &dw.graph, &mut htypes, &mut worklist, p, elem)?;
        }
    }

    // seed from stacks, walking each goroutine bottom-up so every frame sees
    // the frame whose formal parameters live in its out-arg area
    for gi in 0..d.goroutines().len() {
        let mut child: Option<usize> = None;
        let mut cur = d.goroutines()[gi].bos();
        while let Some(fi) = cur {
            let live = live_slots(d, fi);
            let frame_len = d.frames()[fi].data().len() as u64;

            if let Some(layout) = dw.funcs.get(d.frames()[fi].name()) {
                for v in &layout.locals {
                    let base = frame_len as i64 + v.offset;
                    let leaves = dw.graph.leaves(v.typ);
                    for leaf in leaves.iter() {
                        let elem = match dw.graph.ptr_elem(leaf.typ) {
                            Some(e) => e,
                            None => continue,
                        };
                        let slot = base + leaf.offset as i64;
                        if slot < 0 {
                            continue;
                        }
                        let slot = slot as u64;
                        if slot + d.ptr_size() > frame_len || !live.contains(&slot) {
                            continue;
                        }
                        let p = d.read_ptr(&d.frames()[fi].data()[slot as usize..]);
                        set_type(d, &dw.graph, &mut htypes, &mut worklist, p, elem)?;
                    }
                }
            }

            if let Some(ci) = child {
                if let Some(layout) = dw.funcs.get(d.frames()[ci].name()) {
                    for v in &layout.params {
                        if v.offset < 0 {
                            continue;
                        }
                        let leaves = dw.graph.leaves(v.typ);
                        for leaf in leaves.iter() {
                            let elem = match dw.graph.ptr_elem(leaf.typ) {
                                Some(e) => e,
                                None => continue,
                            };
                            let slot = v.offset as u64 + leaf.offset;
                            if slot + d.ptr_size() > frame_len || !live.contains(&slot) {
                                continue;
                            }
                            let p = d.read_ptr(&d.frames()[fi].data()[slot as usize..]);
                            set_type(d, &dw.graph, &mut htypes, &mut worklist, p, elem)?;
                        }
                    }
                }
            }

            child = Some(fi);
            cur = d.frames()[fi].parent();
        }
    }

    // run to fixpoint
    while let Some(a) = worklist.pop() {
        let t = htypes[&a];
        let x = d.find_obj(a);
        if x.is_nil() {
            continue;
        }
        let (oaddr, osize) = (d.addr(x), d.size(x));
        let leaves = dw.graph.leaves(t);
        for leaf in leaves.iter() {
            let elem = match dw.graph.ptr_elem(leaf.typ) {
                Some(e) => e,
                None => continue,
            };
            let off = a - oaddr + leaf.offset;
            if off + d.ptr_size() > osize {
                continue;
            }
            let p = d.read_ptr(&d.contents(x)[off as usize..]);
            set_type(d, &dw.graph, &mut htypes, &mut worklist, p, elem)?;
        }
    }

    // retag objects whose start address was typed; address order keeps the
    // resulting full-type list deterministic
    let mut typed: Vec<(u64, TypeId)> = htypes.into_iter().collect();
    typed.sort_unstable_by_key(|&(a, _)| a);
    let mut ft_by_type: HashMap<(TypeId, u64), usize> = HashMap::new();
    for (a, t) in typed {
        let x = d.find_obj(a);
        if x.is_nil() || d.addr(x) != a {
            continue;
        }
        let size = d.size(x);
        let id = match ft_by_type.get(&(t, size)) {
            Some(&id) => id,
            None => {
                let fields = dw.graph.fields(t)?.as_ref().clone();
                let id = d.full_types().len();
                d.full_types.push(FullType {
                    id,
                    size,
                    gc_sig: String::new(),
                    name: dw.graph.name(t).to_string(),
                    fields,
                });
                ft_by_type.insert((t, size), id);
                id
            }
        };
        d.objects[x.index()].ft = id;
    }
    Ok(())
}

/// The live pointer slots of a frame, straight from the dump's field list.
/// An interface slot keeps both of its words alive.
fn live_slots(d: &Dump, fi: usize) -> HashSet<u64> {
    let mut live = HashSet::new();
    for f in d.frames()[fi].fields() {
        match f.kind() {
            FieldKind::Ptr => {
                live.insert(f.offset());
            }
            FieldKind::Iface | FieldKind::Eface => {
                live.insert(f.offset());
                live.insert(f.offset() + d.ptr_size());
            }
            _ => {}
        }
    }
    live
}

/// The segment (base address, bytes) containing `addr`, if any.
fn segment_with(d: &Dump, addr: u64) -> Option<(u64, &[u8])> {
    for seg in d.data().iter().chain(d.bss().iter()) {
        if addr >= seg.addr() && addr < seg.addr() + seg.data().len() as u64 {
            return Some((seg.addr(), seg.data()));
        }
    }
    None
}

/// Records that the heap address `addr` holds a value of type `typ`.
///
/// Addresses outside the heap or not landing in any object are ignored. On a
/// conflicting second assignment the first type wins and the conflict is
/// logged. A type too large for the remaining object extent is fatal.
fn set_type(
    d: &Dump,
    graph: &TypeGraph,
    htypes: &mut HashMap<u64, TypeId>,
    worklist: &mut Vec<u64>,
    addr: u64,
    typ: TypeId,
) -> Result<(), Error> {
    if addr < d.heap_start() || addr >= d.heap_end() {
        return Ok(());
    }
    if let Some(&old) = htypes.get(&addr) {
        if old != typ {
            debug!(
                "type conflict at {:#x}: keeping {}, ignoring {}",
                addr,
                graph.name(old),
                graph.name(typ)
            );
        }
        return Ok(());
    }
    let x = d.find_obj(addr);
    if x.is_nil() {
        debug!("typed pointer {:#x} does not land in any object", addr);
        return Ok(());
    }
    let type_size = graph.size(typ);
    if addr + type_size > d.addr(x) + d.size(x) {
        return Err(Error::TypeDoesNotFit {
            name: graph.name(typ).to_string(),
            type_size,
            addr,
            obj_size: d.size(x),
        });
    }
    htypes.insert(addr, typ);
    worklist.push(addr);
    Ok(())
}
