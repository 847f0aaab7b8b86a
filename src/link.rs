//! The final pass: materialise edges out of every root-like entity.
//!
//! Heap-to-heap edges are not stored; [crate::Dump::edges] recomputes them on
//! demand from object contents. Everything that is not an object — frames,
//! the data and bss segments, other roots, queued finalizers — gets its edge
//! list built once here, after naming, so edges carry field names.
use crate::dump::Dump;
use crate::error::Error;
use crate::Edge;

pub(crate) fn link(d: &mut Dump) -> Result<(), Error> {
    // data and bss segments
    for which in 0..2 {
        let seg = if which == 0 {
            d.data.as_ref()
        } else {
            d.bss.as_ref()
        };
        let computed = match seg {
            Some(s) => {
                let mut buf = Vec::new();
                d.append_edges(&mut buf, &s.data, &s.fields)?;
                Some(buf)
            }
            None => None,
        };
        if let Some(buf) = computed {
            let seg = if which == 0 {
                d.data.as_mut()
            } else {
                d.bss.as_mut()
            };
            if let Some(s) = seg {
                s.edges = buf;
            }
        }
    }

    // stack frames
    for i in 0..d.frames.len() {
        let mut buf = Vec::new();
        {
            let f = &d.frames[i];
            d.append_edges(&mut buf, &f.data, &f.fields)?;
        }
        d.frames[i].edges = buf;
    }

    // other roots hold one direct pointer each
    for i in 0..d.other_roots.len() {
        let to_addr = d.other_roots[i].to_addr;
        let x = d.find_obj(to_addr);
        if !x.is_nil() {
            let e = Edge {
                to: x,
                from_offset: 0,
                to_offset: to_addr - d.addr(x),
                field_name: None,
            };
            d.other_roots[i].edges.push(e);
        }
    }

    // a queued finalizer keeps its object, function and both type
    // descriptors alive
    for i in 0..d.qfinalizers.len() {
        let addrs = {
            let q = &d.qfinalizers[i];
            [q.obj, q.fn_addr, q.fint, q.ot]
        };
        let mut edges = Vec::new();
        for &a in addrs.iter() {
            let x = d.find_obj(a);
            if !x.is_nil() {
                edges.push(Edge {
                    to: x,
                    from_offset: 0,
                    to_offset: a - d.addr(x),
                    field_name: None,
                });
            }
        }
        d.qfinalizers[i].edges = edges;
    }
    Ok(())
}
