//! End-to-end tests over synthetic dump streams.
//!
//! Dumps are fabricated with a small writer that mirrors the wire format:
//! varint tags and integers, length-prefixed strings, field lists terminated
//! by a zero kind.
use std::io::Write;

use go_heapdump::{read, Dump, Edge, Error, FieldKind, ObjId};

const PTR: u64 = 8;

struct DumpWriter {
    buf: Vec<u8>,
}

impl DumpWriter {
    fn new() -> DumpWriter {
        DumpWriter {
            buf: b"go1.4 heap dump\n".to_vec(),
        }
    }

    fn raw_header(header: &[u8]) -> DumpWriter {
        DumpWriter {
            buf: header.to_vec(),
        }
    }

    fn uvarint(&mut self, mut v: u64) -> &mut Self {
        loop {
            let mut b = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                b |= 0x80;
            }
            self.buf.push(b);
            if v == 0 {
                return self;
            }
        }
    }

    fn string(&mut self, s: &str) -> &mut Self {
        self.uvarint(s.len() as u64);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.uvarint(b.len() as u64);
        self.buf.extend_from_slice(b);
        self
    }

    fn fields(&mut self, fields: &[(u64, u64)]) -> &mut Self {
        for &(kind, off) in fields {
            self.uvarint(kind).uvarint(off);
        }
        self.uvarint(0)
    }

    /// Little-endian, 8-byte pointers.
    fn params(&mut self, heap_start: u64, heap_end: u64) -> &mut Self {
        self.uvarint(6)
            .uvarint(0)
            .uvarint(PTR)
            .uvarint(heap_start)
            .uvarint(heap_end)
            .uvarint(b'6' as u64)
            .string("")
            .uvarint(1)
    }

    fn object(&mut self, addr: u64, contents: &[u8], fields: &[(u64, u64)]) -> &mut Self {
        self.uvarint(1).uvarint(addr);
        self.bytes(contents);
        self.fields(fields)
    }

    fn type_record(&mut self, addr: u64, size: u64, name: &str, eface_ptr: bool) -> &mut Self {
        self.uvarint(3)
            .uvarint(addr)
            .uvarint(size)
            .string(name)
            .uvarint(eface_ptr as u64)
    }

    fn itab(&mut self, itab: u64, type_addr: u64) -> &mut Self {
        self.uvarint(8).uvarint(itab).uvarint(type_addr)
    }

    fn goroutine(&mut self, addr: u64, bos_addr: u64, goid: u64, ctxt_addr: u64) -> &mut Self {
        self.uvarint(4)
            .uvarint(addr)
            .uvarint(bos_addr)
            .uvarint(goid)
            .uvarint(0x400000) // gopc
            .uvarint(4) // status
            .uvarint(0)
            .uvarint(0)
            .uvarint(0) // waitsince
            .string("chan receive")
            .uvarint(ctxt_addr)
            .uvarint(0)
            .uvarint(0)
            .uvarint(0)
    }

    fn frame(
        &mut self,
        addr: u64,
        depth: u64,
        child_addr: u64,
        data: &[u8],
        name: &str,
        fields: &[(u64, u64)],
    ) -> &mut Self {
        self.uvarint(5).uvarint(addr).uvarint(depth).uvarint(child_addr);
        self.bytes(data);
        self.uvarint(0x400000).uvarint(0x400010).uvarint(0x400010);
        self.string(name);
        self.fields(fields)
    }

    fn data_segment(&mut self, addr: u64, data: &[u8], fields: &[(u64, u64)]) -> &mut Self {
        self.uvarint(12).uvarint(addr);
        self.bytes(data);
        self.fields(fields)
    }

    fn bss_segment(&mut self, addr: u64, data: &[u8], fields: &[(u64, u64)]) -> &mut Self {
        self.uvarint(13).uvarint(addr);
        self.bytes(data);
        self.fields(fields)
    }

    fn other_root(&mut self, description: &str, to_addr: u64) -> &mut Self {
        self.uvarint(2).string(description).uvarint(to_addr)
    }

    fn qfinalizer(&mut self, obj: u64, fn_addr: u64, code: u64, fint: u64, ot: u64) -> &mut Self {
        self.uvarint(11)
            .uvarint(obj)
            .uvarint(fn_addr)
            .uvarint(code)
            .uvarint(fint)
            .uvarint(ot)
    }

    fn mem_prof(
        &mut self,
        key: u64,
        size: u64,
        stack: &[(&str, &str, u64)],
        allocs: u64,
        frees: u64,
    ) -> &mut Self {
        self.uvarint(16).uvarint(key).uvarint(size);
        self.uvarint(stack.len() as u64);
        for &(func, file, line) in stack {
            self.string(func).string(file).uvarint(line);
        }
        self.uvarint(allocs).uvarint(frees)
    }

    fn alloc_sample(&mut self, addr: u64, key: u64) -> &mut Self {
        self.uvarint(17).uvarint(addr).uvarint(key)
    }

    fn mem_stats(&mut self) -> &mut Self {
        self.uvarint(10);
        for i in 1..=24u64 {
            self.uvarint(i);
        }
        for i in 0..256u64 {
            self.uvarint(i);
        }
        self.uvarint(7)
    }

    fn eof(&mut self) -> &mut Self {
        self.uvarint(0)
    }

    fn write_file(&self) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&self.buf).unwrap();
        f.flush().unwrap();
        f
    }

    fn read(&self) -> Result<Dump, Error> {
        let f = self.write_file();
        read(f.path(), None)
    }
}

fn le(v: u64) -> [u8; 8] {
    v.to_le_bytes()
}

fn words(ws: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    for &w in ws {
        out.extend_from_slice(&le(w));
    }
    out
}

#[test]
fn minimal_dump() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.object(0x1000, &words(&[0, 0]), &[(1, 0)]);
    w.eof();
    let d = w.read().unwrap();

    assert_eq!(d.num_objects(), 1);
    assert!(!d.big_endian());
    assert_eq!(d.ptr_size(), 8);
    assert_eq!(d.heap_start(), 0x1000);
    assert_eq!(d.heap_end(), 0x2000);

    let x = d.find_obj(0x1000);
    assert_eq!(x, ObjId::from(0));
    assert_eq!(d.find_obj(0x100f), x);
    assert_eq!(d.find_obj(0x1010), ObjId::NIL);
    assert_eq!(d.find_obj(0xfff), ObjId::NIL);

    assert_eq!(d.addr(x), 0x1000);
    assert_eq!(d.size(x), 16);
    assert_eq!(d.contents(x).len(), 16);
    assert_eq!(d.ft(x).gc_sig(), "P");
    assert_eq!(d.ft(x).size(), 16);
    assert_eq!(d.ft(x).name(), "16_P");
}

#[test]
fn pointer_edge_between_objects() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x1000, &words(&[0x2000]), &[(1, 0)]);
    w.object(0x2000, &words(&[0]), &[]);
    w.eof();
    let mut d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    let b = d.find_obj(0x2000);
    let edges = d.edges(a).unwrap().to_vec();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to(), b);
    assert_eq!(edges[0].from_offset(), 0);
    assert_eq!(edges[0].to_offset(), 0);

    // scalar-only object has no outgoing edges
    assert!(d.edges(b).unwrap().is_empty());
}

#[test]
fn interface_edge_resolves_through_itab() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.type_record(0x5000, 8, "main.T", true);
    w.itab(0x6000, 0x5000);
    w.object(0x1000, &words(&[0x6000, 0x2000]), &[(2, 0)]);
    w.object(0x2000, &words(&[0]), &[]);
    w.eof();
    let mut d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    let b = d.find_obj(0x2000);
    assert_eq!(d.ft(a).gc_sig(), "II");
    let edges = d.edges(a).unwrap().to_vec();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to(), b);
    assert_eq!(edges[0].from_offset(), 8);
    assert_eq!(edges[0].to_offset(), 0);
}

#[test]
fn eface_with_inline_payload_has_no_edge() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.type_record(0x5000, 8, "main.Inline", false);
    w.object(0x1000, &words(&[0x5000, 0x2000]), &[(3, 0)]);
    w.object(0x2000, &words(&[0]), &[]);
    w.eof();
    let mut d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    assert_eq!(d.ft(a).gc_sig(), "EE");
    assert!(d.edges(a).unwrap().is_empty());
}

#[test]
fn eface_with_pointer_payload_has_edge() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.type_record(0x5000, 8, "main.Boxed", true);
    w.object(0x1000, &words(&[0x5000, 0x2000]), &[(3, 0)]);
    w.object(0x2000, &words(&[0]), &[]);
    w.eof();
    let mut d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    let b = d.find_obj(0x2000);
    let edges = d.edges(a).unwrap().to_vec();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to(), b);
    assert_eq!(edges[0].from_offset(), 8);
}

#[test]
fn zero_interface_words_yield_no_edges() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x1000, &words(&[0, 0, 0, 0]), &[(2, 0), (3, 16)]);
    w.eof();
    let mut d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    assert!(d.edges(a).unwrap().is_empty());
}

#[test]
fn frame_parent_linkage() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.frame(0xa000, 0, 0, &[0u8; 16], "main.leaf", &[]);
    w.frame(0xb000, 1, 0xa000, &[0u8; 32], "main.caller", &[]);
    w.goroutine(0xc000, 0xa000, 1, 0);
    w.eof();
    let d = w.read().unwrap();

    assert_eq!(d.frames().len(), 2);
    let f0 = &d.frames()[0];
    let f1 = &d.frames()[1];
    assert_eq!(f0.name(), "main.leaf");
    assert_eq!(f0.parent(), Some(1));
    assert_eq!(f1.parent(), None);
    assert_eq!(f0.goroutine(), Some(0));
    assert_eq!(f1.goroutine(), Some(0));

    let g = &d.goroutines()[0];
    assert_eq!(g.bos(), Some(0));
    assert_eq!(g.goid(), 1);
    assert!(g.ctxt().is_nil());
    assert_eq!(g.wait_reason(), "chan receive");
}

#[test]
fn goroutine_without_bottom_frame_is_fatal() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.goroutine(0xc000, 0xdead, 3, 0);
    w.eof();
    assert!(matches!(
        w.read(),
        Err(Error::MissingBos { goid: 3, addr: 0xdead })
    ));
}

#[test]
fn bad_header_is_rejected() {
    let mut w = DumpWriter::raw_header(b"go1.5 heap dump\n");
    w.params(0x1000, 0x2000).eof();
    assert!(matches!(w.read(), Err(Error::BadHeader)));
}

#[test]
fn unknown_tag_is_fatal() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.uvarint(18);
    w.eof();
    assert!(matches!(w.read(), Err(Error::UnknownTag { tag: 18, .. })));
}

#[test]
fn truncated_stream_is_fatal() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    // an object record whose payload runs past the end of the file
    w.uvarint(1).uvarint(0x1000).uvarint(1 << 20);
    assert!(matches!(w.read(), Err(Error::Truncated(_))));
}

#[test]
fn missing_params_is_fatal() {
    let mut w = DumpWriter::new();
    w.eof();
    assert!(matches!(w.read(), Err(Error::MissingParams)));
}

#[test]
fn duplicate_type_records_are_dropped() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.type_record(0x5000, 8, "main.First", true);
    w.type_record(0x5000, 8, "main.Second", false);
    w.eof();
    let d = w.read().unwrap();

    assert_eq!(d.types().len(), 1);
    let t = &d.types()[&0x5000];
    assert_eq!(t.name(), "main.First");
    assert!(t.eface_ptr());
}

#[test]
fn dangling_itab_is_fatal() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.itab(0x6000, 0x9999);
    w.eof();
    assert!(matches!(w.read(), Err(Error::MissingItab(0x6000))));
}

#[test]
fn zero_valued_itab_is_tolerated() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.itab(0x6000, 0);
    w.eof();
    let d = w.read().unwrap();
    assert_eq!(d.itabs()[&0x6000], 0);
}

#[test]
fn alloc_sample_requires_prior_bucket() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.alloc_sample(0x1000, 0x7777);
    w.eof();
    assert!(matches!(w.read(), Err(Error::MissingMemProf(0x7777))));
}

#[test]
fn memory_profile_round_trip() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.mem_prof(
        0x7777,
        64,
        &[
            ("main.alloc", "main.go", 10),
            ("main.main", "main.go", 20),
        ],
        5,
        2,
    );
    w.alloc_sample(0x1000, 0x7777);
    w.eof();
    let d = w.read().unwrap();

    assert_eq!(d.mem_prof().len(), 1);
    let e = &d.mem_prof()[0];
    assert_eq!(e.key(), 0x7777);
    assert_eq!(e.size(), 64);
    assert_eq!(e.allocs(), 5);
    assert_eq!(e.frees(), 2);
    assert_eq!(e.stack().len(), 2);
    assert_eq!(e.stack()[0].func(), "main.alloc");
    assert_eq!(e.stack()[1].line(), 20);

    assert_eq!(d.alloc_samples().len(), 1);
    let s = &d.alloc_samples()[0];
    assert_eq!(s.addr(), 0x1000);
    assert_eq!(d.mem_prof()[s.prof()].key(), 0x7777);
}

#[test]
fn mem_stats_are_decoded() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    w.mem_stats();
    w.eof();
    let d = w.read().unwrap();

    let m = d.mem_stats().as_ref().unwrap();
    assert_eq!(m.alloc(), 1);
    assert_eq!(m.frees(), 6);
    assert_eq!(m.pause_total_ns(), 24);
    assert_eq!(m.pause_ns().len(), 256);
    assert_eq!(m.pause_ns()[255], 255);
    assert_eq!(m.num_gc(), 7);
}

#[test]
fn objects_are_sorted_and_disjoint_after_indexing() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    // recorded out of address order on purpose
    w.object(0x1040, &[0u8; 32], &[]);
    w.object(0x1000, &[0u8; 16], &[]);
    w.eof();
    let d = w.read().unwrap();

    assert_eq!(d.num_objects(), 2);
    let first = ObjId::from(0);
    let second = ObjId::from(1);
    assert!(d.addr(first) < d.addr(second));
    assert!(d.addr(first) + d.size(first) <= d.addr(second));

    // exhaustive containment sweep around both objects
    for a in 0x0ff0..0x10a0u64 {
        let x = d.find_obj(a);
        let expect = if (0x1000..0x1010).contains(&a) {
            first
        } else if (0x1040..0x1060).contains(&a) {
            second
        } else {
            ObjId::NIL
        };
        assert_eq!(x, expect, "at address {:#x}", a);
    }
}

#[test]
fn bucket_spanning_objects_are_found() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x9000);
    // 4 KiB object spans several 512-byte buckets
    w.object(0x1100, &vec![0u8; 4096], &[]);
    w.eof();
    let d = w.read().unwrap();

    let x = d.find_obj(0x1100);
    assert!(!x.is_nil());
    assert_eq!(d.find_obj(0x1100 + 4095), x);
    assert_eq!(d.find_obj(0x1100 + 2000), x);
    assert_eq!(d.find_obj(0x1100 + 4096), ObjId::NIL);
    assert_eq!(d.find_obj(0x10ff), ObjId::NIL);
}

#[test]
fn full_types_are_interned_by_size_and_signature() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x1000, &words(&[0, 0]), &[(1, 0)]);
    w.object(0x1100, &words(&[0, 0]), &[(1, 0)]);
    w.object(0x1200, &words(&[0, 0]), &[(1, 8)]);
    w.eof();
    let d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    let b = d.find_obj(0x1100);
    let c = d.find_obj(0x1200);
    assert_eq!(d.ft(a).id(), d.ft(b).id());
    assert_ne!(d.ft(a).id(), d.ft(c).id());
    assert_eq!(d.ft(c).gc_sig(), "SP");
    assert_eq!(d.full_types().len(), 2);
}

#[test]
fn edges_are_idempotent_across_calls() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x1000, &words(&[0x2000, 0x2000, 0]), &[(1, 0), (1, 8)]);
    w.object(0x2000, &words(&[0]), &[]);
    w.eof();
    let mut d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    let first: Vec<Edge> = d.edges(a).unwrap().to_vec();
    let second: Vec<Edge> = d.edges(a).unwrap().to_vec();
    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
}

#[test]
fn rereading_produces_identical_full_types() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x1000, &words(&[0, 0]), &[(1, 0)]);
    w.object(0x1100, &words(&[0, 0, 0, 0]), &[(2, 0), (3, 16)]);
    w.object(0x1200, &[0u8; 24], &[]);
    w.eof();
    let f = w.write_file();

    let d1 = read(f.path(), None).unwrap();
    let d2 = read(f.path(), None).unwrap();
    let sigs = |d: &Dump| -> Vec<(u64, String)> {
        d.full_types()
            .iter()
            .map(|ft| (ft.size(), ft.gc_sig().clone()))
            .collect()
    };
    assert_eq!(sigs(&d1), sigs(&d2));
}

#[test]
fn fallback_naming_covers_every_surface() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x1000, &words(&[0x2000, 7]), &[(1, 0)]);
    w.object(0x2000, &words(&[0]), &[]);
    w.data_segment(0xd000, &words(&[0x2000]), &[(1, 0)]);
    w.bss_segment(0xe000, &words(&[0]), &[(1, 0)]);
    w.frame(0xa000, 0, 0, &words(&[0x2000, 0]), "main.f", &[(1, 0)]);
    w.goroutine(0xc000, 0xa000, 1, 0);
    w.eof();
    let mut d = w.read().unwrap();

    // synthesised full-type fields are named by offset
    let a = d.find_obj(0x1000);
    let names: Vec<String> = d
        .ft(a)
        .fields()
        .iter()
        .map(|f| f.name().clone().unwrap())
        .collect();
    assert_eq!(names, vec!["f0", "f8"]);
    assert_eq!(d.ft(a).fields()[1].kind(), FieldKind::UInt64);

    assert_eq!(
        d.data().as_ref().unwrap().fields()[0].name().as_deref(),
        Some("data0")
    );
    assert_eq!(
        d.bss().as_ref().unwrap().fields()[0].name().as_deref(),
        Some("bss0")
    );
    assert_eq!(d.frames()[0].fields()[0].name().as_deref(), Some("var0"));

    // edges inherit the synthesised names
    let edges = d.edges(a).unwrap();
    assert_eq!(edges[0].field_name().as_deref(), Some("f0"));
}

#[test]
fn roots_and_queued_finalizers_link_edges() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x2000, &words(&[0, 0]), &[]);
    w.other_root("finalizer queue", 0x2008);
    w.qfinalizer(0x2000, 0, 0, 0, 0x2008);
    w.data_segment(0xd000, &words(&[0x2000]), &[(1, 0)]);
    w.frame(0xa000, 0, 0, &words(&[0x2000]), "main.f", &[(1, 0)]);
    w.goroutine(0xc000, 0xa000, 1, 0);
    w.eof();
    let d = w.read().unwrap();

    let b = d.find_obj(0x2000);

    let r = &d.other_roots()[0];
    assert_eq!(r.description(), "finalizer queue");
    assert_eq!(r.edges().len(), 1);
    assert_eq!(r.edges()[0].to(), b);
    assert_eq!(r.edges()[0].to_offset(), 8);

    // obj and ot both land in the object, fn and fint are zero
    let q = &d.qfinalizers()[0];
    assert_eq!(q.edges().len(), 2);
    assert!(q.edges().iter().all(|e| e.to() == b));

    assert_eq!(d.data().as_ref().unwrap().edges().len(), 1);
    assert_eq!(d.frames()[0].edges().len(), 1);
    assert_eq!(d.frames()[0].edges()[0].to(), b);
}

#[test]
fn goroutine_context_resolves_to_heap_object() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x2000, &words(&[0]), &[]);
    w.frame(0xa000, 0, 0, &[0u8; 8], "main.f", &[]);
    w.goroutine(0xc000, 0xa000, 1, 0x2000);
    w.eof();
    let d = w.read().unwrap();

    let b = d.find_obj(0x2000);
    assert_eq!(d.goroutines()[0].ctxt(), b);
}

#[test]
fn zero_sized_frames_coexist_by_depth() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x2000);
    // same frame address at two depths, both empty
    w.frame(0xa000, 0, 0, &[], "main.inner", &[]);
    w.frame(0xa000, 1, 0xa000, &[], "main.outer", &[]);
    w.goroutine(0xc000, 0xa000, 1, 0);
    w.eof();
    let d = w.read().unwrap();

    assert_eq!(d.frames().len(), 2);
    assert_eq!(d.frames()[0].parent(), Some(1));
    assert_eq!(d.frames()[1].parent(), None);
}

#[test]
fn big_endian_pointers_are_honored() {
    let mut w = DumpWriter::new();
    // params with big-endian flag set
    w.uvarint(6)
        .uvarint(1)
        .uvarint(PTR)
        .uvarint(0x1000)
        .uvarint(0x3000)
        .uvarint(b'6' as u64)
        .string("")
        .uvarint(1);
    let mut contents = Vec::new();
    contents.extend_from_slice(&0x2000u64.to_be_bytes());
    w.object(0x1000, &contents, &[(1, 0)]);
    w.object(0x2000, &[0u8; 8], &[]);
    w.eof();
    let mut d = w.read().unwrap();

    assert!(d.big_endian());
    let a = d.find_obj(0x1000);
    let b = d.find_obj(0x2000);
    let edges = d.edges(a).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to(), b);
}

#[test]
fn string_and_slice_fields_link_their_pointer_word() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x2000, &[0u8; 8], &[]);
    // the segment field list uses String and Slice kinds
    w.data_segment(
        0xd000,
        &words(&[0x2000, 1, 0x2000, 1, 1]),
        &[(4, 0), (5, 16)],
    );
    w.eof();
    let d = w.read().unwrap();

    let seg = d.data().as_ref().unwrap();
    assert_eq!(seg.edges().len(), 2);
    assert_eq!(seg.edges()[0].from_offset(), 0);
    assert_eq!(seg.edges()[1].from_offset(), 16);
}

#[test]
fn interior_pointers_record_target_offset() {
    let mut w = DumpWriter::new();
    w.params(0x1000, 0x3000);
    w.object(0x1000, &words(&[0x2010]), &[(1, 0)]);
    w.object(0x2000, &[0u8; 32], &[]);
    w.eof();
    let mut d = w.read().unwrap();

    let a = d.find_obj(0x1000);
    let b = d.find_obj(0x2000);
    let edges = d.edges(a).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to(), b);
    assert_eq!(edges[0].to_offset(), 0x10);
}

#[test]
fn large_untyped_tail_is_elided() {
    let size = 128 * 1024;
    let mut w = DumpWriter::new();
    w.params(0x100000, 0x200000);
    w.object(0x100000, &vec![0u8; size], &[(1, 0)]);
    w.eof();
    let d = w.read().unwrap();

    let x = d.find_obj(0x100000);
    let fields = d.ft(x).fields();
    let last = fields.last().unwrap();
    assert_eq!(last.kind(), FieldKind::BytesElided);
    assert_eq!(last.offset(), 64 * 1024);
    // pointer word, then scalars up to the 64 KiB cap, then the marker
    assert_eq!(fields.len(), 64 * 1024 / 8 + 1);
}
