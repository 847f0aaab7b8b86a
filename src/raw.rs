//! Wire-level decoding of the dump stream.
//!
//! A dump is one ASCII header line followed by tagged records until an EOF
//! tag. All integers are unsigned LEB128 varints, strings are length-prefixed
//! byte runs, booleans are a varint that is 0 or 1. The driver here makes a
//! single sequential pass and fills in a [Dump]; object payloads are not
//! copied, only their file offsets are recorded.
use nom::bytes::complete as bytes;
use nom::number::complete as number;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use strum_macros::EnumIter;

use crate::dump::{
    Defer, Dump, Finalizer, GoRoutine, MemProfEntry, MemStats, Object, OsThread, OtherRoot,
    Panic, QFinalizer, Segment, StackFrame, Type,
};
use crate::error::Error;
use crate::{AllocSample, Field, FieldKind};

const MAGIC: &[u8] = b"go1.4 heap dump\n";

/// Field-descriptor terminator.
const FIELD_EOL: u64 = 0;

/// Parses one unsigned LEB128 varint.
pub(crate) fn uvarint(input: &[u8]) -> nom::IResult<&[u8], u64> {
    let mut rem = input;
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let (rest, byte) = number::be_u8(rem)?;
        rem = rest;
        if shift == 63 && byte & 0x7f > 1 {
            return Err(nom::Err::Error((input, nom::error::ErrorKind::TooLarge)));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((rem, value));
        }
        shift += 7;
        if shift > 63 {
            return Err(nom::Err::Error((input, nom::error::ErrorKind::TooLarge)));
        }
    }
}

/// Cursor over the dump stream. Wraps the bare nom parsers with position
/// tracking so failures report a file offset, and exhausted input uniformly
/// becomes [Error::Truncated].
pub(crate) struct Scan<'a> {
    full: &'a [u8],
    rem: &'a [u8],
}

impl<'a> Scan<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Scan<'a> {
        Scan {
            full: data,
            rem: data,
        }
    }

    /// Offset of the next unread byte.
    pub(crate) fn pos(&self) -> u64 {
        (self.full.len() - self.rem.len()) as u64
    }

    pub(crate) fn uvarint(&mut self) -> Result<u64, Error> {
        match uvarint(self.rem) {
            Ok((rest, v)) => {
                self.rem = rest;
                Ok(v)
            }
            Err(_) => Err(Error::Truncated(self.pos())),
        }
    }

    pub(crate) fn boolean(&mut self) -> Result<bool, Error> {
        Ok(self.uvarint()? != 0)
    }

    pub(crate) fn take(&mut self, n: u64) -> Result<&'a [u8], Error> {
        let res: nom::IResult<&[u8], &[u8]> = bytes::take(n as usize)(self.rem);
        match res {
            Ok((rest, taken)) => {
                self.rem = rest;
                Ok(taken)
            }
            Err(_) => Err(Error::Truncated(self.pos())),
        }
    }

    /// A length-prefixed byte run.
    pub(crate) fn bytes(&mut self) -> Result<&'a [u8], Error> {
        let n = self.uvarint()?;
        self.take(n)
    }

    pub(crate) fn string(&mut self) -> Result<String, Error> {
        Ok(String::from_utf8_lossy(self.bytes()?).into_owned())
    }

    /// A field-descriptor list: (kind, offset) pairs until the EOL kind.
    pub(crate) fn fields(&mut self) -> Result<Vec<Field>, Error> {
        let mut fields = Vec::new();
        loop {
            let kind_pos = self.pos();
            let num = self.uvarint()?;
            if num == FIELD_EOL {
                return Ok(fields);
            }
            let offset = self.uvarint()?;
            let kind = FieldKind::from_num(num).ok_or(Error::UnknownTag {
                tag: num,
                offset: kind_pos,
            })?;
            fields.push(Field::new(kind, offset));
        }
    }
}

/// The record tags of the dump format. The format is versioned by its header
/// line, so a tag outside this table is fatal, not skippable.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq, EnumIter)]
pub enum RecordTag {
    Eof,
    Object,
    OtherRoot,
    Type,
    GoRoutine,
    StackFrame,
    Params,
    Finalizer,
    Itab,
    OsThread,
    MemStats,
    QFinal,
    Data,
    Bss,
    Defer,
    Panic,
    MemProf,
    AllocSample,
}

impl RecordTag {
    pub(crate) fn from_num(num: u64) -> Option<RecordTag> {
        match num {
            0 => Some(RecordTag::Eof),
            1 => Some(RecordTag::Object),
            2 => Some(RecordTag::OtherRoot),
            3 => Some(RecordTag::Type),
            4 => Some(RecordTag::GoRoutine),
            5 => Some(RecordTag::StackFrame),
            6 => Some(RecordTag::Params),
            7 => Some(RecordTag::Finalizer),
            8 => Some(RecordTag::Itab),
            9 => Some(RecordTag::OsThread),
            10 => Some(RecordTag::MemStats),
            11 => Some(RecordTag::QFinal),
            12 => Some(RecordTag::Data),
            13 => Some(RecordTag::Bss),
            14 => Some(RecordTag::Defer),
            15 => Some(RecordTag::Panic),
            16 => Some(RecordTag::MemProf),
            17 => Some(RecordTag::AllocSample),
            _ => None,
        }
    }

    pub fn num(self) -> u64 {
        match self {
            RecordTag::Eof => 0,
            RecordTag::Object => 1,
            RecordTag::OtherRoot => 2,
            RecordTag::Type => 3,
            RecordTag::GoRoutine => 4,
            RecordTag::StackFrame => 5,
            RecordTag::Params => 6,
            RecordTag::Finalizer => 7,
            RecordTag::Itab => 8,
            RecordTag::OsThread => 9,
            RecordTag::MemStats => 10,
            RecordTag::QFinal => 11,
            RecordTag::Data => 12,
            RecordTag::Bss => 13,
            RecordTag::Defer => 14,
            RecordTag::Panic => 15,
            RecordTag::MemProf => 16,
            RecordTag::AllocSample => 17,
        }
    }
}

/// Walks an object's GC-field descriptor and renders it as a signature
/// string: one char per pointer-sized slot, `S` for untracked gaps, `P` for
/// pointers, `II`/`EE` for the two halves of an interface.
fn gc_signature(s: &mut Scan, ptr_size: u64) -> Result<String, Error> {
    let mut sig = String::new();
    let mut off = 0u64;
    loop {
        let kind_pos = s.pos();
        let num = s.uvarint()?;
        if num == FIELD_EOL {
            return Ok(sig);
        }
        let foff = s.uvarint()?;
        while off < foff {
            sig.push('S');
            off += ptr_size;
        }
        match FieldKind::from_num(num) {
            Some(FieldKind::Ptr) => {
                sig.push('P');
                off += ptr_size;
            }
            Some(FieldKind::Iface) => {
                sig.push_str("II");
                off += 2 * ptr_size;
            }
            Some(FieldKind::Eface) => {
                sig.push_str("EE");
                off += 2 * ptr_size;
            }
            _ => {
                return Err(Error::UnknownTag {
                    tag: num,
                    offset: kind_pos,
                })
            }
        }
    }
}

/// Decodes the whole dump stream at `path` into a [Dump].
///
/// The file is mapped twice: one map backs this scan, the other is moved into
/// the Dump so object contents stay readable afterwards.
pub(crate) fn parse(path: &Path) -> Result<Dump, Error> {
    let file = fs::File::open(path)?;
    let scan_map = unsafe { memmap::Mmap::map(&file)? };
    let keep_map = unsafe { memmap::Mmap::map(&file)? };

    let data: &[u8] = &scan_map;
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        return Err(Error::BadHeader);
    }

    let mut d = Dump::new(keep_map);
    let mut s = Scan::new(data);
    s.take(MAGIC.len() as u64)?;

    let mut params_seen = false;
    let mut prof_by_key: HashMap<u64, usize> = HashMap::new();
    loop {
        let tag_pos = s.pos();
        let num = s.uvarint()?;
        let tag = RecordTag::from_num(num).ok_or(Error::UnknownTag {
            tag: num,
            offset: tag_pos,
        })?;
        match tag {
            RecordTag::Eof => break,
            RecordTag::Params => {
                d.big_endian = s.boolean()?;
                d.ptr_size = s.uvarint()?;
                if d.ptr_size != 4 && d.ptr_size != 8 {
                    return Err(Error::UnsupportedPointerSize(d.ptr_size));
                }
                d.heap_start = s.uvarint()?;
                d.heap_end = s.uvarint()?;
                if d.heap_end < d.heap_start {
                    return Err(Error::BadParams(format!(
                        "heap range {:#x}..{:#x} is inverted",
                        d.heap_start, d.heap_end
                    )));
                }
                d.the_char = s.uvarint()? as u8;
                d.experiment = s.string()?;
                d.ncpu = s.uvarint()?;
                // runtime hchan header: 96 bytes on 64-bit, 52 on 32-bit
                d.hchan_size = if d.ptr_size == 8 { 96 } else { 52 };
                params_seen = true;
            }
            RecordTag::Object => {
                if !params_seen {
                    return Err(Error::MissingParams);
                }
                let addr = s.uvarint()?;
                let size = s.uvarint()?;
                let offset = s.pos();
                s.take(size)?;
                let sig = gc_signature(&mut s, d.ptr_size)?;
                let ft = d.intern_full_type(size, sig);
                d.objects.push(Object { addr, ft, offset });
            }
            RecordTag::OtherRoot => {
                let r = OtherRoot::parse(&mut s)?;
                d.other_roots.push(r);
            }
            RecordTag::Type => {
                let t = Type::parse(&mut s)?;
                // duplicates show up once per interface the type flows
                // through; first record wins
                d.types.entry(t.addr).or_insert(t);
            }
            RecordTag::GoRoutine => {
                let g = GoRoutine::parse(&mut s)?;
                d.goroutines.push(g);
            }
            RecordTag::StackFrame => {
                let f = StackFrame::parse(&mut s)?;
                d.frames.push(f);
            }
            RecordTag::Finalizer => {
                let f = Finalizer::parse(&mut s)?;
                d.finalizers.push(f);
            }
            RecordTag::Itab => {
                let itab = s.uvarint()?;
                let type_addr = s.uvarint()?;
                d.itabs.insert(itab, type_addr);
            }
            RecordTag::OsThread => {
                let t = OsThread::parse(&mut s)?;
                d.os_threads.push(t);
            }
            RecordTag::MemStats => {
                d.mem_stats = Some(MemStats::parse(&mut s)?);
            }
            RecordTag::QFinal => {
                let f = QFinalizer::parse(&mut s)?;
                d.qfinalizers.push(f);
            }
            RecordTag::Data => {
                d.data = Some(Segment::parse(&mut s)?);
            }
            RecordTag::Bss => {
                d.bss = Some(Segment::parse(&mut s)?);
            }
            RecordTag::Defer => {
                let x = Defer::parse(&mut s)?;
                d.defers.push(x);
            }
            RecordTag::Panic => {
                let x = Panic::parse(&mut s)?;
                d.panics.push(x);
            }
            RecordTag::MemProf => {
                let e = MemProfEntry::parse(&mut s)?;
                prof_by_key.insert(e.key, d.mem_prof.len());
                d.mem_prof.push(e);
            }
            RecordTag::AllocSample => {
                let addr = s.uvarint()?;
                let key = s.uvarint()?;
                let prof = *prof_by_key.get(&key).ok_or(Error::MissingMemProf(key))?;
                d.alloc_samples.push(AllocSample { addr, prof });
            }
        }
    }

    if !params_seen {
        return Err(Error::MissingParams);
    }
    for (&itab, &type_addr) in &d.itabs {
        if type_addr != 0 && !d.types.contains_key(&type_addr) {
            return Err(Error::MissingItab(itab));
        }
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EnumIterable;

    fn encode_uvarint(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let mut b = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                b |= 0x80;
            }
            out.push(b);
            if v == 0 {
                return;
            }
        }
    }

    #[test]
    fn uvarint_single_byte() {
        assert_eq!(uvarint(&[0x00, 0xff]), Ok((&[0xff][..], 0)));
        assert_eq!(uvarint(&[0x7f]), Ok((&[][..], 127)));
    }

    #[test]
    fn uvarint_multi_byte() {
        assert_eq!(uvarint(&[0x80, 0x01]), Ok((&[][..], 128)));
        assert_eq!(uvarint(&[0xe5, 0x8e, 0x26]), Ok((&[][..], 624485)));
    }

    #[test]
    fn uvarint_round_trips() {
        for &v in &[0u64, 1, 127, 128, 300, 1 << 20, u64::MAX] {
            let mut buf = Vec::new();
            encode_uvarint(v, &mut buf);
            assert_eq!(uvarint(&buf), Ok((&[][..], v)));
        }
    }

    #[test]
    fn uvarint_rejects_overflow() {
        // eleven continuation bytes push past 64 bits
        let buf = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(uvarint(&buf).is_err());
    }

    #[test]
    fn uvarint_truncated_input() {
        assert!(uvarint(&[0x80]).is_err());
        assert!(uvarint(&[]).is_err());
    }

    #[test]
    fn scan_strings_and_positions() {
        let mut buf = Vec::new();
        encode_uvarint(5, &mut buf);
        buf.extend_from_slice(b"hello");
        let mut s = Scan::new(&buf);
        assert_eq!(s.string().unwrap(), "hello");
        assert_eq!(s.pos(), buf.len() as u64);
        assert!(matches!(s.uvarint(), Err(Error::Truncated(_))));
    }

    #[test]
    fn gc_signature_pads_gaps() {
        // P@0, P@24 with 8-byte pointers: two scalar words between
        let mut buf = Vec::new();
        for &(kind, off) in &[(1u64, 0u64), (1, 24)] {
            encode_uvarint(kind, &mut buf);
            encode_uvarint(off, &mut buf);
        }
        encode_uvarint(0, &mut buf);
        let mut s = Scan::new(&buf);
        assert_eq!(gc_signature(&mut s, 8).unwrap(), "PSSP");
    }

    #[test]
    fn gc_signature_interfaces_cover_two_words() {
        let mut buf = Vec::new();
        for &(kind, off) in &[(2u64, 0u64), (3, 16)] {
            encode_uvarint(kind, &mut buf);
            encode_uvarint(off, &mut buf);
        }
        encode_uvarint(0, &mut buf);
        let mut s = Scan::new(&buf);
        assert_eq!(gc_signature(&mut s, 8).unwrap(), "IIEE");
    }

    #[test]
    fn gc_signature_rejects_scalar_kinds() {
        let mut buf = Vec::new();
        encode_uvarint(6, &mut buf); // Bool has no business in an object descriptor
        encode_uvarint(0, &mut buf);
        encode_uvarint(0, &mut buf);
        let mut s = Scan::new(&buf);
        assert!(matches!(
            gc_signature(&mut s, 8),
            Err(Error::UnknownTag { tag: 6, .. })
        ));
    }

    #[test]
    fn record_tags_round_trip() {
        for tag in RecordTag::iter() {
            assert_eq!(RecordTag::from_num(tag.num()), Some(tag));
        }
        assert_eq!(RecordTag::from_num(18), None);
    }
}
