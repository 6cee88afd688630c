//! DNS message encoder with name compression.
//!
//! Encoding runs in phases. Every name that will appear in the outgoing
//! message is first interned into a [`NameTable`], which discovers label
//! suffixes shared with earlier names. A sizing pass then computes the
//! exact number of bytes the message requires, and only a buffer that holds
//! at least that much is ever written to.
//!
//! Both [`build_search`] and [`build_answer`] follow the size-probe
//! convention: called with `None` (or an undersized buffer), they leave the
//! buffer untouched, store the required size in `buf_len` and return 0.
//! Called with a sufficient buffer, they write the message, subtract the
//! bytes consumed from `buf_len` and return how many were written, so a
//! probe followed by a write into an exactly-sized buffer ends with
//! `buf_len == 0`.

use std::collections::BTreeMap;
use std::mem::size_of;

use bytemuck::{NoUninit, Zeroable};

use super::{
    name::{DomainName, Label},
    records::RecordData,
    Class, Header, QClass, QType,
};

const HEADER_SIZE: usize = size_of::<Header>();
/// TYPE, CLASS, TTL and RDLENGTH of a resource record.
const RECORD_FIXED_SIZE: usize = 10;
/// QTYPE and QCLASS of a question.
const QUESTION_FIXED_SIZE: usize = 4;

struct Token {
    label: Label,
    /// `(entry, token)` position of an earlier table entry whose tail
    /// equals this token and everything after it.
    suffix: Option<(usize, usize)>,
}

struct TableEntry {
    /// Absolute offset of this name's first octet in the output buffer,
    /// filled in during the write pass.
    offset: usize,
    tokens: Vec<Token>,
}

/// The label-reference table driving name compression.
///
/// Append-only; it lives for the duration of one encode call.
#[derive(Default)]
pub(crate) struct NameTable {
    entries: Vec<TableEntry>,
}

impl NameTable {
    /// Adds `name` to the table and returns its entry index.
    ///
    /// The new name is compared against every entry added before it, and
    /// the longest label suffix it shares with any of them is recorded as a
    /// suffix pointer. The write pass emits a compression pointer in place
    /// of the shared tail. When several earlier entries offer a suffix of
    /// the same length, the first one found is kept.
    pub(crate) fn intern(&mut self, name: &DomainName) -> usize {
        let mut tokens: Vec<Token> = name
            .labels()
            .iter()
            .map(|label| Token {
                label: label.clone(),
                suffix: None,
            })
            .collect();

        let mut found: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        for (n, entry) in self.entries.iter().enumerate() {
            for i in 0..tokens.len() {
                for m in 0..entry.tokens.len() {
                    if suffixes_equal(&entry.tokens[m..], &tokens[i..]) {
                        found.entry(tokens.len() - i).or_insert((n, m));
                    }
                }
            }
        }
        if let Some((&longest, &target)) = found.iter().next_back() {
            let idx = tokens.len() - longest;
            tokens[idx].suffix = Some(target);
        }

        self.entries.push(TableEntry { offset: 0, tokens });
        self.entries.len() - 1
    }

    /// Absolute output offset of token `token` within entry `entry`.
    fn suffix_offset(&self, entry: usize, token: usize) -> usize {
        let target = &self.entries[entry];
        target.offset
            + target.tokens[..token]
                .iter()
                .map(|t| t.label.len() + 1)
                .sum::<usize>()
    }

    /// Encoded size of entry `index`: its labels up to the first suffix
    /// pointer, terminated by either the 2-octet pointer or the root octet.
    pub(crate) fn name_size(&self, index: usize) -> usize {
        let mut size = 0;
        for token in &self.entries[index].tokens {
            if token.suffix.is_some() {
                return size + 2;
            }
            size += token.label.len() + 1;
        }
        size + 1
    }

    /// Writes entry `index` at the writer's current position and records
    /// that position as the entry's offset for later back-references.
    pub(crate) fn write_name(&mut self, index: usize, w: &mut Writer<'_>) {
        self.entries[index].offset = w.pos();
        for t in 0..self.entries[index].tokens.len() {
            if let Some((entry, token)) = self.entries[index].tokens[t].suffix {
                let target = self.suffix_offset(entry, token);
                w.write_u16(0xC000 | target as u16);
                return;
            }
            let label = &self.entries[index].tokens[t].label;
            w.write_u8(label.len() as u8);
            w.write_slice(label.as_bytes());
        }
        w.write_u8(0);
    }
}

/// Suffix pointers may only replace identical tails, so two token runs
/// match when they are the same length and agree label for label.
fn suffixes_equal(a: &[Token], b: &[Token]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.label == b.label)
}

/// Byte sink for the write phase.
///
/// The sizing pass has already established that the buffer is large enough,
/// so writes are unconditional.
pub(crate) struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn write_slice(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    pub(crate) fn write_obj<T: NoUninit>(&mut self, obj: T) {
        self.write_slice(bytemuck::bytes_of(&obj));
    }

    pub(crate) fn write_u8(&mut self, b: u8) {
        self.write_slice(&[b]);
    }

    pub(crate) fn write_u16(&mut self, v: u16) {
        self.write_slice(&v.to_be_bytes());
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.write_slice(&v.to_be_bytes());
    }

    /// Overwrites the two octets at `at` without moving the position. Used
    /// to back-patch RDLENGTH slots.
    fn patch_u16(&mut self, at: usize, v: u16) {
        self.buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
    }
}

/// An outgoing resource record: owner name, class, TTL and typed payload.
pub struct AnswerRecord {
    name: DomainName,
    class: Class,
    ttl: u32,
    data: RecordData,
}

impl AnswerRecord {
    pub fn new(name: DomainName, data: RecordData) -> Self {
        Self {
            name,
            class: Class::IN,
            ttl: 0,
            data,
        }
    }

    #[inline]
    pub fn class(self, class: Class) -> Self {
        Self { class, ..self }
    }

    #[inline]
    pub fn ttl(self, ttl: u32) -> Self {
        Self { ttl, ..self }
    }
}

/// Table indices of the names a record contributes: its owner name, and the
/// name embedded in a PTR or SRV payload.
struct RecordRefs {
    owner: usize,
    target: Option<usize>,
}

fn chained<'a>(
    answers: &'a [AnswerRecord],
    authority: &'a [AnswerRecord],
    additional: &'a [AnswerRecord],
) -> impl Iterator<Item = &'a AnswerRecord> {
    answers.iter().chain(authority).chain(additional)
}

fn rdata_size(table: &NameTable, data: &RecordData, refs: &RecordRefs) -> usize {
    match data {
        RecordData::A(_) => 4,
        RecordData::Aaaa(_) => 16,
        RecordData::Ptr(_) => table.name_size(refs.target.unwrap()),
        RecordData::Txt(txt) => txt.encoded_len(),
        RecordData::Srv { .. } => 6 + table.name_size(refs.target.unwrap()),
    }
}

fn write_record(table: &mut NameTable, rec: &AnswerRecord, refs: &RecordRefs, w: &mut Writer<'_>) {
    table.write_name(refs.owner, w);
    w.write_u16(rec.data.record_type().0);
    w.write_u16(rec.class.0);
    w.write_u32(rec.ttl);
    let lenpos = w.pos();
    w.write_u16(0); // patched below, once the payload length is known
    let rdata_start = w.pos();
    match &rec.data {
        RecordData::A(addr) => w.write_slice(&addr.octets()),
        RecordData::Aaaa(addr) => w.write_slice(&addr.octets()),
        RecordData::Ptr(_) => table.write_name(refs.target.unwrap(), w),
        RecordData::Txt(txt) => {
            for string in txt.strings() {
                w.write_u8(string.len() as u8);
                w.write_slice(string);
            }
        }
        RecordData::Srv {
            priority,
            weight,
            port,
            ..
        } => {
            w.write_u16(*priority);
            w.write_u16(*weight);
            w.write_u16(*port);
            table.write_name(refs.target.unwrap(), w);
        }
    }
    let rdata_len = w.pos() - rdata_start;
    w.patch_u16(lenpos, rdata_len as u16);
}

/// Builds a PTR query (a DNS-SD service search) for `name`.
///
/// The message carries id 0, no flags and a single question with
/// `QTYPE=PTR`, `QCLASS=IN`. See the [module docs](self) for the size-probe
/// convention on `buf` and `buf_len`.
pub fn build_search(name: &DomainName, buf: Option<&mut [u8]>, buf_len: &mut usize) -> usize {
    let mut table = NameTable::default();
    let question = table.intern(name);

    let needed = HEADER_SIZE + table.name_size(question) + QUESTION_FIXED_SIZE;
    let buf = match buf {
        Some(buf) if *buf_len >= needed => buf,
        _ => {
            *buf_len = needed;
            return 0;
        }
    };

    let mut header = Header::zeroed();
    header.set_id(0);
    header.set_qdcount(1);

    let mut w = Writer::new(buf);
    w.write_obj(header);
    table.write_name(question, &mut w);
    w.write_u16(QType::PTR.0);
    w.write_u16(QClass::IN.0);
    debug_assert_eq!(w.pos(), needed);

    *buf_len -= w.pos();
    w.pos()
}

/// Builds a response message from the three record sections.
///
/// All owner names and the names embedded in PTR and SRV payloads share one
/// compression table, so a suffix occurring in several records is emitted
/// once and referenced everywhere else. The header carries `QR=1` and the
/// section counts; everything else is zero. See the [module docs](self) for
/// the size-probe convention on `buf` and `buf_len`.
pub fn build_answer(
    answers: &[AnswerRecord],
    authority: &[AnswerRecord],
    additional: &[AnswerRecord],
    buf: Option<&mut [u8]>,
    buf_len: &mut usize,
) -> usize {
    let mut table = NameTable::default();

    let refs: Vec<RecordRefs> = chained(answers, authority, additional)
        .map(|rec| RecordRefs {
            owner: table.intern(&rec.name),
            target: rec.data.target_name().map(|name| table.intern(name)),
        })
        .collect();

    let needed = HEADER_SIZE
        + chained(answers, authority, additional)
            .zip(&refs)
            .map(|(rec, refs)| {
                table.name_size(refs.owner) + RECORD_FIXED_SIZE + rdata_size(&table, &rec.data, refs)
            })
            .sum::<usize>();

    let buf = match buf {
        Some(buf) if *buf_len >= needed => buf,
        _ => {
            *buf_len = needed;
            return 0;
        }
    };

    let mut header = Header::zeroed();
    header.set_response(true);
    header.set_ancount(answers.len() as u16);
    header.set_nscount(authority.len() as u16);
    header.set_arcount(additional.len() as u16);

    let mut w = Writer::new(buf);
    w.write_obj(header);
    for (rec, refs) in chained(answers, authority, additional).zip(&refs) {
        write_record(&mut table, rec, refs, &mut w);
    }
    debug_assert_eq!(w.pos(), needed);

    *buf_len -= w.pos();
    w.pos()
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::hex;
    use crate::wire::records::TxtStrings;
    use crate::wire::Message;

    use super::*;

    fn domain(s: &str) -> DomainName {
        s.parse().unwrap()
    }

    /// Probes for the required size, then encodes into an exactly-sized
    /// buffer, checking the probe contract along the way.
    fn encode_answer(
        answers: &[AnswerRecord],
        authority: &[AnswerRecord],
        additional: &[AnswerRecord],
    ) -> Vec<u8> {
        let mut needed = 0;
        assert_eq!(
            build_answer(answers, authority, additional, None, &mut needed),
            0
        );
        let mut buf = vec![0; needed];
        let written = build_answer(answers, authority, additional, Some(&mut buf), &mut needed);
        assert_eq!(written, buf.len());
        assert_eq!(needed, 0);
        buf
    }

    #[test]
    fn search_minimal_query() {
        let name = domain("example.com");

        let mut needed = 0;
        assert_eq!(build_search(&name, None, &mut needed), 0);
        assert_eq!(needed, 29);

        let mut buf = vec![0; needed];
        let written = build_search(&name, Some(&mut buf), &mut needed);
        assert_eq!(written, 29);
        assert_eq!(needed, 0);
        assert_eq!(
            buf,
            hex::parse("000000000001000000000000076578616d706c6503636f6d00000c0001"),
        );
    }

    #[test]
    fn search_probe_leaves_short_buffer_untouched() {
        let name = domain("example.com");
        let mut buf = [0; 28];
        let mut buf_len = buf.len();
        assert_eq!(build_search(&name, Some(&mut buf), &mut buf_len), 0);
        assert_eq!(buf_len, 29);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn search_roundtrip() {
        let name = domain("MixedCase._sub.example.com");
        let mut needed = 0;
        build_search(&name, None, &mut needed);
        let mut buf = vec![0; needed];
        let written = build_search(&name, Some(&mut buf), &mut needed);

        let msg = Message::decode(&buf[..written]);
        assert_eq!(msg.last_error(), None);
        assert_eq!(msg.header().question_count(), 1);
        assert_eq!(msg.bytes_decoded(), written);
        let q = &msg.questions()[0];
        assert_eq!(q.name().to_string(), "MixedCase._sub.example.com");
        assert_eq!(q.qtype(), QType::PTR);
        assert_eq!(q.qclass(), QClass::IN);
    }

    #[test]
    fn answer_compression_layout() {
        let owner = domain("_http._tcp.local");
        let answers = [
            AnswerRecord::new(owner.clone(), RecordData::Ptr(domain("A._http._tcp.local")))
                .ttl(120),
            AnswerRecord::new(owner.clone(), RecordData::Ptr(domain("B._http._tcp.local")))
                .ttl(120),
        ];
        let buf = encode_answer(&answers, &[], &[]);

        // The owner name is written once in full at offset 12; both PTR
        // targets and the second owner reference it with 2-octet pointers
        // carrying the same target offset.
        assert_eq!(
            buf,
            hex::parse(concat!(
                "000080000000000200000000",
                "055f68747470045f746370056c6f63616c00",
                "000c00010000007800040141c00c",
                "c00c",
                "000c00010000007800040142c00c",
            )),
        );

        let msg = Message::decode(&buf);
        assert_eq!(msg.last_error(), None);
        assert_eq!(msg.answers().len(), 2);
        assert_eq!(msg.answers()[0].name().to_string(), "_http._tcp.local");
        assert_eq!(msg.answers()[0].rdata(), "A._http._tcp.local");
        assert_eq!(msg.answers()[1].name().to_string(), "_http._tcp.local");
        assert_eq!(msg.answers()[1].rdata(), "B._http._tcp.local");
    }

    #[test]
    fn answer_txt() {
        let answers = [AnswerRecord::new(
            domain("svc.local"),
            RecordData::Txt(TxtStrings::new(["k=1", "v=2"])),
        )
        .ttl(60)];
        let buf = encode_answer(&answers, &[], &[]);

        assert_eq!(buf[buf.len() - 10..buf.len() - 8], hex::parse("0008")[..]);
        assert_eq!(buf[buf.len() - 8..], hex::parse("036b3d3103763d32")[..]);

        let msg = Message::decode(&buf);
        let rr = &msg.answers()[0];
        assert_eq!(rr.rdlength(), 8);
        assert_eq!(rr.rdata(), r#""k=1","v=2""#);
    }

    #[test]
    fn answer_srv() {
        let answers = [AnswerRecord::new(
            domain("s._tcp.local"),
            RecordData::Srv {
                priority: 10,
                weight: 20,
                port: 80,
                target: domain("host.local"),
            },
        )
        .ttl(60)];
        let buf = encode_answer(&answers, &[], &[]);

        let msg = Message::decode(&buf);
        assert_eq!(msg.last_error(), None);
        let rr = &msg.answers()[0];
        assert_eq!(rr.name().to_string(), "s._tcp.local");
        assert_eq!(rr.rdata(), "10 20 80 host.local");
    }

    #[test]
    fn answer_a_aaaa_roundtrip() {
        let host = domain("host.local");
        let answers = [
            AnswerRecord::new(host.clone(), RecordData::A(Ipv4Addr::new(192, 168, 1, 100)))
                .ttl(60),
            AnswerRecord::new(
                host.clone(),
                RecordData::Aaaa("fe80::1".parse().unwrap()),
            )
            .ttl(60),
        ];
        let buf = encode_answer(&answers, &[], &[]);

        let msg = Message::decode(&buf);
        assert_eq!(msg.last_error(), None);
        assert_eq!(msg.answers()[0].rdata(), "192.168.1.100");
        assert_eq!(
            msg.answers()[1].rdata(),
            "fe80:0000:0000:0000:0000:0000:0000:0001",
        );
    }

    #[test]
    fn answer_sections_are_counted_separately() {
        let host = domain("host.local");
        let answers = [AnswerRecord::new(
            domain("_http._tcp.local"),
            RecordData::Ptr(domain("web._http._tcp.local")),
        )
        .ttl(120)];
        let additional = [
            AnswerRecord::new(host.clone(), RecordData::A(Ipv4Addr::new(10, 0, 0, 1))).ttl(120),
        ];
        let buf = encode_answer(&answers, &[], &additional);

        let msg = Message::decode(&buf);
        assert_eq!(msg.last_error(), None);
        assert!(msg.header().is_response());
        assert_eq!(msg.header().question_count(), 0);
        assert_eq!(msg.header().answer_count(), 1);
        assert_eq!(msg.header().authoritative_count(), 0);
        assert_eq!(msg.header().additional_count(), 1);
        assert_eq!(msg.bytes_decoded(), buf.len());
    }

    #[test]
    fn service_enumeration_roundtrip() {
        let query = hex::parse(
            "303900000001000000000000095f7365727669636573075f646e732d7364045f756470056c6f63616c00000c0001",
        );
        let msg = Message::decode(&query);
        assert_eq!(msg.last_error(), None);
        let q = &msg.questions()[0];
        assert!(q.qtype().matches(crate::wire::Type::PTR));

        let targets = [
            "_opcua-tcp._tcp.local",
            "_http._tcp.local",
            "_teamviewer._tcp.local",
        ];
        let answers: Vec<AnswerRecord> = targets
            .iter()
            .map(|target| {
                AnswerRecord::new(q.name().clone(), RecordData::Ptr(domain(target))).ttl(1500)
            })
            .collect();
        let buf = encode_answer(&answers, &[], &[]);

        let reply = Message::decode(&buf);
        assert_eq!(reply.last_error(), None);
        assert_eq!(reply.answers().len(), 3);
        for (rr, target) in reply.answers().iter().zip(&targets) {
            assert_eq!(rr.name().to_string(), "_services._dns-sd._udp.local");
            assert_eq!(rr.rdata(), *target);
        }
    }

    #[test]
    fn interning_assigns_consecutive_indices() {
        let mut table = NameTable::default();
        assert_eq!(table.intern(&domain("a.example.com")), 0);
        assert_eq!(table.intern(&domain("b.example.com")), 1);
        assert_eq!(table.intern(&domain("example.com")), 2);
        assert_eq!(table.name_size(0), 2 + 8 + 4 + 1);
        assert_eq!(table.name_size(1), 2 + 2);
        assert_eq!(table.name_size(2), 2);
    }

    #[test]
    fn shared_suffix_is_written_once() {
        let names = ["alpha.example.com", "beta.example.com", "gamma.example.com"];
        let mut table = NameTable::default();
        let indices: Vec<usize> = names.iter().map(|name| table.intern(&domain(name))).collect();

        let mut buf = [0; 64];
        let mut w = Writer::new(&mut buf);
        for &index in &indices {
            table.write_name(index, &mut w);
        }
        let written = w.pos();

        // "alpha" in full (19 octets), then label + pointer for the others.
        assert_eq!(written, 19 + 7 + 8);
        let needle: &[u8] = b"\x07example";
        let occurrences = buf[..written]
            .windows(needle.len())
            .filter(|window| *window == needle)
            .count();
        assert_eq!(occurrences, 1);
        assert_eq!(&buf[19..21], &[0x04, b'b']);
        assert_eq!(&buf[24..26], &[0xC0, 6], "pointer to `example.com` at 6");
        assert_eq!(&buf[32..34], &[0xC0, 6]);
    }

    #[test]
    fn suffix_ties_keep_the_first_match() {
        // Once a name has been re-interned, later names still point at the
        // first copy, which is the one written in full.
        let mut table = NameTable::default();
        table.intern(&domain("shared.local"));
        table.intern(&domain("shared.local"));
        let third = table.intern(&domain("x.shared.local"));

        let mut buf = [0; 64];
        let mut w = Writer::new(&mut buf);
        table.write_name(0, &mut w);
        table.write_name(1, &mut w);
        table.write_name(third, &mut w);

        // Entry 0 occupies offsets 0..14, entry 1 is a pointer to 0.
        assert_eq!(&buf[14..16], &[0xC0, 0]);
        // `x` label, then a pointer to offset 0 as well.
        assert_eq!(&buf[16..18], &[0x01, b'x']);
        assert_eq!(&buf[18..20], &[0xC0, 0]);
    }
}
