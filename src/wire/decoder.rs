//! DNS message decoder.
//!
//! Decoding is tolerant by design: [`Message::decode`] always returns a
//! [`Message`], and a malformed datagram is reported through
//! [`Message::last_error`] while everything parsed up to the failure stays
//! accessible. No read ever leaves the supplied buffer.

use core::fmt;
use std::mem::size_of;

use bytemuck::{AnyBitPattern, Zeroable};

use crate::num::{U16, U32};

use super::{
    name::{DomainName, Label},
    records, Class, Error, Header, QClass, QType, Type, MAX_RECORDS_PER_MESSAGE,
};

/// Maximum encoded length of a domain name, including the root octet.
const MAX_NAME_WIRE_LEN: usize = 255;

pub(crate) struct Reader<'a> {
    /// The buffer holding the entire DNS message. Name pointers may refer
    /// back to any part of it below the current position.
    full: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { full: buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.full.len()
    }

    fn byte_at(&self, at: usize) -> Result<u8, Error> {
        self.full.get(at).copied().ok_or(Error::Eof)
    }

    pub(crate) fn read_obj<T: AnyBitPattern>(&mut self) -> Result<T, Error> {
        let bytes = self
            .full
            .get(self.pos..self.pos + size_of::<T>())
            .ok_or(Error::Eof)?;
        self.pos += size_of::<T>();
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let slice = self.full.get(self.pos..self.pos + len).ok_or(Error::Eof)?;
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn read_array<const LEN: usize>(&mut self) -> Result<&'a [u8; LEN], Error> {
        let slice = self.read_slice(LEN)?;
        Ok(slice.try_into().unwrap())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Error> {
        self.read_obj::<u8>()
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(self.read_obj::<U16>()?.get())
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(self.read_obj::<U32>()?.get())
    }

    /// Reads a `<character-string>` value.
    pub(crate) fn read_character_string(&mut self) -> Result<&'a [u8], Error> {
        let length = self.read_u8()?;
        self.read_slice(length.into())
    }

    /// Splits off a reader covering the next `len` bytes and advances `self`
    /// past them.
    ///
    /// The sub-reader keeps access to the earlier part of the message, so
    /// name pointers inside it still resolve.
    pub(crate) fn split_off(&mut self, len: usize) -> Result<Reader<'a>, Error> {
        if self.full.len() - self.pos < len {
            return Err(Error::Eof);
        }
        let sub = Reader {
            full: &self.full[..self.pos + len],
            pos: self.pos,
        };
        self.pos += len;
        Ok(sub)
    }

    /// Reads a `<domain-name>` value, following compression pointers.
    ///
    /// A pointer must target an offset strictly below the lowest position
    /// visited so far; the walk can therefore only move backwards and
    /// terminates after at most one pass over the message. The reader
    /// position advances by the bytes consumed at the call site: everything
    /// up to and including the first pointer, or up to and including the
    /// root octet when no pointer occurs.
    pub(crate) fn read_name(&mut self) -> Result<DomainName, Error> {
        let mut name = DomainName::ROOT;
        let mut cursor = self.pos;
        let mut limit = self.pos;
        let mut site_end = None;
        let mut wire_len = 1; // terminating root octet

        loop {
            let length = self.byte_at(cursor)?;
            match length & 0b1100_0000 {
                0b1100_0000 => {
                    let low = self.byte_at(cursor + 1)?;
                    let target = usize::from(u16::from_be_bytes([length & 0b0011_1111, low]));
                    if target >= limit {
                        return Err(Error::PointerLoop);
                    }
                    if site_end.is_none() {
                        site_end = Some(cursor + 2);
                    }
                    limit = target;
                    cursor = target;
                }
                0b0000_0000 => {
                    let length = usize::from(length);
                    if length == 0 {
                        self.pos = site_end.unwrap_or(cursor + 1);
                        return Ok(name);
                    }
                    let label = self
                        .full
                        .get(cursor + 1..cursor + 1 + length)
                        .ok_or(Error::Eof)?;
                    wire_len += length + 1;
                    if wire_len > MAX_NAME_WIRE_LEN {
                        return Err(Error::NameTooLong);
                    }
                    name.push_label(Label::try_new(label)?);
                    cursor += length + 1;
                }
                _ => return Err(Error::InvalidLabelType),
            }
        }
    }
}

fn read_question(r: &mut Reader<'_>) -> Result<Question, Error> {
    let name = r.read_name()?;
    let qtype = QType(r.read_u16()?);
    let qclass = QClass(r.read_u16()?);
    Ok(Question {
        name,
        qtype,
        qclass,
    })
}

fn read_record(r: &mut Reader<'_>) -> Result<DecodedRecord, Error> {
    let name = r.read_name()?;
    let rtype = Type(r.read_u16()?);
    let class = Class(r.read_u16()?);
    let ttl = r.read_u32()?;
    let rdlength = r.read_u16()?;
    let mut rdata = r.split_off(usize::from(rdlength))?;
    let rdata = records::render_rdata(&mut rdata, rtype, rdlength)?;
    Ok(DecodedRecord {
        name,
        rtype,
        class,
        ttl,
        rdlength,
        rdata,
    })
}

/// A decoded DNS message: header plus the four record sections.
#[derive(Debug)]
pub struct Message {
    header: Header,
    questions: Vec<Question>,
    answers: Vec<DecodedRecord>,
    authority: Vec<DecodedRecord>,
    additional: Vec<DecodedRecord>,
    last_error: Option<String>,
    bytes_decoded: usize,
}

impl Message {
    /// Decodes `datagram`.
    ///
    /// Decoding never fails outright. When the input is malformed, the
    /// returned message carries a description of the failure in
    /// [`Message::last_error`] and keeps every record parsed before it.
    /// Callers must not act on a message whose `last_error` is set.
    pub fn decode(datagram: &[u8]) -> Message {
        let mut r = Reader::new(datagram);
        let mut msg = Message {
            header: Header::zeroed(),
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
            last_error: None,
            bytes_decoded: 0,
        };
        if let Err(e) = msg.decode_sections(&mut r) {
            msg.last_error = Some(e.to_string());
        }
        msg.bytes_decoded = r.pos();
        msg
    }

    fn decode_sections(&mut self, r: &mut Reader<'_>) -> Result<(), Error> {
        self.header = r.read_obj::<Header>()?;

        let qd = self.header.question_count();
        let an = self.header.answer_count();
        let ns = self.header.authoritative_count();
        let ar = self.header.additional_count();
        let total =
            usize::from(qd) + usize::from(an) + usize::from(ns) + usize::from(ar);
        if total > MAX_RECORDS_PER_MESSAGE {
            return Err(Error::TooManyRecords);
        }

        for _ in 0..qd {
            let q = read_question(r)?;
            self.questions.push(q);
        }
        for _ in 0..an {
            let rr = read_record(r)?;
            self.answers.push(rr);
        }
        for _ in 0..ns {
            let rr = read_record(r)?;
            self.authority.push(rr);
        }
        for _ in 0..ar {
            let rr = read_record(r)?;
            self.additional.push(rr);
        }
        Ok(())
    }

    /// Returns the message header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the questions of the *Question* section parsed so far.
    #[inline]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Returns the records of the *Answer* section parsed so far.
    #[inline]
    pub fn answers(&self) -> &[DecodedRecord] {
        &self.answers
    }

    /// Returns the records of the *Authority* section parsed so far.
    #[inline]
    pub fn authority(&self) -> &[DecodedRecord] {
        &self.authority
    }

    /// Returns the records of the *Additional* section parsed so far.
    #[inline]
    pub fn additional(&self) -> &[DecodedRecord] {
        &self.additional
    }

    /// Returns the decoding failure, if any.
    ///
    /// A message with a non-empty error must not be answered; its decoded
    /// records are only good for diagnostics.
    #[inline]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the number of bytes consumed from the input.
    ///
    /// For a cleanly decoded message this covers the header and all four
    /// sections; trailing bytes beyond the last record are not consumed.
    #[inline]
    pub fn bytes_decoded(&self) -> usize {
        self.bytes_decoded
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        let dir = if h.is_query() { "query" } else { "response" };
        let trunc = if h.is_truncated() { ", trunc" } else { "" };
        let ra = if h.is_recursion_available() {
            ", RA"
        } else {
            ""
        };
        let rd = if h.is_recursion_desired() { ", RD" } else { "" };
        let aa = if h.is_authority() { ", AA" } else { "" };
        writeln!(
            f,
            "{} (id={}, op={}, rcode={}{trunc}{ra}{rd}{aa})",
            dir,
            h.id(),
            h.opcode(),
            h.rcode(),
        )?;

        for q in &self.questions {
            writeln!(f, "Q: {}", q)?;
        }
        for rr in &self.answers {
            writeln!(f, "ANS: {}", rr)?;
        }
        for rr in &self.authority {
            writeln!(f, "AUTH: {}", rr)?;
        }
        for rr in &self.additional {
            writeln!(f, "ADDL: {}", rr)?;
        }
        if let Some(err) = &self.last_error {
            writeln!(f, "error: {}", err)?;
        }
        Ok(())
    }
}

/// A question from the *Question* section.
#[derive(Debug)]
pub struct Question {
    name: DomainName,
    qtype: QType,
    qclass: QClass,
}

impl Question {
    /// Returns the domain name that is being queried.
    #[inline]
    pub fn name(&self) -> &DomainName {
        &self.name
    }

    /// Returns the record type the client is interested in.
    #[inline]
    pub fn qtype(&self) -> QType {
        self.qtype
    }

    /// Returns the record class the client is interested in.
    #[inline]
    pub fn qclass(&self) -> QClass {
        self.qclass
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.name, self.qclass, self.qtype)
    }
}

/// A resource record from the *Answer*, *Authority*, or *Additional*
/// section.
///
/// The record data is rendered into a human-readable string during
/// decoding; the per-type forms are described in the [`records`] module.
#[derive(Debug)]
pub struct DecodedRecord {
    name: DomainName,
    rtype: Type,
    class: Class,
    ttl: u32,
    rdlength: u16,
    rdata: String,
}

impl DecodedRecord {
    /// Returns the owner name of the record.
    #[inline]
    pub fn name(&self) -> &DomainName {
        &self.name
    }

    #[inline]
    pub fn rtype(&self) -> Type {
        self.rtype
    }

    #[inline]
    pub fn class(&self) -> Class {
        self.class
    }

    /// Returns the record's Time To Live, in seconds.
    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the length of the record data on the wire.
    #[inline]
    pub fn rdlength(&self) -> u16 {
        self.rdlength
    }

    /// Returns the rendered record data. Empty for unsupported types.
    #[inline]
    pub fn rdata(&self) -> &str {
        &self.rdata
    }
}

impl fmt::Display for DecodedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name, self.ttl, self.class, self.rtype, self.rdata,
        )
    }
}
