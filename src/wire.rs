//! (m)DNS message decoder and encoder.
//!
//! [`Message::decode`] turns an untrusted datagram into a header plus four
//! record sections. [`encoder::build_search`] and [`encoder::build_answer`]
//! produce wire-format datagrams with name compression; both follow the
//! size-probe convention described in [`encoder`].

#[macro_use]
mod macros;
pub mod decoder;
pub mod encoder;
mod error;
pub mod name;
pub mod records;

pub use decoder::{DecodedRecord, Message, Question};
pub use error::Error;

use core::fmt;

use bitflags::bitflags;

use crate::num::U16;

/// Decoding refuses messages whose four section counts add up to more than
/// this. Nothing legitimate on a local link comes close.
pub const MAX_RECORDS_PER_MESSAGE: usize = 150;

wire_enum! {
    /// DNS message operation codes.
    pub enum Opcode: u8 {
        /// Standard query (or the response to one).
        QUERY = 0,
        /// Inverse query. Optional and rarely supported.
        IQUERY = 1,
        /// Server status request.
        STATUS = 2,
        NOTIFY = 4,
        UPDATE = 5,
    }
}

wire_enum! {
    /// Server response codes representable in the 4-bit header field.
    pub enum RCode: u8 {
        /// No error.
        NO_ERROR = 0,
        /// The query sent by the client was erroneous.
        FORM_ERR = 1,
        /// A server-side error prevented processing of the query.
        SERV_FAIL = 2,
        /// The queried domain name does not exist.
        NX_DOMAIN = 3,
        /// The requested query type is not supported by the server.
        NOT_IMP = 4,
        /// The server refused to answer the query for policy reasons.
        REFUSED = 5,
    }
}

wire_enum! {
    /// Resource record types handled by this codec.
    ///
    /// Records of any other type still decode; their data is skipped.
    pub enum Type: u16 {
        /// IPv4 host address.
        A = 1,
        NS = 2,
        CNAME = 5,
        /// Domain name pointer; carries service instances in DNS-SD.
        PTR = 12,
        /// Free-form strings, `key=value` metadata in DNS-SD.
        TXT = 16,
        /// IPv6 host address.
        AAAA = 28,
        /// Service location (port and host).
        SRV = 33,
        /// EDNS(0) pseudo-record.
        OPT = 41,
        NSEC = 47,
    }
}

wire_enum! {
    /// The record type a question asks for.
    pub enum QType: u16 {
        A = 1,
        NS = 2,
        CNAME = 5,
        PTR = 12,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
        /// Query is for all record types.
        ALL = 255,
    }
}

impl QType {
    pub fn matches(&self, ty: Type) -> bool {
        *self == Self::ALL || self.0 == ty.0
    }
}

wire_enum! {
    /// Resource record classes.
    pub enum Class: u16 {
        /// The Internet.
        IN = 1,
    }
}

wire_enum! {
    /// The queried resource class.
    pub enum QClass: u16 {
        /// The Internet.
        IN = 1,
        /// Query is for all classes of resource.
        ANY = 255,
    }
}

impl QClass {
    pub fn matches(&self, class: Class) -> bool {
        *self == Self::ANY || self.0 == class.0
    }
}

// Bit positions in the header flags are inverted, because RFC 1035 starts
// counting at the MSb.
const fn be_pos(pos: u16) -> u16 {
    15 - pos
}

bitflags! {
    #[derive(Debug)]
    #[repr(transparent)]
    struct HeaderFlags: u16 {
        /// Set on responses, clear on queries.
        const QR = 1 << be_pos(0);
        const OPCODE = Self::OPCODE_MASK;
        /// Set if the response comes from a server that is the authority
        /// for the queried name.
        const AA = 1 << be_pos(5);
        /// Set if the message was truncated to fit the transport channel.
        const TC = 1 << be_pos(6);
        /// Recursion Desired. Copied from queries to responses.
        const RD = 1 << be_pos(7);
        /// Recursion Available.
        const RA = 1 << be_pos(8);
        /// Reserved bits.
        const Z = Self::Z_MASK;
        const RCODE = Self::RCODE_MASK;
    }
}

impl HeaderFlags {
    const OPCODE_POS: u16 = 11;
    const OPCODE_MASK: u16 = 0b1111 << Self::OPCODE_POS;

    const Z_POS: u16 = 4;
    const Z_MASK: u16 = 0b111 << Self::Z_POS;

    const RCODE_POS: u16 = 0;
    const RCODE_MASK: u16 = 0b1111 << Self::RCODE_POS;

    fn opcode(&self) -> Opcode {
        Opcode(((self.bits() & Self::OPCODE_MASK) >> Self::OPCODE_POS) as u8)
    }

    fn rcode(&self) -> RCode {
        RCode(((self.bits() & Self::RCODE_MASK) >> Self::RCODE_POS) as u8)
    }

    fn z(&self) -> u8 {
        ((self.bits() & Self::Z_MASK) >> Self::Z_POS) as u8
    }
}

/// Message header.
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct Header {
    id: U16,
    flags: U16,
    qdcount: U16,
    ancount: U16,
    nscount: U16,
    arcount: U16,
}

impl Header {
    fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags.get())
    }

    fn set_flag(&mut self, flag: HeaderFlags, value: bool) {
        let mut flags = self.flags();
        flags.set(flag, value);
        self.flags = flags.bits().into();
    }

    /// Returns the 16-bit message ID.
    ///
    /// Servers copy this ID into the corresponding response so that the
    /// client can match responses to its queries. mDNS uses 0.
    #[inline]
    pub fn id(&self) -> u16 {
        self.id.get()
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.id = id.into();
    }

    #[inline]
    pub fn is_query(&self) -> bool {
        !self.is_response()
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags().contains(HeaderFlags::QR)
    }

    pub fn set_response(&mut self, is_response: bool) {
        self.set_flag(HeaderFlags::QR, is_response);
    }

    /// Returns whether the truncation flag is set.
    pub fn is_truncated(&self) -> bool {
        self.flags().contains(HeaderFlags::TC)
    }

    pub fn is_recursion_desired(&self) -> bool {
        self.flags().contains(HeaderFlags::RD)
    }

    pub fn is_recursion_available(&self) -> bool {
        self.flags().contains(HeaderFlags::RA)
    }

    pub fn is_authority(&self) -> bool {
        self.flags().contains(HeaderFlags::AA)
    }

    pub fn opcode(&self) -> Opcode {
        self.flags().opcode()
    }

    pub fn rcode(&self) -> RCode {
        self.flags().rcode()
    }

    /// Returns the three reserved bits between RA and RCODE.
    pub fn z(&self) -> u8 {
        self.flags().z()
    }

    pub fn question_count(&self) -> u16 {
        self.qdcount.get()
    }

    pub fn answer_count(&self) -> u16 {
        self.ancount.get()
    }

    pub fn authoritative_count(&self) -> u16 {
        self.nscount.get()
    }

    pub fn additional_count(&self) -> u16 {
        self.arcount.get()
    }

    pub(crate) fn set_qdcount(&mut self, qdcount: u16) {
        self.qdcount = qdcount.into();
    }

    pub(crate) fn set_ancount(&mut self, ancount: u16) {
        self.ancount = ancount.into();
    }

    pub(crate) fn set_nscount(&mut self, nscount: u16) {
        self.nscount = nscount.into();
    }

    pub(crate) fn set_arcount(&mut self, arcount: u16) {
        self.arcount = arcount.into();
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("id", &self.id())
            .field("flags", &self.flags())
            .field("qdcount", &self.qdcount.get())
            .field("ancount", &self.ancount.get())
            .field("nscount", &self.nscount.get())
            .field("arcount", &self.arcount.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header() {
        let mut h = Header::default();
        assert!(h.is_query());
        assert!(!h.is_response());
        assert!(!h.is_authority());
        assert!(!h.is_truncated());
        assert_eq!(h.opcode(), Opcode::QUERY);
        assert_eq!(h.rcode(), RCode::NO_ERROR);
        assert_eq!(h.z(), 0);

        h.set_response(true);
        assert!(h.is_response());
        h.set_id(0x1234);
        assert_eq!(h.id(), 0x1234);
        h.set_qdcount(1);
        assert_eq!(h.question_count(), 1);

        assert_eq!(bytemuck::bytes_of(&h).len(), 12);
        assert_eq!(
            bytemuck::bytes_of(&h),
            &[0x12, 0x34, 0x80, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0],
        );
    }

    #[test]
    fn flag_word_layout() {
        // RFC 1035 §4.1.1, MSb first: QR, Opcode(4), AA, TC, RD, RA, Z(3),
        // RCODE(4).
        assert_eq!(HeaderFlags::QR.bits(), 0x8000);
        assert_eq!(HeaderFlags::OPCODE.bits(), 0x7800);
        assert_eq!(HeaderFlags::AA.bits(), 0x0400);
        assert_eq!(HeaderFlags::TC.bits(), 0x0200);
        assert_eq!(HeaderFlags::RD.bits(), 0x0100);
        assert_eq!(HeaderFlags::RA.bits(), 0x0080);
        assert_eq!(HeaderFlags::Z.bits(), 0x0070);
        assert_eq!(HeaderFlags::RCODE.bits(), 0x000f);
    }

    #[test]
    fn qtype_matching() {
        assert!(QType::PTR.matches(Type::PTR));
        assert!(!QType::PTR.matches(Type::SRV));
        assert!(QType::ALL.matches(Type::TXT));
        assert!(QClass::ANY.matches(Class::IN));
        assert!(QClass::IN.matches(Class::IN));
    }
}
