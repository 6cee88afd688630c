//! Typed record payloads.
//!
//! Decoding renders the data of every known record type into a
//! human-readable string ([`render_rdata`]); the forms are meant for
//! logging and matching, not for re-encoding. Encoding starts from
//! [`RecordData`], which ties each supported record type to its payload so
//! that mismatched pairings cannot be constructed.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use super::{decoder::Reader, name::DomainName, Error, Type};

/// Renders the record data `r` points at into its display string.
///
/// `r` is limited to the `rdlength` bytes of the record (compression
/// pointers still reach the message bytes before them). Types not listed in
/// [`Type`] render as the empty string; their bytes are skipped by the
/// caller, which advances past `rdlength` regardless of how much of it was
/// read here.
pub(crate) fn render_rdata(
    r: &mut Reader<'_>,
    rtype: Type,
    rdlength: u16,
) -> Result<String, Error> {
    let mut out = String::new();
    match rtype {
        Type::A => {
            let [a, b, c, d] = *r.read_array::<4>()?;
            out = format!("{a}.{b}.{c}.{d}");
        }
        Type::AAAA => {
            // Eight groups of two zero-padded hex bytes; no `::` shortening.
            let octets = r.read_array::<16>()?;
            for (i, byte) in octets.iter().enumerate() {
                if i > 0 && i % 2 == 0 {
                    out.push(':');
                }
                out.push_str(&format!("{byte:02x}"));
            }
        }
        Type::PTR => {
            out = r.read_name()?.to_string();
        }
        Type::TXT => {
            while !r.is_empty() {
                let string = r.read_character_string()?;
                if string.is_empty() {
                    continue;
                }
                if !out.is_empty() {
                    out.push(',');
                }
                out.push_str(&format!("\"{}\"", String::from_utf8_lossy(string)));
            }
        }
        Type::SRV => {
            let priority = r.read_u16()?;
            let weight = r.read_u16()?;
            let port = r.read_u16()?;
            out = format!("{priority} {weight} {port} ");
            if rdlength > 6 {
                out.push_str(&r.read_name()?.to_string());
            }
        }
        Type::OPT => {
            let code = r.read_u16()?;
            let optlen = r.read_u16()?;
            out = format!("OptCode: {code}, OptLen: {optlen} ->");
            for _ in 0..rdlength.saturating_sub(4) {
                let byte = r.read_u8()?;
                out.push_str(&format!(" 0x{byte:02x}"));
            }
        }
        Type::NSEC => {
            let start = r.pos();
            out = r.read_name()?.to_string();
            let consumed = r.pos() - start;
            if usize::from(rdlength) > consumed {
                out.push_str(", ");
                for i in 0..usize::from(rdlength) - consumed {
                    let byte = r.read_u8()?;
                    if i > 0 {
                        out.push('|');
                    }
                    out.push_str(&format!("{byte:02x}"));
                }
            }
        }
        _ => {}
    }
    Ok(out)
}

/// The character strings carried by an outgoing TXT record.
///
/// Each string is an arbitrary byte sequence of at most 255 octets. An
/// empty list is allowed; DNS-SD advertisers commonly publish a TXT record
/// with no strings at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxtStrings {
    strings: Vec<Vec<u8>>,
}

impl TxtStrings {
    /// Creates the string list.
    ///
    /// # Panics
    ///
    /// Panics if one of the strings exceeds 255 octets.
    pub fn new<I, T>(strings: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        Self::try_new(strings).unwrap_or_else(|e| panic!("`TxtStrings::new`: {e}"))
    }

    /// Creates the string list, returning an error if one of the strings
    /// exceeds 255 octets.
    pub fn try_new<I, T>(strings: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        let strings: Vec<Vec<u8>> = strings.into_iter().map(Into::into).collect();
        if strings.iter().any(|s| s.len() > 255) {
            return Err(Error::StringTooLong);
        }
        Ok(Self { strings })
    }

    /// Returns an iterator over the character strings.
    pub fn strings(&self) -> impl Iterator<Item = &[u8]> {
        self.strings.iter().map(|s| &**s)
    }

    /// Length of the encoded form: every string plus its length octet.
    pub(crate) fn encoded_len(&self) -> usize {
        self.strings.iter().map(|s| s.len() + 1).sum()
    }
}

impl fmt::Display for TxtStrings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, string) in self.strings.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            string.escape_ascii().fmt(f)?;
        }
        Ok(())
    }
}

/// The payload of an outgoing resource record, tagged by record type.
///
/// Only the record types an mDNS responder emits are representable. The
/// names embedded in [`RecordData::Ptr`] and [`RecordData::Srv`] payloads
/// take part in name compression like record owner names do.
#[derive(Clone, Debug)]
pub enum RecordData {
    /// IPv4 host address.
    A(Ipv4Addr),
    /// IPv6 host address.
    Aaaa(Ipv6Addr),
    /// Domain name pointer, e.g. from a service type to an instance.
    Ptr(DomainName),
    /// Service metadata strings.
    Txt(TxtStrings),
    /// Service location.
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
}

impl RecordData {
    /// Returns the wire type tag matching this payload.
    pub fn record_type(&self) -> Type {
        match self {
            RecordData::A(_) => Type::A,
            RecordData::Aaaa(_) => Type::AAAA,
            RecordData::Ptr(_) => Type::PTR,
            RecordData::Txt(_) => Type::TXT,
            RecordData::Srv { .. } => Type::SRV,
        }
    }

    /// Returns the domain name embedded in the payload, if there is one.
    pub(crate) fn target_name(&self) -> Option<&DomainName> {
        match self {
            RecordData::Ptr(name) => Some(name),
            RecordData::Srv { target, .. } => Some(target),
            _ => None,
        }
    }
}
