//! Multicast DNS wire-format codec and a small responder built on top of it.
//!
//! The heart of the crate is the [`wire`] module: [`wire::Message::decode`]
//! parses an untrusted datagram into structured records, and
//! [`wire::encoder::build_search`] / [`wire::encoder::build_answer`] produce
//! query and response datagrams with RFC 1035 §4.1.4 name compression,
//! sized exactly by a probing pass before anything is written.
//!
//! [`responder`] and [`prober`] are thin collaborators that move datagrams
//! between the codec and a multicast UDP socket.

pub mod prober;
pub mod responder;
pub mod wire;

mod hex;
mod num;

/// Size of unicast DNS message buffers.
///
/// Unicast DNS messages are limited to 512 bytes.
pub const DNS_BUFFER_SIZE: usize = 512;

/// Size of multicast DNS message buffers.
///
/// mDNS stays within the local link, so it is allowed to use messages up to
/// the interface MTU.
pub const MDNS_BUFFER_SIZE: usize = 1500;
