//! mDNS responder: answers service queries with datagrams produced by the
//! wire codec.
//!
//! The responder owns one multicast UDP socket and a small catalog of
//! advertised service instances. Every received datagram is decoded fresh;
//! every reply is built fresh by [`build_answer`] (probe, allocate exactly,
//! write) and multicast back to the group.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type as SocketType};

use crate::hex::Hex;
use crate::wire::{
    encoder::{build_answer, AnswerRecord},
    name::{DomainName, Label},
    records::{RecordData, TxtStrings},
    Class, Message, Opcode, Question, RCode, Type,
};
use crate::MDNS_BUFFER_SIZE;

/// The well-known mDNS IPv4 multicast group.
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// The well-known mDNS port.
pub const MDNS_PORT: u16 = 5353;

/// The meta-service name under which all advertised service types are
/// enumerated (RFC 6763 §9).
pub const SERVICE_ENUMERATION: &str = "_services._dns-sd._udp.local";

/// Records are advertised with this Time To Live, in seconds.
const TTL: u32 = 120;

/// A service instance advertised by the [`Responder`].
pub struct Advertisement {
    /// The service type, e.g. `_http._tcp.local`.
    service: DomainName,
    /// The full instance name, e.g. `web._http._tcp.local`.
    instance: DomainName,
    /// The host the instance runs on, e.g. `myhost.local`.
    host: DomainName,
    port: u16,
    txt: TxtStrings,
    addr_v4: Option<Ipv4Addr>,
    addr_v6: Option<Ipv6Addr>,
}

impl Advertisement {
    /// Advertises `instance` under the service type `service`, reachable on
    /// `host` at `port`.
    pub fn new(service: DomainName, instance: Label, host: DomainName, port: u16) -> Self {
        let mut instance_domain = DomainName::ROOT;
        instance_domain.push_label(instance);
        instance_domain.extend(service.labels().iter().cloned());
        Self {
            service,
            instance: instance_domain,
            host,
            port,
            txt: TxtStrings::default(),
            addr_v4: None,
            addr_v6: None,
        }
    }

    /// Attaches `key=value` metadata published in the instance's TXT
    /// record.
    #[inline]
    pub fn txt(self, txt: TxtStrings) -> Self {
        Self { txt, ..self }
    }

    /// Adds an IPv4 address record for the instance's host.
    #[inline]
    pub fn ipv4(self, addr: Ipv4Addr) -> Self {
        Self {
            addr_v4: Some(addr),
            ..self
        }
    }

    /// Adds an IPv6 address record for the instance's host.
    #[inline]
    pub fn ipv6(self, addr: Ipv6Addr) -> Self {
        Self {
            addr_v6: Some(addr),
            ..self
        }
    }
}

/// mDNS service responder.
pub struct Responder {
    sock: UdpSocket,
    enumeration_name: DomainName,
    services: Vec<Advertisement>,
}

impl Responder {
    /// Creates a responder bound to the mDNS port, joined to the IPv4
    /// multicast group on all interfaces.
    pub fn new() -> io::Result<Self> {
        let sock = Socket::new(Domain::IPV4, SocketType::DGRAM, Some(Protocol::UDP))?;
        sock.set_reuse_address(true)?;
        sock.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT).into())?;

        let sock = UdpSocket::from(sock);
        sock.join_multicast_v4(&MDNS_GROUP_V4, &Ipv4Addr::UNSPECIFIED)?;

        Ok(Self {
            sock,
            enumeration_name: SERVICE_ENUMERATION.parse().map_err(io::Error::from)?,
            services: Vec::new(),
        })
    }

    /// Adds a service instance to the catalog.
    pub fn advertise(&mut self, advertisement: Advertisement) {
        log::info!(
            "advertising {} on {}:{}",
            advertisement.instance,
            advertisement.host,
            advertisement.port,
        );
        self.services.push(advertisement);
    }

    /// Returns the underlying socket, e.g. to clone it for a
    /// [`Prober`](crate::prober::Prober).
    pub fn socket(&self) -> &UdpSocket {
        &self.sock
    }

    /// Receives and answers queries until a socket error occurs.
    pub fn listen(&self) -> io::Result<()> {
        let mut recv_buf = [0; MDNS_BUFFER_SIZE];
        loop {
            let (len, addr) = self.sock.recv_from(&mut recv_buf)?;
            let datagram = &recv_buf[..len];

            log::trace!("raw recv from {}: {}", addr, Hex(datagram));

            match self.handle_datagram(datagram) {
                Ok(()) => {}
                Err(e) => {
                    log::debug!("failed to handle datagram from {}: {}", addr, e);
                }
            }
        }
    }

    fn handle_datagram(&self, datagram: &[u8]) -> io::Result<()> {
        let msg = Message::decode(datagram);
        if let Some(err) = msg.last_error() {
            // Never respond to anything that did not decode cleanly.
            log::warn!("dropping malformed message: {}", err);
            return Ok(());
        }
        if msg.header().is_response() {
            return Ok(());
        }
        if msg.header().opcode() != Opcode::QUERY {
            return Ok(());
        }
        if msg.header().rcode() != RCode::NO_ERROR {
            return Ok(());
        }

        for q in msg.questions() {
            log::debug!("Q: {}", q);
            if let Some((answers, authority, additional)) = self.answers_for(q) {
                self.send_answer(&answers, &authority, &additional)?;
            }
        }
        Ok(())
    }

    /// Assembles the answer sections for `q`, or `None` when the catalog
    /// has nothing to say about it.
    fn answers_for(
        &self,
        q: &Question,
    ) -> Option<(Vec<AnswerRecord>, Vec<AnswerRecord>, Vec<AnswerRecord>)> {
        if !q.qtype().matches(Type::PTR) {
            return None;
        }
        if !q.qclass().matches(Class::IN) {
            return None;
        }

        if *q.name() == self.enumeration_name {
            // One PTR per distinct service type, however many instances
            // are cataloged under it.
            let mut seen: Vec<&DomainName> = Vec::new();
            let mut answers = Vec::new();
            for adv in &self.services {
                if seen.contains(&&adv.service) {
                    continue;
                }
                seen.push(&adv.service);
                answers.push(
                    AnswerRecord::new(
                        self.enumeration_name.clone(),
                        RecordData::Ptr(adv.service.clone()),
                    )
                    .ttl(TTL),
                );
            }
            if answers.is_empty() {
                return None;
            }
            return Some((answers, Vec::new(), Vec::new()));
        }

        let mut answers = Vec::new();
        let mut additional = Vec::new();
        for adv in self.services.iter().filter(|adv| adv.service == *q.name()) {
            answers.push(
                AnswerRecord::new(adv.service.clone(), RecordData::Ptr(adv.instance.clone()))
                    .ttl(TTL),
            );
            answers.push(
                AnswerRecord::new(adv.instance.clone(), RecordData::Txt(adv.txt.clone())).ttl(TTL),
            );
            answers.push(
                AnswerRecord::new(
                    adv.instance.clone(),
                    RecordData::Srv {
                        priority: 0,
                        weight: 0,
                        port: adv.port,
                        target: adv.host.clone(),
                    },
                )
                .ttl(TTL),
            );
            if let Some(addr) = adv.addr_v4 {
                additional.push(AnswerRecord::new(adv.host.clone(), RecordData::A(addr)).ttl(TTL));
            }
            if let Some(addr) = adv.addr_v6 {
                additional
                    .push(AnswerRecord::new(adv.host.clone(), RecordData::Aaaa(addr)).ttl(TTL));
            }
        }
        if answers.is_empty() {
            return None;
        }

        Some((answers, Vec::new(), additional))
    }

    fn send_answer(
        &self,
        answers: &[AnswerRecord],
        authority: &[AnswerRecord],
        additional: &[AnswerRecord],
    ) -> io::Result<()> {
        let mut needed = 0;
        build_answer(answers, authority, additional, None, &mut needed);
        let mut buf = vec![0; needed];
        let written = build_answer(answers, authority, additional, Some(&mut buf), &mut needed);
        debug_assert_eq!(needed, 0);

        log::trace!("raw send: {}", Hex(&buf[..written]));
        self.sock
            .send_to(&buf[..written], SocketAddrV4::new(MDNS_GROUP_V4, MDNS_PORT))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::wire::encoder::build_search;

    use super::*;

    /// Builds a responder whose socket is bound to an ephemeral unicast
    /// port, so tests do not require the mDNS port to be free.
    fn test_responder() -> Responder {
        Responder {
            sock: UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap(),
            enumeration_name: SERVICE_ENUMERATION.parse().unwrap(),
            services: Vec::new(),
        }
    }

    fn ptr_question(name: &str) -> Message {
        let name: DomainName = name.parse().unwrap();
        let mut needed = 0;
        build_search(&name, None, &mut needed);
        let mut buf = vec![0; needed];
        let written = build_search(&name, Some(&mut buf), &mut needed);
        Message::decode(&buf[..written])
    }

    #[test]
    fn answers_service_enumeration() {
        let mut responder = test_responder();
        responder.advertise(Advertisement::new(
            "_http._tcp.local".parse().unwrap(),
            Label::new("web"),
            "demo-host.local".parse().unwrap(),
            80,
        ));

        let msg = ptr_question(SERVICE_ENUMERATION);
        let (answers, authority, additional) =
            responder.answers_for(&msg.questions()[0]).unwrap();
        assert_eq!(answers.len(), 1);
        assert!(authority.is_empty());
        assert!(additional.is_empty());

        let mut needed = 0;
        build_answer(&answers, &authority, &additional, None, &mut needed);
        let mut buf = vec![0; needed];
        let written = build_answer(&answers, &authority, &additional, Some(&mut buf), &mut needed);
        let reply = Message::decode(&buf[..written]);
        assert_eq!(reply.last_error(), None);
        assert_eq!(reply.answers()[0].name().to_string(), SERVICE_ENUMERATION);
        assert_eq!(reply.answers()[0].rdata(), "_http._tcp.local");
    }

    #[test]
    fn answers_service_query_with_full_record_set() {
        let mut responder = test_responder();
        responder.advertise(
            Advertisement::new(
                "_http._tcp.local".parse().unwrap(),
                Label::new("web"),
                "demo-host.local".parse().unwrap(),
                8080,
            )
            .txt(TxtStrings::new(["path=/"]))
            .ipv4(Ipv4Addr::new(192, 168, 1, 2)),
        );

        let msg = ptr_question("_http._tcp.local");
        let (answers, authority, additional) =
            responder.answers_for(&msg.questions()[0]).unwrap();
        assert_eq!(answers.len(), 3);
        assert!(authority.is_empty());
        assert_eq!(additional.len(), 1);

        let mut needed = 0;
        build_answer(&answers, &authority, &additional, None, &mut needed);
        let mut buf = vec![0; needed];
        let written = build_answer(&answers, &authority, &additional, Some(&mut buf), &mut needed);
        let reply = Message::decode(&buf[..written]);
        assert_eq!(reply.last_error(), None);
        assert_eq!(reply.answers()[0].rdata(), "web._http._tcp.local");
        assert_eq!(reply.answers()[1].rdata(), r#""path=/""#);
        assert_eq!(reply.answers()[2].rdata(), "0 0 8080 demo-host.local");
        assert_eq!(reply.additional()[0].name().to_string(), "demo-host.local");
        assert_eq!(reply.additional()[0].rdata(), "192.168.1.2");
    }

    #[test]
    fn two_instances_share_one_enumeration_ptr() {
        let mut responder = test_responder();
        for (instance, port) in [("web", 80), ("admin", 8080)] {
            responder.advertise(Advertisement::new(
                "_http._tcp.local".parse().unwrap(),
                Label::new(instance),
                "demo-host.local".parse().unwrap(),
                port,
            ));
        }

        // The enumeration query names the service type once, not per
        // instance.
        let msg = ptr_question(SERVICE_ENUMERATION);
        let (answers, _, _) = responder.answers_for(&msg.questions()[0]).unwrap();
        assert_eq!(answers.len(), 1);

        // A direct query gets every instance's record set.
        let msg = ptr_question("_http._tcp.local");
        let (answers, authority, additional) =
            responder.answers_for(&msg.questions()[0]).unwrap();
        assert_eq!(answers.len(), 6);
        assert!(authority.is_empty());
        assert!(additional.is_empty());

        let mut needed = 0;
        build_answer(&answers, &authority, &additional, None, &mut needed);
        let mut buf = vec![0; needed];
        let written = build_answer(&answers, &authority, &additional, Some(&mut buf), &mut needed);
        let reply = Message::decode(&buf[..written]);
        assert_eq!(reply.last_error(), None);
        assert_eq!(reply.answers()[0].rdata(), "web._http._tcp.local");
        assert_eq!(reply.answers()[2].rdata(), "0 0 80 demo-host.local");
        assert_eq!(reply.answers()[3].rdata(), "admin._http._tcp.local");
        assert_eq!(reply.answers()[5].rdata(), "0 0 8080 demo-host.local");
    }

    #[test]
    fn ignores_non_internet_class_queries() {
        let mut responder = test_responder();
        responder.advertise(Advertisement::new(
            "_http._tcp.local".parse().unwrap(),
            Label::new("web"),
            "demo-host.local".parse().unwrap(),
            80,
        ));

        // Rewrite the query's QCLASS (its final two octets) to CH.
        let name: DomainName = "_http._tcp.local".parse().unwrap();
        let mut needed = 0;
        build_search(&name, None, &mut needed);
        let mut buf = vec![0; needed];
        let written = build_search(&name, Some(&mut buf), &mut needed);
        buf[written - 2..written].copy_from_slice(&3u16.to_be_bytes());

        let msg = Message::decode(&buf[..written]);
        assert_eq!(msg.last_error(), None);
        assert!(responder.answers_for(&msg.questions()[0]).is_none());
    }

    #[test]
    fn ignores_services_not_in_the_catalog() {
        let mut responder = test_responder();
        responder.advertise(Advertisement::new(
            "_http._tcp.local".parse().unwrap(),
            Label::new("web"),
            "demo-host.local".parse().unwrap(),
            80,
        ));

        let msg = ptr_question("_ipp._tcp.local");
        assert!(responder.answers_for(&msg.questions()[0]).is_none());

        let msg = ptr_question(SERVICE_ENUMERATION);
        let q = &msg.questions()[0];
        assert!(responder.answers_for(q).is_some());

        let empty = test_responder();
        assert!(empty.answers_for(q).is_none());
    }
}
