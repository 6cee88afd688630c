//! Logs every mDNS message seen on the local link.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use log::LevelFilter;
use mdns_wire::responder::{MDNS_GROUP_V4, MDNS_PORT};
use mdns_wire::wire::Message;
use mdns_wire::MDNS_BUFFER_SIZE;
use socket2::{Domain, Protocol, Socket, Type};

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .init();

    let sock = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    sock.set_reuse_address(true)?;
    sock.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT).into())?;

    let sock = UdpSocket::from(sock);
    sock.join_multicast_v4(&MDNS_GROUP_V4, &Ipv4Addr::UNSPECIFIED)?;
    sock.set_multicast_loop_v4(true)?;

    let mut buf = [0; MDNS_BUFFER_SIZE];
    loop {
        let (len, from) = sock.recv_from(&mut buf)?;
        let msg = Message::decode(&buf[..len]);
        log::info!(
            "{} of {} bytes from {}\n{}",
            msg.bytes_decoded(),
            len,
            from,
            msg,
        );
    }
}
