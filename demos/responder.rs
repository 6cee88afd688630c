//! Advertises an HTTP service instance and answers mDNS queries, while
//! probing for peer services in the background.

use std::io;
use std::net::IpAddr;

use log::LevelFilter;
use mdns_wire::prober::Prober;
use mdns_wire::responder::{
    Advertisement, Responder, MDNS_GROUP_V4, MDNS_PORT, SERVICE_ENUMERATION,
};
use mdns_wire::wire::records::TxtStrings;

fn main() -> io::Result<()> {
    env_logger::Builder::new()
        .filter_module("mdns_wire", LevelFilter::Trace)
        .filter_module(env!("CARGO_CRATE_NAME"), LevelFilter::Trace)
        .init();

    let addr = if_addrs::get_if_addrs()?
        .into_iter()
        .find_map(|interface| match interface.ip() {
            IpAddr::V4(ip) if ip.is_private() => Some(ip),
            _ => None,
        })
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no private IPv4 address")
        })?;

    let mut responder = Responder::new()?;
    responder.advertise(
        Advertisement::new(
            "_http._tcp.local".parse().unwrap(),
            "web".parse().unwrap(),
            "demo-host.local".parse().unwrap(),
            80,
        )
        .txt(TxtStrings::new(["path=/"]))
        .ipv4(addr),
    );

    let probe_sock = responder.socket().try_clone()?;
    let _prober = Prober::start(
        probe_sock,
        SERVICE_ENUMERATION.parse().unwrap(),
        (MDNS_GROUP_V4, MDNS_PORT).into(),
    );

    responder.listen()
}
