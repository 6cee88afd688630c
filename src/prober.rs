//! Periodic mDNS service probing.
//!
//! [`Prober`] keeps asking the network for one service from a background
//! thread, multicasting a PTR query per interval. The intervals are
//! randomized so that several responders on the same link do not fire in
//! lockstep.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::ops::RangeInclusive;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;

use crate::wire::{encoder::build_search, name::DomainName};

/// Delay before the first probe, in milliseconds.
const FIRST_PROBE_MS: RangeInclusive<u64> = 5_000..=10_000;
/// Delay between subsequent probes, in milliseconds.
const STEADY_PROBE_MS: RangeInclusive<u64> = 10_000..=100_000;

/// Periodically multicasts a PTR query for one service name.
///
/// The probe thread runs until [`Prober::stop`] is called or the prober is
/// dropped.
pub struct Prober {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

struct Shared {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Prober {
    /// Starts probing for `service`, sending queries over `sock` to `dest`.
    ///
    /// `sock` is typically a clone of a responder's socket, and `dest` the
    /// mDNS multicast group.
    pub fn start(sock: UdpSocket, service: DomainName, dest: SocketAddr) -> Prober {
        let shared = Arc::new(Shared {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread = thread::spawn({
            let shared = Arc::clone(&shared);
            move || run(&shared, &sock, &service, dest)
        });
        Prober {
            shared,
            thread: Some(thread),
        }
    }

    /// Stops the probe thread and waits for it to exit.
    pub fn stop(&mut self) {
        *self.shared.stopped.lock().unwrap() = true;
        self.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Prober {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared, sock: &UdpSocket, service: &DomainName, dest: SocketAddr) {
    let mut interval = FIRST_PROBE_MS;
    let mut stopped = shared.stopped.lock().unwrap();
    loop {
        let delay = Duration::from_millis(rand::thread_rng().gen_range(interval.clone()));
        let (guard, _) = shared.wake.wait_timeout(stopped, delay).unwrap();
        stopped = guard;
        if *stopped {
            return;
        }

        if let Err(e) = send_probe(sock, service, dest) {
            log::warn!("failed to probe for {}: {}", service, e);
        }
        interval = STEADY_PROBE_MS;
    }
}

fn send_probe(sock: &UdpSocket, service: &DomainName, dest: SocketAddr) -> io::Result<()> {
    let mut needed = 0;
    build_search(service, None, &mut needed);
    let mut buf = vec![0; needed];
    let written = build_search(service, Some(&mut buf), &mut needed);
    debug_assert_eq!(needed, 0);

    log::debug!("probing for {} ({} bytes to {})", service, written, dest);
    sock.send_to(&buf[..written], dest)?;
    Ok(())
}
