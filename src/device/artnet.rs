//! Art-Net listener delivering per-universe DMX frames.
//!
//! Packets are decoded with `artnet_protocol`; only ArtDmx (`Output`)
//! commands are dispatched, polling and the rest of the protocol are left
//! to dedicated nodes.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use artnet_protocol::{ArtCommand, Output};
use parking_lot::RwLock;

/// Standard Art-Net UDP port.
pub const ARTNET_PORT: u16 = 6454;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receives the raw channel values of one universe frame.
pub type FrameCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Source of per-universe DMX frames.
pub trait UniverseSource {
    /// Route frames for `universe` to `callback`, replacing any earlier one.
    fn register_listener(&self, universe: u16, callback: FrameCallback);
}

/// Decode an ArtDmx packet; `None` for any other command or garbage.
pub fn decode_dmx(packet: &[u8]) -> Option<Output> {
    match ArtCommand::from_buffer(packet) {
        Ok(ArtCommand::Output(output)) => Some(output),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Dropping undecodable Art-Net packet: {e:?}");
            None
        }
    }
}

/// UDP Art-Net listener running on a background thread.
pub struct ArtNetListener {
    local_addr: SocketAddr,
    listeners: Arc<RwLock<HashMap<u16, FrameCallback>>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ArtNetListener {
    /// Bind the socket and start receiving.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;

        let listeners: Arc<RwLock<HashMap<u16, FrameCallback>>> = Arc::default();
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let listeners = Arc::clone(&listeners);
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("artnet-listener".into())
                .spawn(move || receive_loop(socket, listeners, running))?
        };

        log::info!("Listening for Art-Net on {local_addr}");
        Ok(Self {
            local_addr,
            listeners,
            running,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the receive thread. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Art-Net listener thread panicked");
            }
        }
        self.listeners.write().clear();
    }
}

impl UniverseSource for ArtNetListener {
    fn register_listener(&self, universe: u16, callback: FrameCallback) {
        self.listeners.write().insert(universe, callback);
    }
}

impl Drop for ArtNetListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(
    socket: UdpSocket,
    listeners: Arc<RwLock<HashMap<u16, FrameCallback>>>,
    running: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 1024];
    while running.load(Ordering::Acquire) {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                log::warn!("Art-Net receive failed: {e}");
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };

        let Some(output) = decode_dmx(&buf[..len]) else {
            continue;
        };
        let universe = u16::from(output.port_address);
        // Clone out so the callback runs without holding the table lock.
        let callback = listeners.read().get(&universe).cloned();
        if let Some(callback) = callback {
            let data: &[u8] = output.data.as_ref();
            callback(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artnet_protocol::PortAddress;
    use std::sync::mpsc;

    fn art_dmx(universe: u16, data: &[u8]) -> Vec<u8> {
        ArtCommand::Output(Output {
            port_address: PortAddress::try_from(universe).unwrap(),
            data: data.to_vec().into(),
            ..Output::default()
        })
        .write_to_buffer()
        .unwrap()
    }

    #[test]
    fn test_decode_dmx() {
        let data: Vec<u8> = (0..=255).cycle().take(512).collect();
        let output = decode_dmx(&art_dmx(0x0123, &data)).unwrap();
        assert_eq!(u16::from(output.port_address), 0x0123);
        let decoded: &[u8] = output.data.as_ref();
        assert_eq!(decoded, &data[..]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_dmx(b"Art-Net\0").is_none());
        assert!(decode_dmx(b"definitely not art-net").is_none());
        let mut packet = art_dmx(0, &[1, 2, 3, 4]);
        packet[0] = b'X';
        assert!(decode_dmx(&packet).is_none());
    }

    #[test]
    fn test_listener_dispatches_by_universe() {
        let mut listener = ArtNetListener::bind("127.0.0.1:0").unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = parking_lot::Mutex::new(tx);
        listener.register_listener(
            2,
            Arc::new(move |data: &[u8]| {
                let _ = tx.lock().send(data.to_vec());
            }),
        );

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(b"garbage", listener.local_addr())
            .unwrap();
        sender
            .send_to(&art_dmx(1, &[9; 512]), listener.local_addr())
            .unwrap();
        sender
            .send_to(&art_dmx(2, &[5; 512]), listener.local_addr())
            .unwrap();

        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received, vec![5; 512]);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        listener.shutdown();
        listener.shutdown();
    }
}
