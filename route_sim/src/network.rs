use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use route_protocol::length_prefixed;

/// Frames a subscriber may have queued before it is considered stalled.
pub const FRAME_QUEUE_DEPTH: usize = 8;
/// Longest a single frame write may block before the subscriber is dropped.
pub const FRAME_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

type Frame = Arc<[u8]>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Subscriber {
    addr: SocketAddr,
    queue: Sender<Frame>,
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<Frame>>,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Pushes length-prefixed board frames to every connected observer.
///
/// Each subscriber has its own writer thread fed by a bounded queue, so
/// `broadcast` never blocks on a socket. A subscriber whose queue fills up or
/// whose write times out is disconnected. New subscribers receive the most
/// recent frame first.
pub struct FrameServer {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
}

impl FrameServer {
    pub fn broadcast(&self, bytes: &[u8]) {
        let frame: Frame = Arc::from(bytes);
        let mut latest = lock(&self.shared.latest);
        *latest = Some(Arc::clone(&frame));
        lock(&self.shared.subscribers).retain(|subscriber| {
            match subscriber.queue.try_send(Arc::clone(&frame)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        target: "route_sim::server",
                        addr = %subscriber.addr,
                        queued = FRAME_QUEUE_DEPTH,
                        "frame_client.lagging_dropped"
                    );
                    false
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!(
                        target: "route_sim::server",
                        addr = %subscriber.addr,
                        "frame_client.removed"
                    );
                    false
                }
            }
        });
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }
}

pub fn start_frame_server(bind_addr: SocketAddr) -> Option<FrameServer> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::warn!(
                target: "route_sim::server",
                addr = %bind_addr,
                error = %err,
                "frame_server.bind_failed"
            );
            return None;
        }
    };
    let local_addr = listener.local_addr().unwrap_or(bind_addr);
    let shared = Arc::new(Shared::default());
    let accept_shared = Arc::clone(&shared);

    let spawned = thread::Builder::new()
        .name("route-frame-accept".into())
        .spawn(move || accept_loop(listener, accept_shared));
    if let Err(err) = spawned {
        tracing::warn!(
            target: "route_sim::server",
            error = %err,
            "frame_server.spawn_failed"
        );
        return None;
    }

    tracing::info!(target: "route_sim::server", addr = %local_addr, "frame_server.listening");
    Some(FrameServer { shared, local_addr })
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(target: "route_sim::server", error = %err, "frame_client.accept_failed");
                thread::sleep(Duration::from_millis(200));
                continue;
            }
        };
        let addr = match prepare_stream(&stream) {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!(target: "route_sim::server", error = %err, "frame_client.setup_failed");
                continue;
            }
        };

        let (queue, frames) = bounded::<Frame>(FRAME_QUEUE_DEPTH);
        let spawned = thread::Builder::new()
            .name(format!("route-frame-{addr}"))
            .spawn(move || write_loop(stream, addr, frames));
        if let Err(err) = spawned {
            tracing::warn!(target: "route_sim::server", %addr, error = %err, "frame_client.spawn_failed");
            continue;
        }

        // Registered under `latest` so the subscriber sees each frame once.
        let latest = lock(&shared.latest);
        if let Some(frame) = latest.as_ref() {
            let _ = queue.try_send(Arc::clone(frame));
        }
        lock(&shared.subscribers).push(Subscriber { addr, queue });
        drop(latest);
        tracing::info!(target: "route_sim::server", %addr, "frame_client.connected");
    }
}

fn prepare_stream(stream: &TcpStream) -> io::Result<SocketAddr> {
    let addr = stream.peer_addr()?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(FRAME_WRITE_TIMEOUT))?;
    Ok(addr)
}

fn write_loop(mut stream: TcpStream, addr: SocketAddr, frames: Receiver<Frame>) {
    while let Ok(frame) = frames.recv() {
        if let Err(err) = write_frame(&mut stream, &frame) {
            tracing::warn!(target: "route_sim::server", %addr, error = %err, "frame_client.dropped");
            return;
        }
    }
}

fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> io::Result<()> {
    stream.write_all(&length_prefixed(frame))
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::Instant;

    use super::*;

    fn read_frame(client: &mut TcpStream) -> io::Result<Vec<u8>> {
        let mut len = [0u8; 4];
        client.read_exact(&mut len)?;
        let mut body = vec![0u8; u32::from_le_bytes(len) as usize];
        client.read_exact(&mut body)?;
        Ok(body)
    }

    fn wait_for_subscribers(server: &FrameServer, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.subscriber_count() != count {
            assert!(Instant::now() < deadline, "subscribers never reached {count}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn late_subscriber_gets_latest_frame() {
        let server = start_frame_server("127.0.0.1:0".parse().unwrap()).unwrap();
        server.broadcast(b"first");
        server.broadcast(b"second");

        let mut client = TcpStream::connect(server.local_addr()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(read_frame(&mut client).unwrap(), b"second");

        wait_for_subscribers(&server, 1);
        server.broadcast(b"third");
        assert_eq!(read_frame(&mut client).unwrap(), b"third");
    }

    #[test]
    fn stalled_subscriber_is_dropped_without_starving_others() {
        let server = start_frame_server("127.0.0.1:0".parse().unwrap()).unwrap();
        let _stalled = TcpStream::connect(server.local_addr()).unwrap();
        let mut reader = TcpStream::connect(server.local_addr()).unwrap();
        reader
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        wait_for_subscribers(&server, 2);

        let frame = vec![7u8; 256 * 1024];
        let deadline = Instant::now() + Duration::from_secs(30);
        while server.subscriber_count() > 1 {
            assert!(Instant::now() < deadline, "stalled subscriber was never dropped");
            server.broadcast(&frame);
            assert_eq!(read_frame(&mut reader).unwrap().len(), frame.len());
        }

        assert_eq!(server.subscriber_count(), 1);
        server.broadcast(b"after");
        assert_eq!(read_frame(&mut reader).unwrap(), b"after");
    }
}
