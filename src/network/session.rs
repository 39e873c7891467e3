//! TCP streaming session.
//!
//! One client at a time: further connections wait in the listen backlog
//! until the current one goes away. Inbound bytes are decoded into commands
//! and applied in order; outbound, a drain task moves fixed-size sample
//! chunks from the pipeline to whichever client is connected, or drops them
//! when nobody is.

use bytes::Bytes;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::protocol::{FrameDecoder, WireCommand};
use crate::config::{NetworkConfig, StreamConfig};
use crate::controller::RadioControl;
use crate::error::NetworkError;
use crate::sample::codec::interleave_into;
use crate::sample::SamplePipeline;

/// Chunks queued for the socket writer before the drain starts dropping
const OUTBOUND_QUEUE: usize = 64;
const READ_BUFFER: usize = 4096;
const LISTEN_BACKLOG: i32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Listening,
    Connected(SocketAddr),
}

/// Counters for the streaming side
#[derive(Debug, Default)]
pub struct SessionStats {
    pub connections: AtomicU64,
    pub commands_received: AtomicU64,
    pub commands_forwarded: AtomicU64,
    /// Decoded but not meant for the receiver
    pub commands_ignored: AtomicU64,
    pub chunks_sent: AtomicU64,
    /// Dropped because the writer was behind
    pub chunks_dropped: AtomicU64,
    /// Drained with no client connected
    pub chunks_discarded: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl SessionStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            commands_received: self.commands_received.load(Ordering::Relaxed),
            commands_forwarded: self.commands_forwarded.load(Ordering::Relaxed),
            commands_ignored: self.commands_ignored.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            chunks_discarded: self.chunks_discarded.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub commands_received: u64,
    pub commands_forwarded: u64,
    pub commands_ignored: u64,
    pub chunks_sent: u64,
    pub chunks_dropped: u64,
    pub chunks_discarded: u64,
    pub bytes_sent: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} connections, {} commands ({} forwarded, {} ignored), {} chunks sent, {} dropped, {} discarded, {:.1} MB sent",
            self.connections,
            self.commands_received,
            self.commands_forwarded,
            self.commands_ignored,
            self.chunks_sent,
            self.chunks_dropped,
            self.chunks_discarded,
            self.bytes_sent as f64 / (1024.0 * 1024.0)
        )
    }
}

/// Apply one decoded command. Returns `None` for commands that are accepted
/// but never reach the receiver.
pub fn forward(control: &dyn RadioControl, command: WireCommand) -> Option<bool> {
    let result = match command {
        WireCommand::SetFrequency(hz) => control.set_frequency(hz),
        WireCommand::SetSampleRate(hz) => control.set_sample_rate(hz),
        WireCommand::SetGain(tenths) => control.set_gain(tenths),
        WireCommand::SetFrequencyCorrection(ppm) => control.set_ppm(f64::from(ppm)),
        // 0 selects automatic gain, 1 manual
        WireCommand::SetAgc(mode) => control.set_agc(mode != 1),
        WireCommand::SetBiasTee(on) => control.set_bias_t(on),
        other => {
            debug!("Ignoring {:?}", other);
            return None;
        }
    };
    Some(result)
}

type ClientSlot = Arc<Mutex<Option<mpsc::Sender<Bytes>>>>;

pub struct StreamingServer {
    listener: TcpListener,
    control: Arc<dyn RadioControl>,
    pipeline: Arc<SamplePipeline>,
    nodelay: bool,
    send_buffer_size: Option<usize>,
    poll_interval: Duration,
    state: Arc<Mutex<SessionState>>,
    stats: Arc<SessionStats>,
    client: ClientSlot,
}

impl StreamingServer {
    /// Bind the listening socket. Must be called inside a tokio runtime.
    pub fn bind(
        network: &NetworkConfig,
        stream: &StreamConfig,
        control: Arc<dyn RadioControl>,
        pipeline: Arc<SamplePipeline>,
    ) -> Result<Self, NetworkError> {
        let addr = network
            .socket_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        let listener = listen(addr).map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

        Ok(Self {
            listener,
            control,
            pipeline,
            nodelay: network.nodelay,
            send_buffer_size: network.send_buffer_size,
            poll_interval: stream.poll_interval(),
            state: Arc::new(Mutex::new(SessionState::Listening)),
            stats: Arc::new(SessionStats::default()),
            client: Arc::new(Mutex::new(None)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.listener
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))
    }

    pub fn state_handle(&self) -> Arc<Mutex<SessionState>> {
        Arc::clone(&self.state)
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Serve clients until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), NetworkError>
    where
        F: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let drain = tokio::spawn(drain_loop(
            Arc::clone(&self.pipeline),
            Arc::clone(&self.client),
            Arc::clone(&self.stats),
            self.poll_interval,
            stop_rx.clone(),
        ));

        info!("Listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let mut stop = stop_rx.clone();
                        tokio::select! {
                            _ = &mut shutdown => break,
                            _ = self.serve(stream, addr, &mut stop) => {}
                        }
                    }
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        let _ = stop_tx.send(true);
        *self.client.lock() = None;
        *self.state.lock() = SessionState::Listening;
        let _ = drain.await;
        info!("Streaming server stopped");
        Ok(())
    }

    async fn serve(&self, stream: TcpStream, addr: SocketAddr, stop: &mut watch::Receiver<bool>) {
        if let Err(e) = self.configure(&stream) {
            warn!("Could not tune socket for {}: {}", addr, e);
        }
        SessionStats::bump(&self.stats.connections, 1);
        info!("Client connected: {}", addr);

        let (mut reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<Bytes>(OUTBOUND_QUEUE);
        *self.client.lock() = Some(tx);
        *self.state.lock() = SessionState::Connected(addr);

        let stats = Arc::clone(&self.stats);
        let mut writer_task = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                writer.write_all(&chunk).await?;
                SessionStats::bump(&stats.bytes_sent, chunk.len() as u64);
            }
            Ok::<_, std::io::Error>(())
        });

        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!("{} closed the connection", addr);
                        break;
                    }
                    Ok(n) => {
                        for command in decoder.decode(&buf[..n]) {
                            self.apply(command).await;
                        }
                    }
                    Err(e) => {
                        warn!("{}", NetworkError::ReceiveFailed(format!("{}: {}", addr, e)));
                        break;
                    }
                },
                written = &mut writer_task => {
                    match written {
                        Ok(Err(e)) => warn!("{}", NetworkError::SendFailed(format!("{}: {}", addr, e))),
                        Err(e) => warn!("Writer for {} ended: {}", addr, e),
                        Ok(Ok(())) => {}
                    }
                    break;
                }
                _ = stop.changed() => break,
            }
        }

        *self.client.lock() = None;
        writer_task.abort();
        *self.state.lock() = SessionState::Listening;
        info!("Client disconnected: {}", addr);
    }

    /// Commands block on the hardware worker, so they run on the blocking
    /// pool, one at a time and in arrival order
    async fn apply(&self, command: WireCommand) {
        SessionStats::bump(&self.stats.commands_received, 1);
        let control = Arc::clone(&self.control);
        match tokio::task::spawn_blocking(move || forward(control.as_ref(), command)).await {
            Ok(Some(ok)) => {
                SessionStats::bump(&self.stats.commands_forwarded, 1);
                if !ok {
                    debug!("{:?} was not applied", command);
                }
            }
            Ok(None) => SessionStats::bump(&self.stats.commands_ignored, 1),
            Err(e) => warn!("Command task failed: {}", e),
        }
    }

    fn configure(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        if let Some(size) = self.send_buffer_size {
            SockRef::from(stream).set_send_buffer_size(size)?;
        }
        Ok(())
    }
}

fn listen(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    TcpListener::from_std(socket.into())
}

/// Move full chunks from the pipeline to the connected client
async fn drain_loop(
    pipeline: Arc<SamplePipeline>,
    client: ClientSlot,
    stats: Arc<SessionStats>,
    poll_interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut chunk = Vec::with_capacity(pipeline.chunk_samples());
    let mut bytes = Vec::with_capacity(pipeline.chunk_samples() * 2);

    loop {
        tokio::select! {
            _ = pipeline.chunk_ready() => {}
            _ = tokio::time::sleep(poll_interval) => {}
            _ = stop.changed() => return,
        }

        while pipeline.drain_chunk(&mut chunk) {
            let sender = client.lock().clone();
            let Some(sender) = sender else {
                SessionStats::bump(&stats.chunks_discarded, 1);
                continue;
            };

            bytes.clear();
            interleave_into(&chunk, &mut bytes);
            match sender.try_send(Bytes::copy_from_slice(&bytes)) {
                Ok(()) => SessionStats::bump(&stats.chunks_sent, 1),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    SessionStats::bump(&stats.chunks_dropped, 1)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    SessionStats::bump(&stats.chunks_discarded, 1)
                }
            }
        }
    }
}
