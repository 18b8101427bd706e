use crate::{NodeOptions, QueueSet};
use dixl_rs::message::ExtKind;
use dixl_rs::message::codec::HEADER_LEN;
use dixl_rs::types::{COMM_BUFFER_SIZE, MSG_MAX_LENGTH};
use dixl_rs::{DixlError, Msg, deserialize_message};
use log::{error, info, warn};
use std::io::{ErrorKind, Read};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const READ_POLL: Duration = Duration::from_millis(200);

/// CommRx task: accepts one TCP connection at a time, re-frames the byte
/// stream into length-prefixed messages and routes each to the owning task.
///
/// Connection-level failures close the connection and return to accept;
/// the task never exits on them. Only the initial bind/listen failure is
/// fatal, nothing can be received without a listener.
pub fn run(options: NodeOptions, queues: QueueSet, shutdown: Arc<AtomicBool>) {
    info!("[CommRx] Task started");

    let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, options.port)) {
        Ok(listener) => listener,
        Err(e) => {
            error!("[CommRx] {}: {e}", DixlError::SocketBind);
            process::exit(DixlError::SocketBind.exit_code());
        }
    };
    if let Err(e) = listener.set_nonblocking(true) {
        error!("[CommRx] {}: {e}", DixlError::SocketInit);
        process::exit(DixlError::SocketInit.exit_code());
    }
    info!("[CommRx] Listening on {}:{} ...", options.local_id, options.port);

    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                info!("[CommRx] Connection accepted from {peer}");
                handle_connection(stream, &queues, &shutdown);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                // Accept failures drop nothing persistent; keep listening.
                warn!("[CommRx] {}: {e}", DixlError::SocketAccept);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    info!("[CommRx] Task stopped");
}

/// Receives until the peer closes or errors, extracting every complete
/// message from the reassembly buffer.
fn handle_connection(mut stream: TcpStream, queues: &QueueSet, shutdown: &AtomicBool) {
    if stream.set_nonblocking(false).is_err() || stream.set_read_timeout(Some(READ_POLL)).is_err() {
        warn!("[CommRx] {}", DixlError::SocketInit);
        return;
    }

    // Overflow is not possible: a chunk is at most one maximum-length
    // message, the buffer holds two, and complete messages are removed
    // before the next read.
    let mut buffer = [0u8; COMM_BUFFER_SIZE];
    let mut buffered = 0usize;
    let mut chunk = [0u8; MSG_MAX_LENGTH];

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(received) => {
                buffer[buffered..buffered + received].copy_from_slice(&chunk[..received]);
                buffered += received;
                if !drain_messages(&mut buffer, &mut buffered, queues) {
                    return;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                warn!("[CommRx] {}: {e}", DixlError::SocketRecv);
                return;
            }
        }
    }
}

/// Extracts and dispatches every complete message at the front of the
/// buffer. Returns false when the stream is unframeable and the connection
/// must be dropped.
fn drain_messages(buffer: &mut [u8], buffered: &mut usize, queues: &QueueSet) -> bool {
    loop {
        if *buffered == 0 {
            return true;
        }
        let message_len = buffer[0] as usize;
        if message_len < HEADER_LEN {
            // The length prefix cannot be trusted; framing is lost.
            warn!("[CommRx] Invalid message length {message_len}, dropping connection");
            return false;
        }
        if message_len > *buffered {
            // Incomplete message; wait for more bytes.
            return true;
        }
        match deserialize_message(&buffer[..message_len]) {
            Ok(message) => dispatch(message, queues),
            Err(e) => warn!("[CommRx] Undecodable message discarded: {e}"),
        }
        buffer.copy_within(message_len..*buffered, 0);
        *buffered -= message_len;
    }
}

/// Routes one decoded message to the task owning its type.
fn dispatch(message: dixl_rs::ExtMessage, queues: &QueueSet) {
    match message.body.kind() {
        ExtKind::NodeReset | ExtKind::NodeConfig => queues.init.send(Msg::External(message)),
        ExtKind::LogReq | ExtKind::LogSend | ExtKind::LogDel => {
            queues.log.send(Msg::External(message));
        }
        ExtKind::RouteReq
        | ExtKind::RouteAck
        | ExtKind::RouteNack
        | ExtKind::RouteCommit
        | ExtKind::RouteAgree
        | ExtKind::RouteDisagree => queues.ctrl.send(Msg::External(message)),
        ExtKind::PointMalfunc => queues.point.send(Msg::External(message)),
        other => {
            warn!("[CommRx] Message type {other:?} has no local consumer, discarded");
        }
    }
}
