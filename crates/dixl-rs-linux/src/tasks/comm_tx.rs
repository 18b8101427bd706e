use crate::NodeOptions;
use crossbeam_channel::Receiver;
use dixl_rs::message::ExtBody;
use dixl_rs::types::MSG_MAX_LENGTH;
use dixl_rs::{Codec, DixlError, ExtMessage, Msg, NodeId};
use log::{info, warn};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

/// CommTx task: translates internal outbound messages into their external
/// twins and delivers each over a fresh TCP connection.
///
/// Connect and send failures are logged and dropped; retrying is the
/// sender's concern through the Ctrl timeouts.
pub fn run(options: NodeOptions, rx: Receiver<Msg>) {
    info!("[CommTx] Task started");

    // Host address for messages without an explicit destination.
    let mut host = NodeId::NULL;

    loop {
        let msg = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => break,
        };
        match msg {
            Msg::Shutdown => break,
            Msg::CommTxConfigSet { host: address } => {
                host = address;
                info!("[CommTx] Host node address set to {host}");
            }
            Msg::CommTxConfigReset => {
                host = NodeId::NULL;
                info!("[CommTx] Host node address reset");
            }
            other => match translate(other, host) {
                Some((destination, body)) => {
                    if destination.is_null() {
                        warn!("[CommTx] No destination for outbound message, discarded");
                        continue;
                    }
                    let message =
                        ExtMessage { source: options.local_id, destination, body };
                    send_message(&message, &options);
                }
                None => {
                    warn!("[CommTx] Unattended message type, should not be sent to Comm TX and will be ignored");
                }
            },
        }
    }
    info!("[CommTx] Task stopped");
}

/// The fixed one-to-one internal-to-external mapping.
fn translate(msg: Msg, host: NodeId) -> Option<(NodeId, ExtBody)> {
    match msg {
        Msg::SendRoute { kind, destination, route_id } => {
            Some((destination, kind.body(route_id)))
        }
        Msg::DiagErrComm { peer } => Some((host, ExtBody::DiagErrComm(peer))),
        Msg::DiagErrTask => Some((host, ExtBody::DiagErrTask)),
        Msg::LogSend { destination, current, total, record } => {
            Some((destination, ExtBody::LogSend { current, total, record }))
        }
        Msg::LogDelAck { destination } => Some((destination, ExtBody::LogDelAck)),
        _ => None,
    }
}

/// Opens a connection to the destination node, sends one message, closes.
fn send_message(message: &ExtMessage, options: &NodeOptions) {
    let mut buffer = [0u8; MSG_MAX_LENGTH];
    let len = match message.serialize(&mut buffer) {
        Ok(len) => len,
        Err(e) => {
            warn!("[CommTx] Could not serialize outbound message: {e}");
            return;
        }
    };

    let octets = message.destination.octets();
    let addr = SocketAddr::from((
        Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
        options.peer_port,
    ));
    let timeout = Duration::from_millis(options.connect_timeout_ms);
    match TcpStream::connect_timeout(&addr, timeout) {
        Ok(mut stream) => {
            if let Err(e) = stream.write_all(&buffer[..len]) {
                warn!("[CommTx] {} to {}: {e}", DixlError::SocketSend, message.destination);
            }
        }
        Err(e) => {
            warn!("[CommTx] Could not connect to {}: {e}", message.destination);
        }
    }
}
