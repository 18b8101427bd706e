use crate::QueueSet;
use crossbeam_channel::Receiver;
use dixl_rs::logbuf::LogBuffer;
use dixl_rs::message::ExtBody;
use dixl_rs::types::LOG_MAX_LINES;
use dixl_rs::Msg;
use log::{info, warn};

/// Logger task: owns the ring of structured records and answers the host
/// pull protocol (LOGREQ streams, LOGDEL prunes).
pub fn run(queues: QueueSet, rx: Receiver<Msg>) {
    info!("[Log] Task started");

    let mut buffer = LogBuffer::new(LOG_MAX_LINES);

    loop {
        match rx.recv() {
            Err(_) => break,
            Ok(Msg::Shutdown) => break,
            Ok(Msg::Log(record)) => buffer.push(record),
            Ok(Msg::External(message)) => match message.body {
                ExtBody::LogReq => {
                    let records = buffer.stream();
                    let total = records.len() as u32;
                    info!("[Log] Streaming {total} record(s) to {}", message.source);
                    for (index, record) in records.into_iter().enumerate() {
                        queues.comm_tx.send(Msg::LogSend {
                            destination: message.source,
                            current: index as u32 + 1,
                            total,
                            record,
                        });
                    }
                }
                ExtBody::LogDel => {
                    let removed = buffer.prune();
                    info!("[Log] Pruned {removed} record(s)");
                    queues.comm_tx.send(Msg::LogDelAck { destination: message.source });
                }
                _ => {
                    warn!("[Log] Unattended message type, should not be sent to Log task and will be ignored");
                }
            },
            Ok(_) => {
                warn!("[Log] Unattended message type, should not be sent to Log task and will be ignored");
            }
        }
    }
    info!("[Log] Task stopped");
}
