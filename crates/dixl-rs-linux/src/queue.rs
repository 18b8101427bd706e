use crossbeam_channel::{Receiver, Sender, bounded};
use dixl_rs::Msg;
use dixl_rs::types::QUEUE_CAPACITY;
use log::warn;

/// Sender half of one task's bounded inbound queue.
///
/// Sends block while the queue is full (FIFO, capacity 1024). A send to a
/// task whose receiver is gone is only worth a warning: it happens during
/// shutdown, and at runtime the diagnostic task is the one reporting dead
/// siblings.
#[derive(Clone)]
pub struct Queue {
    name: &'static str,
    sender: Sender<Msg>,
}

impl Queue {
    pub fn bounded(name: &'static str) -> (Queue, Receiver<Msg>) {
        let (sender, receiver) = bounded(QUEUE_CAPACITY);
        (Queue { name, sender }, receiver)
    }

    pub fn send(&self, msg: Msg) {
        if self.sender.send(msg).is_err() {
            warn!("[{}] queue send failed, receiver is gone", self.name);
        }
    }
}
