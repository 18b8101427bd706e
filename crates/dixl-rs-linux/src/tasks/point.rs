use crate::{NodeOptions, QueueSet};
use crossbeam_channel::Receiver;
use dixl_rs::device::point::{PointMechanics, step_period_ms};
use dixl_rs::message::ExtBody;
use dixl_rs::types::PointPosition;
use dixl_rs::Msg;
use log::{info, warn};
use std::thread;
use std::time::Duration;

/// Point simulator task: steps the motor one unit per tick toward the
/// requested position, draining at most one inbound message per tick, and
/// notifies Ctrl once stepping ends while a request nonce is active.
pub fn run(options: NodeOptions, queues: QueueSet, rx: Receiver<Msg>) {
    info!("[Point] Task started");

    let period_ms = step_period_ms(options.point_trans_time_ms);
    let step = Duration::from_millis(period_ms);
    info!("[Point] Straight <-> Diverging switch specs:");
    info!("[Point] > Number of steps        : {}", PointPosition::STEPS);
    info!("[Point] > Requested switch time  : {}ms", options.point_trans_time_ms);
    info!("[Point] > Period per step        : {period_ms}ms");
    info!(
        "[Point] > Real expected switch time: {}ms",
        period_ms * PointPosition::STEPS as u64
    );

    let mut mechanics = PointMechanics::new(PointPosition::STRAIGHT);

    'task: loop {
        // Wait for an activation message.
        let msg = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => break,
        };
        if matches!(msg, Msg::Shutdown) {
            break;
        }
        process_message(&mut mechanics, msg);

        // Step toward the requested position, one unit per period, still
        // draining inbound messages each tick.
        while !mechanics.is_settled() || !rx.is_empty() {
            thread::sleep(step);
            match rx.try_recv() {
                Ok(Msg::Shutdown) => break 'task,
                Ok(msg) => process_message(&mut mechanics, msg),
                Err(_) => {}
            }
            mechanics.step();
        }

        if let Some((position, nonce)) = mechanics.take_notification() {
            info!("[Point] Position {position} reached");
            queues.ctrl.send(Msg::PointNotify { position, nonce });
        }
    }
    info!("[Point] Task stopped");
}

fn process_message(mechanics: &mut PointMechanics, msg: Msg) {
    match msg {
        Msg::PointPos { position, nonce } => {
            info!("[Point] Positioning request toward {position}");
            mechanics.request(position, nonce);
        }
        Msg::PointReset { position } => {
            info!("[Point] Reset to {position}");
            mechanics.reset(position);
        }
        Msg::External(message) if matches!(message.body, ExtBody::PointMalfunc) => {
            warn!("[Point] Malfunction forced by {}", message.source);
            mechanics.force_malfunction();
        }
        _ => {
            warn!("[Point] Unattended message type, should not be sent to Point task and will be ignored");
        }
    }
}
