use crate::{
    NodeOptions, QueueSet, TASK_COMM_RX, TASK_COMM_TX, TASK_CTRL, TASK_LOG, TASK_POINT,
    TASK_SENSOR, TaskRegistry, wall_now,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use dixl_rs::diag::DiagMonitor;
use dixl_rs::{Msg, PeerProbe};
use log::{error, info, warn};
use std::time::Duration;

/// Diagnostic task: verifies sibling liveness and the reachability of the
/// configured upstream peers, escalating any failure to Ctrl and the host.
///
/// Monitoring runs between a CONFIGSET and the first latched error (or a
/// CONFIGRESET); outside that window the task just waits for messages.
pub fn run(
    options: NodeOptions,
    queues: QueueSet,
    registry: TaskRegistry,
    rx: Receiver<Msg>,
    mut probe: Box<dyn PeerProbe + Send>,
) {
    info!("[Diag] Task started");
    info!("[Diag] Diagnostic check specs:");
    info!("[Diag] > Requested check period: {}ms", options.diag_check_period_ms);
    info!("[Diag] > Echo requests per check: {}", options.diag_ping_pkts);

    let period = Duration::from_millis(options.diag_check_period_ms);
    let mut monitor: Option<DiagMonitor> = None;
    let mut task_error = false;
    let mut peer_error = false;

    loop {
        let monitoring = monitor.is_some() && !task_error && !peer_error;
        let received = if monitoring {
            match rx.recv_timeout(period) {
                Ok(msg) => Some(msg),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match rx.recv() {
                Ok(msg) => Some(msg),
                Err(_) => break,
            }
        };

        match received {
            Some(Msg::Shutdown) => break,
            Some(Msg::NodeConfigSet(config)) => {
                monitor = Some(DiagMonitor::new(&config.routes));
                task_error = false;
                peer_error = false;
                info!("[Diag] Configuration SET. Clients list created. Starting to monitor");
                continue;
            }
            Some(Msg::NodeConfigReset) => {
                monitor = None;
                task_error = false;
                peer_error = false;
                info!("[Diag] Configuration RESET. Clients list cleaned");
                continue;
            }
            Some(_) => {
                warn!("[Diag] Unattended message type, should not be sent to Diag task and will be ignored");
                continue;
            }
            None => {}
        }

        // Period tick: sibling liveness first, then one peer.
        if !check_tasks(&queues, &registry, &mut task_error) {
            info!("[Diag] Monitoring stopped");
            continue;
        }
        if let Some(mon) = monitor.as_mut() {
            if let Some(peer) = mon.current() {
                let ok = probe.probe(peer, options.diag_ping_pkts).is_ok();
                mon.record(ok, wall_now());
                if !ok {
                    error!(
                        "[Diag] Unable to communicate with prev node {peer}. Node is going into fail-safe mode"
                    );
                    peer_error = true;
                    if registry.is_alive(TASK_CTRL) {
                        queues.ctrl.send(Msg::DiagErrComm { peer });
                    }
                    if registry.is_alive(TASK_COMM_TX) {
                        queues.comm_tx.send(Msg::DiagErrComm { peer });
                    }
                    info!("[Diag] Monitoring stopped");
                }
            }
        }
    }
    info!("[Diag] Task stopped");
}

/// Probes the liveness of every sibling task.
///
/// A dead Ctrl can only be reported to the host; a dead CommTx only to
/// Ctrl; any other dead task is reported to whichever of the two is still
/// alive.
fn check_tasks(queues: &QueueSet, registry: &TaskRegistry, task_error: &mut bool) -> bool {
    let ctrl_alive = registry.is_alive(TASK_CTRL);
    let comm_tx_alive = registry.is_alive(TASK_COMM_TX);

    let mut report = |name: &str, to_ctrl: bool, to_host: bool| {
        error!("[Diag] {name} task is dead. Node is going into fail-safe mode");
        *task_error = true;
        if to_ctrl && ctrl_alive {
            queues.ctrl.send(Msg::DiagErrTask);
        }
        if to_host && comm_tx_alive {
            queues.comm_tx.send(Msg::DiagErrTask);
        }
    };

    if !ctrl_alive {
        // Without Ctrl the node cannot answer requests anyway.
        report(TASK_CTRL, false, true);
    }
    if !comm_tx_alive {
        report(TASK_COMM_TX, true, false);
    }
    for name in [TASK_COMM_RX, TASK_LOG, TASK_POINT, TASK_SENSOR] {
        if !registry.is_alive(name) {
            report(name, true, true);
        }
    }

    !*task_error
}
