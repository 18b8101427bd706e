//! Linux runtime for the dIXL node: one thread per task, bounded FIFO
//! queues in between, TCP in and out. The platform-agnostic state machines
//! and codecs live in `dixl-rs`; this crate only owns scheduling and I/O.

pub mod net;
pub mod queue;
pub mod tasks;

use crossbeam_channel::Receiver;
use dixl_rs::types::{
    COMM_SOCK_PORT, DIAG_CHECK_PERIOD_MS, DIAG_PING_PKTS, POINT_TRANS_TIME_MS,
    SENSOR_CHECK_PERIOD_MS,
};
use dixl_rs::{Msg, NodeId, Timestamp};
use log::{info, warn};
use queue::Queue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

// Task names, also used by the diagnostic liveness check.
pub const TASK_INIT: &str = "dixlInit";
pub const TASK_COMM_RX: &str = "dixlCommRx";
pub const TASK_LOG: &str = "dixlLog";
pub const TASK_POINT: &str = "dixlPoint";
pub const TASK_SENSOR: &str = "dixlSensor";
pub const TASK_CTRL: &str = "dixlCtrl";
pub const TASK_DIAG: &str = "dixlDiag";
pub const TASK_COMM_TX: &str = "dixlCommTx";

/// Wall-clock now, as the core's timestamp type. Used for log records,
/// device nonces and the Ctrl deadline arithmetic.
pub fn wall_now() -> Timestamp {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => Timestamp::new(elapsed.as_secs() as i64, elapsed.subsec_nanos()),
        // Pre-epoch clocks only happen on badly misconfigured targets.
        Err(_) => Timestamp::ZERO,
    }
}

/// Runtime parameters of one node. The defaults mirror the compile-time
/// configuration of the original target; tests shrink the timing values.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Identity of this node (its IPv4 address).
    pub local_id: NodeId,
    /// Port the node listens on.
    pub port: u16,
    /// Port peer nodes and the host listen on.
    pub peer_port: u16,
    pub point_trans_time_ms: u64,
    pub sensor_check_period_ms: u64,
    /// Fixed delay the simulated sensor substitutes for the physical read.
    pub sensor_sim_delay_ms: u64,
    pub diag_check_period_ms: u64,
    pub diag_ping_pkts: u16,
    /// Timeout for outbound connects (CommTx and the reachability probe).
    pub connect_timeout_ms: u64,
}

impl NodeOptions {
    pub fn new(local_id: NodeId) -> Self {
        NodeOptions {
            local_id,
            port: COMM_SOCK_PORT,
            peer_port: COMM_SOCK_PORT,
            point_trans_time_ms: POINT_TRANS_TIME_MS,
            sensor_check_period_ms: SENSOR_CHECK_PERIOD_MS,
            sensor_sim_delay_ms: 5_000,
            diag_check_period_ms: DIAG_CHECK_PERIOD_MS,
            diag_ping_pkts: DIAG_PING_PKTS,
            connect_timeout_ms: 1_000,
        }
    }
}

/// Senders of every task's inbound queue.
#[derive(Clone)]
pub struct QueueSet {
    pub init: Queue,
    pub ctrl: Queue,
    pub log: Queue,
    pub point: Queue,
    pub sensor: Queue,
    pub diag: Queue,
    pub comm_tx: Queue,
}

/// Receivers handed to the Init task, which moves each into the sibling it
/// spawns.
pub struct SiblingReceivers {
    pub ctrl: Receiver<Msg>,
    pub log: Receiver<Msg>,
    pub point: Receiver<Msg>,
    pub sensor: Receiver<Msg>,
    pub diag: Receiver<Msg>,
    pub comm_tx: Receiver<Msg>,
}

/// Spawn-ordered registry of the running tasks. Doubles as the liveness
/// source for the diagnostic task.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<Vec<(&'static str, JoinHandle<()>)>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().unwrap().push((name, handle));
    }

    /// True when the task was spawned and its thread has not terminated.
    pub fn is_alive(&self, name: &str) -> bool {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .any(|(task, handle)| *task == name && !handle.is_finished())
    }

    /// Joins every registered task, newest first (reverse spawn order).
    /// The lock is released around each join: tasks still draining their
    /// queues may query liveness while we wait on them.
    fn join_all(&self) {
        loop {
            let entry = self.tasks.lock().unwrap().pop();
            let Some((name, handle)) = entry else { break };
            if handle.join().is_err() {
                warn!("[Node] {name} task panicked");
            }
        }
    }
}

/// Handle over a started node; dropping it does not stop the node, call
/// [`NodeHandle::stop`].
pub struct NodeHandle {
    queues: QueueSet,
    registry: TaskRegistry,
    shutdown: Arc<AtomicBool>,
    init_handle: Option<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn queues(&self) -> &QueueSet {
        &self.queues
    }

    /// Cooperative shutdown: every task is told to stop in reverse spawn
    /// order, then joined.
    pub fn stop(mut self) {
        info!("[Node] Shutting down");
        self.shutdown.store(true, Ordering::SeqCst);
        for queue in [
            &self.queues.comm_tx,
            &self.queues.diag,
            &self.queues.ctrl,
            &self.queues.sensor,
            &self.queues.point,
            &self.queues.log,
        ] {
            queue.send(Msg::Shutdown);
        }
        self.queues.init.send(Msg::Shutdown);
        self.registry.join_all();
        if let Some(handle) = self.init_handle.take() {
            if handle.join().is_err() {
                warn!("[Node] {TASK_INIT} task panicked");
            }
        }
        info!("[Node] Stopped");
    }
}

/// Boots the node: creates the queues and starts the Init task, which
/// spawns the rest of the task set in dependency order.
pub fn start(options: NodeOptions) -> NodeHandle {
    let (init, init_rx) = Queue::bounded(TASK_INIT);
    let (ctrl, ctrl_rx) = Queue::bounded(TASK_CTRL);
    let (log, log_rx) = Queue::bounded(TASK_LOG);
    let (point, point_rx) = Queue::bounded(TASK_POINT);
    let (sensor, sensor_rx) = Queue::bounded(TASK_SENSOR);
    let (diag, diag_rx) = Queue::bounded(TASK_DIAG);
    let (comm_tx, comm_tx_rx) = Queue::bounded(TASK_COMM_TX);

    let queues = QueueSet { init, ctrl, log, point, sensor, diag, comm_tx };
    let registry = TaskRegistry::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let ctx = tasks::init::InitCtx {
        options,
        queues: queues.clone(),
        registry: registry.clone(),
        shutdown: shutdown.clone(),
    };
    let siblings = SiblingReceivers {
        ctrl: ctrl_rx,
        log: log_rx,
        point: point_rx,
        sensor: sensor_rx,
        diag: diag_rx,
        comm_tx: comm_tx_rx,
    };

    let init_handle = std::thread::Builder::new()
        .name(TASK_INIT.into())
        .spawn(move || tasks::init::run(ctx, siblings, init_rx))
        .expect("failed to spawn the Init task");

    NodeHandle { queues, registry, shutdown, init_handle: Some(init_handle) }
}
