use crate::net::TcpReachabilityProbe;
use crate::tasks::sensor::SimulatedSensor;
use crate::{
    NodeOptions, QueueSet, SiblingReceivers, TASK_COMM_RX, TASK_COMM_TX, TASK_CTRL, TASK_DIAG,
    TASK_LOG, TASK_POINT, TASK_SENSOR, TaskRegistry,
};
use crossbeam_channel::Receiver;
use dixl_rs::fsm::init::{InitAction, InitMachine};
use dixl_rs::{Msg, PeerProbe, SensorInput};
use log::{error, info, warn};
use std::process;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

pub struct InitCtx {
    pub options: NodeOptions,
    pub queues: QueueSet,
    pub registry: TaskRegistry,
    pub shutdown: Arc<AtomicBool>,
}

fn spawn(registry: &TaskRegistry, name: &'static str, task: impl FnOnce() + Send + 'static) {
    info!("[Init] Spawning {name} task...");
    let handle = std::thread::Builder::new()
        .name(name.into())
        .spawn(task)
        .unwrap_or_else(|error| panic!("failed to spawn {name}: {error}"));
    registry.register(name, handle);
}

/// Spawns the sibling task set.
///
/// The order respects the dependencies: receivers before senders, device
/// simulators before the control logic that commands them.
fn spawn_siblings(ctx: &InitCtx, siblings: SiblingReceivers) {
    {
        let options = ctx.options.clone();
        let queues = ctx.queues.clone();
        let shutdown = ctx.shutdown.clone();
        spawn(&ctx.registry, TASK_COMM_RX, move || {
            crate::tasks::comm_rx::run(options, queues, shutdown);
        });
    }
    {
        let queues = ctx.queues.clone();
        let rx = siblings.log;
        spawn(&ctx.registry, TASK_LOG, move || {
            crate::tasks::log::run(queues, rx);
        });
    }
    {
        let options = ctx.options.clone();
        let queues = ctx.queues.clone();
        let rx = siblings.point;
        spawn(&ctx.registry, TASK_POINT, move || {
            crate::tasks::point::run(options, queues, rx);
        });
    }
    {
        let options = ctx.options.clone();
        let queues = ctx.queues.clone();
        let rx = siblings.sensor;
        let input: Box<dyn SensorInput + Send> = Box::new(SimulatedSensor::new(
            Duration::from_millis(options.sensor_sim_delay_ms),
        ));
        spawn(&ctx.registry, TASK_SENSOR, move || {
            crate::tasks::sensor::run(options, queues, rx, input);
        });
    }
    {
        let queues = ctx.queues.clone();
        let rx = siblings.ctrl;
        spawn(&ctx.registry, TASK_CTRL, move || {
            crate::tasks::ctrl::run(queues, rx);
        });
    }
    {
        let options = ctx.options.clone();
        let queues = ctx.queues.clone();
        let registry = ctx.registry.clone();
        let rx = siblings.diag;
        let probe: Box<dyn PeerProbe + Send> = Box::new(TcpReachabilityProbe {
            port: options.peer_port,
            timeout: Duration::from_millis(options.connect_timeout_ms),
        });
        spawn(&ctx.registry, TASK_DIAG, move || {
            crate::tasks::diag::run(options, queues, registry, rx, probe);
        });
    }
    {
        let options = ctx.options.clone();
        let rx = siblings.comm_tx;
        spawn(&ctx.registry, TASK_COMM_TX, move || {
            crate::tasks::comm_tx::run(options, rx);
        });
    }
}

fn apply(action: InitAction, queues: &QueueSet) {
    match action {
        InitAction::SpawnSiblings => {
            // Emitted exactly once, at boot.
            warn!("[Init] SpawnSiblings action outside boot ignored");
        }
        InitAction::ApplyConfig { config, host } => {
            queues.ctrl.send(Msg::NodeConfigSet(config.clone()));
            queues.diag.send(Msg::NodeConfigSet(config));
            queues.comm_tx.send(Msg::CommTxConfigSet { host });
        }
        InitAction::ResetConfig => {
            queues.ctrl.send(Msg::NodeConfigReset);
            queues.diag.send(Msg::NodeConfigReset);
            queues.comm_tx.send(Msg::CommTxConfigReset);
        }
    }
}

/// Init task: boots the siblings, then feeds host messages to the
/// configuration machine.
pub fn run(ctx: InitCtx, siblings: SiblingReceivers, rx: Receiver<Msg>) {
    info!("[Init] Task started");

    let mut machine = InitMachine::new();
    let mut siblings = Some(siblings);
    for action in machine.start() {
        match action {
            InitAction::SpawnSiblings => {
                if let Some(receivers) = siblings.take() {
                    spawn_siblings(&ctx, receivers);
                }
            }
            other => apply(other, &ctx.queues),
        }
    }

    loop {
        match rx.recv() {
            Err(_) => break,
            Ok(Msg::Shutdown) => break,
            Ok(Msg::External(message)) => match machine.process_message(&message) {
                Ok(actions) => {
                    for action in actions {
                        apply(action, &ctx.queues);
                    }
                }
                Err(e) => {
                    error!("[Init] {e}");
                    process::exit(e.exit_code());
                }
            },
            Ok(other) => {
                warn!("[Init] Unattended message {other:?} ignored");
            }
        }
    }
    info!("[Init] Task stopped");
}
