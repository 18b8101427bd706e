use crate::hal::DixlError;
use crate::message::{ExtBody, ExtMessage, NodeConfig};
use crate::types::{CONFIG_MAX_ROUTES, NodeId, NodeType, Route};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::convert::TryFrom;
use log::{error, info, warn};

/// States of the configuration machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Pre-start placeholder; receiving input here is fatal.
    Dummy,
    /// Boot: the sibling task set is being spawned.
    Init,
    /// Waiting for the start of a configuration.
    Idle,
    /// Receiving the route sequence 1..N.
    Configuring,
    /// A configuration is installed; only a reset is accepted.
    Configured,
}

/// Effect requested by the machine; the Init task performs it.
#[derive(Debug, Clone)]
pub enum InitAction {
    /// Spawn the sibling tasks, in the fixed dependency order.
    SpawnSiblings,
    /// Hand the validated configuration to Ctrl and Diag, and the host
    /// address to CommTx.
    ApplyConfig { config: NodeConfig, host: NodeId },
    /// Revoke the configuration from Ctrl, Diag and CommTx.
    ResetConfig,
}

/// Init FSM: boots the task set, then ingests host configurations.
///
/// A configuration is a sequence-numbered burst: sequence 0 carries the node
/// type and the total N, sequences 1..N carry one route each. Any gap,
/// total mismatch or reset discards the partial state and returns to Idle;
/// malformed input is never fatal.
pub struct InitMachine {
    state: InitState,
    host: NodeId,
    node_type_raw: u8,
    total_segments: u32,
    next_sequence: u32,
    routes: Vec<Route>,
}

impl InitMachine {
    pub fn new() -> Self {
        InitMachine {
            state: InitState::Dummy,
            host: NodeId::NULL,
            node_type_raw: 0,
            total_segments: 0,
            next_sequence: 1,
            routes: Vec::new(),
        }
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    /// Runs the boot transition: siblings spawned, then Idle.
    pub fn start(&mut self) -> Vec<InitAction> {
        self.state = InitState::Init;
        let actions = alloc::vec![InitAction::SpawnSiblings];
        self.enter_idle();
        info!("[Init] FSM initialized");
        actions
    }

    /// Idle entry: accumulated configuration cleared.
    fn enter_idle(&mut self) {
        self.state = InitState::Idle;
        self.host = NodeId::NULL;
        self.node_type_raw = 0;
        self.total_segments = 0;
        self.next_sequence = 1;
        self.routes.clear();
        info!("[Init] CONFIG cleaned");
    }

    /// Validates the complete configuration and produces the apply action,
    /// or falls back to Idle.
    fn enter_configured(&mut self) -> Vec<InitAction> {
        let node_type = match NodeType::try_from(self.node_type_raw) {
            Ok(node_type) => node_type,
            Err(_) => {
                error!("[Init] Wrong CONFIG node type ({}): going back to Idle state", self.node_type_raw);
                self.enter_idle();
                return Vec::new();
            }
        };
        if self.total_segments == 0 {
            error!("[Init] Wrong CONFIG number of segments (0): going back to Idle state");
            self.enter_idle();
            return Vec::new();
        }

        self.state = InitState::Configured;
        let config = NodeConfig {
            node_type,
            routes: Arc::new(core::mem::take(&mut self.routes)),
        };
        info!(
            "[Init] Node configured for {} logic with {} route(s)",
            match node_type {
                NodeType::Point => "Point",
                NodeType::TrackCircuit => "Track Circuit",
            },
            config.routes.len()
        );
        alloc::vec![InitAction::ApplyConfig { config, host: self.host }]
    }

    /// Offers one inbound message.
    ///
    /// `Err(FsmWrongState)` is returned only for input before [`start`],
    /// which is fatal for the Init task.
    ///
    /// [`start`]: InitMachine::start
    pub fn process_message(&mut self, message: &ExtMessage) -> Result<Vec<InitAction>, DixlError> {
        match self.state {
            InitState::Dummy | InitState::Init => {
                error!("[Init] Wrong state {:?}: message received", self.state);
                Err(DixlError::FsmWrongState)
            }

            InitState::Idle => {
                match message.body {
                    ExtBody::NodeConfigType { total_segments, node_type } => {
                        // The "config type" header opens a configuration.
                        self.state = InitState::Configuring;
                        self.host = message.source;
                        self.node_type_raw = node_type;
                        self.total_segments = total_segments;
                        self.next_sequence = 1;
                        self.routes.clear();
                        info!(
                            "[Init] Received CONFIG NodeType {}, Total routes {}",
                            node_type, total_segments
                        );
                        if total_segments == 0 {
                            // No route records will follow; validate at once.
                            return Ok(self.enter_configured());
                        }
                        Ok(Vec::new())
                    }
                    _ => {
                        warn!("[Init] Idle: discarding message");
                        Ok(Vec::new())
                    }
                }
            }

            InitState::Configuring => match message.body {
                ExtBody::NodeConfigRoute { sequence, total_segments, route } => {
                    if sequence != self.next_sequence
                        || total_segments != self.total_segments
                        || self.routes.len() >= CONFIG_MAX_ROUTES
                    {
                        warn!("[Init] Wrong CONFIG sequence going back to idle state");
                        self.enter_idle();
                        return Ok(Vec::new());
                    }
                    self.routes.push(route);
                    self.next_sequence += 1;
                    info!(
                        "[Init] Received CONFIG route {} of {}",
                        sequence, self.total_segments
                    );
                    if sequence == self.total_segments {
                        return Ok(self.enter_configured());
                    }
                    Ok(Vec::new())
                }
                ExtBody::NodeConfigType { .. } => {
                    // A new header in the middle of a burst is a sequence
                    // error like any other.
                    warn!("[Init] Wrong CONFIG sequence going back to idle state");
                    self.enter_idle();
                    Ok(Vec::new())
                }
                ExtBody::NodeReset => {
                    info!("[Init] RESET received while configuring");
                    self.enter_idle();
                    Ok(Vec::new())
                }
                _ => {
                    warn!("[Init] Configuring: discarding message");
                    Ok(Vec::new())
                }
            },

            InitState::Configured => match message.body {
                ExtBody::NodeReset => {
                    info!("[Init] RESET received, configuration revoked");
                    self.enter_idle();
                    Ok(alloc::vec![InitAction::ResetConfig])
                }
                _ => {
                    warn!("[Init] Configured: discarding message");
                    Ok(Vec::new())
                }
            },
        }
    }
}

impl Default for InitMachine {
    fn default() -> Self {
        Self::new()
    }
}
