//! The per-link solver interface and the link trait.

use serde::{Deserialize, Serialize};

use crate::node::NodeList;

/// Upper bound on any admittance written into the system of equations.
pub const CONDUCTANCE_LIMIT: f64 = 1.0e15;

/// Flow direction tag per port, consumed by the solver's flow orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PortDirection {
    #[default]
    None,
    Source,
    Sink,
}

/// State machine for operator-commanded port rebinding.
///
/// A rebind is requested by setting `port`/`node` and the `Execute` state
/// (or `Ground` to park the port on the vacuum node); the owning link
/// evaluates it once per step, returning to `Ready` on success or latching
/// `Failed` when the link's port rules reject the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PortCommandState {
    #[default]
    Ready,
    Execute,
    Ground,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PortCommand {
    pub state: PortCommandState,
    pub port: usize,
    pub node: usize,
}

impl PortCommand {
    pub fn request_execute(&mut self, port: usize, node: usize) {
        self.port = port;
        self.node = node;
        self.state = PortCommandState::Execute;
    }

    pub fn request_ground(&mut self, port: usize) {
        self.port = port;
        self.state = PortCommandState::Ground;
    }
}

/// Solver-facing data block owned by every link.
///
/// The link writes the admittance matrix and source vector during `step`;
/// the solver writes the potential vector before `compute_flows`; flow
/// summaries land here during `compute_flows`/`transport_flows`.
#[derive(Debug, Clone)]
pub struct LinkIo {
    pub admittance_matrix: Vec<f64>,
    pub source_vector: Vec<f64>,
    pub potential_vector: Vec<f64>,
    pub port_directions: Vec<PortDirection>,
    /// Raised when an admittance entry changed, so the solver can skip
    /// refactoring an unchanged matrix.
    pub admittance_update: bool,
    /// Molar flow rate [kmol/s].
    pub flux: f64,
    /// Mass flow rate [kg/s].
    pub flow_rate: f64,
    /// Volumetric flow rate [m3/s].
    pub vol_flow_rate: f64,
    /// Hydraulic or thermal power [W], link-specific meaning.
    pub power: f64,
    /// Pressure drop across the link [kPa], where meaningful.
    pub potential_drop: f64,
    pub port_command: PortCommand,
}

impl LinkIo {
    pub fn new(num_ports: usize) -> Self {
        Self {
            admittance_matrix: vec![0.0; num_ports * num_ports],
            source_vector: vec![0.0; num_ports],
            potential_vector: vec![0.0; num_ports],
            port_directions: vec![PortDirection::None; num_ports],
            admittance_update: false,
            flux: 0.0,
            flow_rate: 0.0,
            vol_flow_rate: 0.0,
            power: 0.0,
            potential_drop: 0.0,
            port_command: PortCommand::default(),
        }
    }

    pub fn num_ports(&self) -> usize {
        self.source_vector.len()
    }
}

/// One link of the fluid network.
///
/// The solver drives each tick as: `step` (all links), linear solve,
/// `compute_flows` (all links), `transport_flows` (all links), node
/// integration. Construction validates config and port rules; a link that
/// fails construction never joins the network.
pub trait FluidLink {
    fn name(&self) -> &str;

    fn io(&self) -> &LinkIo;

    fn io_mut(&mut self) -> &mut LinkIo;

    fn port_map(&self) -> &[usize];

    fn port_map_mut(&mut self) -> &mut [usize];

    /// Assemble this link's admittance and source contributions.
    fn step(&mut self, nodes: &mut NodeList, dt: f64);

    /// Derive flows from the solved potentials and tag port directions.
    fn compute_flows(&mut self, nodes: &mut NodeList, dt: f64);

    /// Move fluid and heat between the link and its nodes.
    fn transport_flows(&mut self, nodes: &mut NodeList, dt: f64);

    /// Reset non-config, non-checkpointed state after a checkpoint load.
    fn restart(&mut self) {}

    /// Link-specific port assignment rules.
    fn check_specific_port_rules(&self, nodes: &NodeList, port: usize, node: usize) -> bool;

    /// Evaluate a pending operator port-rebind request. Rare slow path; the
    /// links that support rebinding call this once at the top of `step`.
    fn process_port_command(&mut self, nodes: &NodeList) {
        let cmd = self.io().port_command;
        match cmd.state {
            PortCommandState::Execute => {
                let ok = cmd.port < self.port_map().len()
                    && cmd.node < nodes.len()
                    && self.check_specific_port_rules(nodes, cmd.port, cmd.node);
                if ok {
                    self.port_map_mut()[cmd.port] = cmd.node;
                    self.io_mut().port_command.state = PortCommandState::Ready;
                } else {
                    tracing::warn!(
                        link = %self.name(),
                        port = cmd.port,
                        node = cmd.node,
                        "port rebind rejected by port rules"
                    );
                    self.io_mut().port_command.state = PortCommandState::Failed;
                }
            }
            PortCommandState::Ground => {
                if cmd.port < self.port_map().len() {
                    let ground = nodes.ground();
                    self.port_map_mut()[cmd.port] = ground;
                    self.io_mut().port_command.state = PortCommandState::Ready;
                } else {
                    self.io_mut().port_command.state = PortCommandState::Failed;
                }
            }
            PortCommandState::Ready | PortCommandState::Failed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeList};
    use nd_fluids::{Composition, Fluid, Species};

    struct Stub {
        io: LinkIo,
        ports: Vec<usize>,
        allow: bool,
    }

    impl FluidLink for Stub {
        fn name(&self) -> &str {
            "stub"
        }
        fn io(&self) -> &LinkIo {
            &self.io
        }
        fn io_mut(&mut self) -> &mut LinkIo {
            &mut self.io
        }
        fn port_map(&self) -> &[usize] {
            &self.ports
        }
        fn port_map_mut(&mut self) -> &mut [usize] {
            &mut self.ports
        }
        fn step(&mut self, _nodes: &mut NodeList, _dt: f64) {}
        fn compute_flows(&mut self, _nodes: &mut NodeList, _dt: f64) {}
        fn transport_flows(&mut self, _nodes: &mut NodeList, _dt: f64) {}
        fn check_specific_port_rules(&self, _n: &NodeList, _p: usize, _nd: usize) -> bool {
            self.allow
        }
    }

    fn nodes() -> NodeList {
        let fluid = Fluid::new(Composition::pure(Species::N2), 300.0, 100.0);
        NodeList::new(vec![Node::new(100.0, fluid.clone()), Node::new(100.0, fluid)])
    }

    #[test]
    fn io_sized_by_ports() {
        let io = LinkIo::new(2);
        assert_eq!(io.admittance_matrix.len(), 4);
        assert_eq!(io.source_vector.len(), 2);
        assert_eq!(io.num_ports(), 2);
    }

    #[test]
    fn execute_applies_when_rules_pass() {
        let nodes = nodes();
        let mut link = Stub {
            io: LinkIo::new(2),
            ports: vec![0, 1],
            allow: true,
        };
        link.io.port_command.request_execute(1, 0);
        link.process_port_command(&nodes);
        assert_eq!(link.ports[1], 0);
        assert_eq!(link.io.port_command.state, PortCommandState::Ready);
    }

    #[test]
    fn execute_latches_failed_when_rules_reject() {
        let nodes = nodes();
        let mut link = Stub {
            io: LinkIo::new(2),
            ports: vec![0, 1],
            allow: false,
        };
        link.io.port_command.request_execute(1, 0);
        link.process_port_command(&nodes);
        assert_eq!(link.ports[1], 1);
        assert_eq!(link.io.port_command.state, PortCommandState::Failed);
    }

    #[test]
    fn ground_command_maps_to_vacuum() {
        let nodes = nodes();
        let mut link = Stub {
            io: LinkIo::new(2),
            ports: vec![0, 1],
            allow: true,
        };
        link.io.port_command.request_ground(0);
        link.process_port_command(&nodes);
        assert_eq!(link.ports[0], nodes.ground());
        assert_eq!(link.io.port_command.state, PortCommandState::Ready);
    }
}
