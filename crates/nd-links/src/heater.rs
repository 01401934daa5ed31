//! Heat injection between two nodes without fluid flow.

use crate::error::{LinkError, LinkResult};
use nd_core::is_in_range;
use nd_network::{FluidLink, LinkIo, NodeList, PortDirection};

#[derive(Debug, Clone)]
pub struct HeaterConfig {
    /// Fraction of consumed power that reaches the fluid.
    pub efficiency: f64,
}

#[derive(Debug, Clone)]
pub struct HeaterInput {
    pub malf_blockage_flag: bool,
    pub malf_blockage_value: f64,
    /// Initial consumed electrical power [W].
    pub heater_power: f64,
}

/// Two-port heat-only link: removes `heat_flux` from port 0 and deposits it
/// on port 1. It never participates in the pressure solution; the coupling
/// between this heat and node pressures is handled by capacitive links on
/// the nodes in later passes.
#[derive(Debug)]
pub struct Heater {
    name: String,
    io: LinkIo,
    ports: Vec<usize>,
    efficiency: f64,
    heater_power: f64,
    heat_flux: f64,
    pub malf_blockage_flag: bool,
    pub malf_blockage_value: f64,
}

impl Heater {
    pub fn new(
        name: &str,
        config: &HeaterConfig,
        input: &HeaterInput,
        nodes: &NodeList,
        port0: usize,
        port1: usize,
    ) -> LinkResult<Self> {
        if !is_in_range(0.0, config.efficiency, 1.0) {
            return Err(LinkError::InvalidConfig {
                link: name.to_string(),
                rule: "heater efficiency not between 0 and 1",
            });
        }
        if port0 >= nodes.len() || port1 >= nodes.len() {
            return Err(LinkError::InvalidConfig {
                link: name.to_string(),
                rule: "port assignment out of bounds",
            });
        }
        Ok(Self {
            name: name.to_string(),
            io: LinkIo::new(2),
            ports: vec![port0, port1],
            efficiency: config.efficiency,
            heater_power: input.heater_power,
            heat_flux: 0.0,
            malf_blockage_flag: input.malf_blockage_flag,
            malf_blockage_value: input.malf_blockage_value,
        })
    }

    pub fn set_heater_power(&mut self, power_w: f64) {
        self.heater_power = power_w;
    }

    pub fn heat_flux(&self) -> f64 {
        self.heat_flux
    }
}

impl FluidLink for Heater {
    fn name(&self) -> &str {
        &self.name
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

    fn step(&mut self, nodes: &mut NodeList, _dt: f64) {
        self.process_port_command(nodes);

        self.heat_flux = self.heater_power * self.efficiency;
        if self.malf_blockage_flag {
            self.heat_flux *= 1.0 - self.malf_blockage_value;
        }

        // Zero the contributions every pass so stale values can never leak
        // into the network system of equations.
        self.io.admittance_update = false;
        for entry in self.io.admittance_matrix.iter_mut() {
            *entry = 0.0;
        }
        for entry in self.io.source_vector.iter_mut() {
            *entry = 0.0;
        }
    }

    fn compute_flows(&mut self, _nodes: &mut NodeList, _dt: f64) {
        // This link depends on no node state; directions are always none.
        self.io.port_directions[0] = PortDirection::None;
        self.io.port_directions[1] = PortDirection::None;
    }

    fn transport_flows(&mut self, nodes: &mut NodeList, _dt: f64) {
        nodes.node_mut(self.ports[0]).collect_heat_flux(-self.heat_flux);
        nodes.node_mut(self.ports[1]).collect_heat_flux(self.heat_flux);
    }

    fn check_specific_port_rules(&self, _nodes: &NodeList, _port: usize, _node: usize) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_fluids::{Composition, Fluid, Species};
    use nd_network::Node;

    fn network() -> NodeList {
        let mut fluid = Fluid::new(Composition::pure(Species::N2), 300.0, 101.325);
        fluid.set_mass(1.0);
        NodeList::new(vec![
            Node::new(101.325, fluid.clone()),
            Node::new(101.325, fluid),
        ])
    }

    fn make(efficiency: f64, power: f64) -> (Heater, NodeList) {
        let nodes = network();
        let heater = Heater::new(
            "heater",
            &HeaterConfig { efficiency },
            &HeaterInput {
                malf_blockage_flag: false,
                malf_blockage_value: 0.0,
                heater_power: power,
            },
            &nodes,
            0,
            1,
        )
        .unwrap();
        (heater, nodes)
    }

    #[test]
    fn efficiency_validated() {
        let nodes = network();
        for bad in [-0.1, 1.1] {
            assert!(
                Heater::new(
                    "heater",
                    &HeaterConfig { efficiency: bad },
                    &HeaterInput {
                        malf_blockage_flag: false,
                        malf_blockage_value: 0.0,
                        heater_power: 0.0,
                    },
                    &nodes,
                    0,
                    1,
                )
                .is_err()
            );
        }
    }

    #[test]
    fn heat_flux_scaled_by_efficiency_and_blockage() {
        let (mut heater, mut nodes) = make(0.8, 1000.0);
        heater.step(&mut nodes, 0.1);
        assert!((heater.heat_flux() - 800.0).abs() < 1e-12);

        heater.malf_blockage_flag = true;
        heater.malf_blockage_value = 0.5;
        heater.step(&mut nodes, 0.1);
        assert!((heater.heat_flux() - 400.0).abs() < 1e-12);
    }

    #[test]
    fn never_contributes_to_the_linear_system() {
        let (mut heater, mut nodes) = make(1.0, 500.0);
        // Poison the contributions, then step.
        heater.io_mut().admittance_matrix[0] = 5.0;
        heater.io_mut().source_vector[1] = 7.0;
        heater.step(&mut nodes, 0.1);
        assert!(heater.io().admittance_matrix.iter().all(|&a| a == 0.0));
        assert!(heater.io().source_vector.iter().all(|&s| s == 0.0));
        assert!(!heater.io().admittance_update);
        heater.compute_flows(&mut nodes, 0.1);
        assert_eq!(heater.io().port_directions[0], PortDirection::None);
        assert_eq!(heater.io().port_directions[1], PortDirection::None);
    }

    #[test]
    fn transport_moves_heat_between_ports() {
        let (mut heater, mut nodes) = make(1.0, 1040.0);
        heater.step(&mut nodes, 0.1);
        heater.transport_flows(&mut nodes, 0.1);
        assert!((nodes.node(0).collected_heat_flux() + 1040.0).abs() < 1e-12);
        assert!((nodes.node(1).collected_heat_flux() - 1040.0).abs() < 1e-12);
        // One second of 1040 W into 1 kg of N2 is one kelvin.
        nodes.node_mut(1).integrate_flows(1.0);
        assert!((nodes.node(1).content().temperature() - 301.0).abs() < 1e-6);
    }
}
