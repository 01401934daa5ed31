//! Selective-species evaporation between a liquid pool and a gas node.
//!
//! Port 0 is the liquid pool node, port 1 the gas node; either may be
//! ground. The pool itself lives in an accumulator this link holds a shared
//! handle to: each step it samples the pool's usable mass and writes the gas
//! total pressure back into the accumulator's spring coefficients, which is
//! how the evaporation interface drives the pool's equilibrium pressure.
//! There is no condensation path; the vapor potential is floored at zero.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::accumulator::Accumulator;
use crate::error::{LinkError, LinkResult};
use nd_core::{FLOW_EPSILON, is_in_range, limit_range};
use nd_fluids::{Composition, Fluid, Phase, PropertyCatalog, Species};
use nd_network::{FluidLink, LinkIo, NodeList, PortDirection};

/// Spring linear term written into the pool accumulator: large enough for
/// the bellows to pressurize the liquid, small enough not to bias the
/// desired pressure.
const SPRING_COEFF_1: f64 = 1.0e-6;

#[derive(Debug, Clone)]
pub struct EvaporationConfig {
    /// Gas species the liquid phase changes into.
    pub gas_type: Species,
    /// Evaporation rate coefficient [kg/s/kPa per kg^exponent].
    pub evaporation_coeff: f64,
    /// Exponent on the pool-mass contribution to the rate.
    pub pool_mass_exponent: f64,
}

#[derive(Debug, Clone)]
pub struct EvaporationInput {
    pub malf_blockage_flag: bool,
    pub malf_blockage_value: f64,
    /// Initial gas-side total pressure [kPa].
    pub gas_total_pressure: f64,
    /// Initial vapor potential [kPa]; used whenever the gas port is ground.
    pub vapor_potential: f64,
    /// Initial evaporation mass rate [kg/s].
    pub evaporation_rate: f64,
}

pub struct EvaporationLink {
    name: String,
    io: LinkIo,
    ports: Vec<usize>,

    gas_type: Species,
    evaporation_coeff: f64,
    pool_mass_exponent: f64,
    /// Non-owning handle to the accumulator modeling the liquid pool.
    pool: Option<Rc<RefCell<Accumulator>>>,
    catalog: Arc<PropertyCatalog>,

    pub malf_blockage_flag: bool,
    pub malf_blockage_value: f64,

    gas_total_pressure: f64,
    gas_mweight: f64,
    evaporation_fluid: Option<Fluid>,
    liquid_pool_mass: f64,
}

impl EvaporationLink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        config: &EvaporationConfig,
        input: &EvaporationInput,
        pool: Option<Rc<RefCell<Accumulator>>>,
        catalog: Arc<PropertyCatalog>,
        nodes: &NodeList,
        port0: usize,
        port1: usize,
    ) -> LinkResult<Self> {
        validate(name, config, input, &catalog, nodes, port1)?;

        let gas_mweight = config.gas_type.molar_mass();
        let mut link = Self {
            name: name.to_string(),
            io: LinkIo::new(2),
            ports: vec![port0, port1],
            gas_type: config.gas_type,
            evaporation_coeff: config.evaporation_coeff,
            pool_mass_exponent: config.pool_mass_exponent,
            pool,
            catalog,
            malf_blockage_flag: input.malf_blockage_flag,
            malf_blockage_value: input.malf_blockage_value,
            gas_total_pressure: input.gas_total_pressure,
            gas_mweight,
            evaporation_fluid: None,
            liquid_pool_mass: 0.0,
        };

        for (port, node) in [(0usize, port0), (1usize, port1)] {
            if node >= nodes.len() || !link.check_specific_port_rules(nodes, port, node) {
                return Err(LinkError::InvalidConfig {
                    link: name.to_string(),
                    rule: "port assignment violates evaporation port rules",
                });
            }
        }

        link.io.potential_drop = input.vapor_potential;
        link.io.flow_rate = input.evaporation_rate;
        // Divide by zero prevented by the gas type validation.
        link.io.flux = input.evaporation_rate / gas_mweight;

        if !nodes.is_ground(port1) {
            // A pure sample of the evaporating gas, delivered at the gas
            // node temperature during transport.
            let mut fluid = Fluid::new(
                Composition::pure(config.gas_type),
                nodes.node(port0).content().temperature(),
                input.gas_total_pressure.max(f64::EPSILON),
            );
            fluid.set_mass(0.0);
            link.evaporation_fluid = Some(fluid);
        }

        Ok(link)
    }

    pub fn vapor_potential(&self) -> f64 {
        self.io.potential_drop
    }

    pub fn evaporation_rate(&self) -> f64 {
        self.io.flow_rate
    }

    pub fn gas_total_pressure(&self) -> f64 {
        self.gas_total_pressure
    }

    pub fn liquid_pool_mass(&self) -> f64 {
        self.liquid_pool_mass
    }

    /// Vapor potential: saturation pressure at the gas node temperature
    /// minus the species partial pressure there. With the gas port on
    /// ground the init/interface value is used instead.
    fn update_vapor_potential(&mut self, nodes: &NodeList) {
        let gas_port = self.ports[1];
        if !nodes.is_ground(gas_port) {
            let content = nodes.node(gas_port).content();
            let partial_p =
                self.io.potential_vector[1] * content.mole_fraction(self.gas_type);
            if let Ok(saturation_p) = self
                .catalog
                .saturation_pressure(self.gas_type, content.temperature())
            {
                self.io.potential_drop = saturation_p - partial_p;
            }
        }
    }

    /// Evaporation mass rate from the pool interface. With the liquid port
    /// on ground (or no pool handle) the rate is left to the init/interface
    /// value.
    fn update_vapor_rate(&mut self, nodes: &NodeList, dt: f64) {
        let liquid_port = self.ports[0];
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        if nodes.is_ground(liquid_port) {
            return;
        }

        {
            let mut accum = pool.borrow_mut();
            self.liquid_pool_mass = accum.usable_mass();
            accum.set_spring_coeffs(self.gas_total_pressure, SPRING_COEFF_1, 0.0);
        }

        let mut evaporation_rate = 0.0;
        let liq_mweight = nodes.node(liquid_port).content().mweight();

        if self.gas_mweight > f64::EPSILON
            && liq_mweight > f64::EPSILON
            && dt > f64::EPSILON
            && self.liquid_pool_mass > f32::EPSILON as f64
        {
            // No condensation: the potential is floored at zero.
            let mut mdot_gas = self.io.potential_drop.max(0.0)
                * self.evaporation_coeff
                * self.liquid_pool_mass.powf(self.pool_mass_exponent);
            if self.malf_blockage_flag {
                mdot_gas *= 1.0 - limit_range(0.0, self.malf_blockage_value, 1.0);
            }

            // Limit to the available liquid; the molecular weight ratio
            // covers an evaporating species in solution, where only a
            // fraction of the pool can evaporate.
            let mdot_liq = (mdot_gas * liq_mweight / self.gas_mweight)
                .min(self.liquid_pool_mass / dt);
            evaporation_rate = mdot_liq * self.gas_mweight / liq_mweight;
        }
        self.io.flow_rate = evaporation_rate;
    }

    /// Heat of evaporation [W] drawn at the gas node temperature.
    fn update_power(&mut self, nodes: &NodeList) {
        let gas_port = self.ports[1];
        if !nodes.is_ground(gas_port) {
            if let Ok(hvap) = self.catalog.heat_of_vaporization(
                self.gas_type,
                nodes.node(gas_port).content().temperature(),
            ) {
                self.io.power = hvap * 1.0e3 * self.io.flow_rate;
            }
        }
    }
}

impl FluidLink for EvaporationLink {
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

    fn step(&mut self, nodes: &mut NodeList, dt: f64) {
        self.process_port_command(nodes);

        self.update_vapor_potential(nodes);
        self.update_vapor_rate(nodes, dt);
        self.update_power(nodes);

        self.io.flux = self.io.flow_rate / self.gas_mweight.max(f64::EPSILON);
        self.io.source_vector[0] = -self.io.flux;
        self.io.source_vector[1] = self.io.flux;
    }

    fn compute_flows(&mut self, nodes: &mut NodeList, _dt: f64) {
        if self.io.flux > f64::EPSILON {
            self.io.port_directions[0] = PortDirection::Source;
            self.io.port_directions[1] = PortDirection::Sink;
            nodes.node_mut(self.ports[0]).schedule_outflux(self.io.flux);
        } else if self.io.flux < -f64::EPSILON {
            self.io.port_directions[0] = PortDirection::Sink;
            self.io.port_directions[1] = PortDirection::Source;
            nodes.node_mut(self.ports[1]).schedule_outflux(-self.io.flux);
        } else {
            self.io.port_directions[0] = PortDirection::None;
            self.io.port_directions[1] = PortDirection::None;
        }
    }

    fn transport_flows(&mut self, nodes: &mut NodeList, _dt: f64) {
        let liquid_port = self.ports[0];
        let gas_port = self.ports[1];

        if !nodes.is_ground(gas_port) {
            // True volumetric rate of the evaporating gas at the vent.
            let evap_density = nodes.node(gas_port).outflow().density()
                * nodes.node(gas_port).outflow().mass_fraction(self.gas_type);
            if evap_density > f64::EPSILON {
                self.io.vol_flow_rate = self.io.flow_rate / evap_density;
            } else {
                self.io.vol_flow_rate = 0.0;
            }
            self.gas_total_pressure = self.io.potential_vector[1];
        }

        if self.io.flow_rate > FLOW_EPSILON {
            if !nodes.is_ground(gas_port) {
                if let Some(fluid) = self.evaporation_fluid.as_mut() {
                    // Evaporated flow arrives at the gas node temperature.
                    fluid.set_temperature(nodes.node(gas_port).outflow().temperature());
                    let sample = fluid.clone();
                    nodes
                        .node_mut(gas_port)
                        .collect_influx(self.io.flow_rate, &sample);
                }
            }
            if !nodes.is_ground(liquid_port) {
                let liq_flow_rate = self.io.flux * nodes.node(liquid_port).outflow().mweight();
                nodes.node_mut(liquid_port).collect_outflux(liq_flow_rate);
            }
        }
    }

    fn restart(&mut self) {
        self.liquid_pool_mass = 0.0;
    }

    /// Port 0 must be a liquid node (with a pool handle) or ground; port 1
    /// must be a gas node or ground.
    fn check_specific_port_rules(&self, nodes: &NodeList, port: usize, node: usize) -> bool {
        let mut result = true;
        if port == 0 && !nodes.is_ground(node) {
            if nodes.node(node).content().phase() != Phase::Liquid {
                tracing::warn!(
                    link = %self.name,
                    "aborted setting a port: cannot assign port 0 to a gas node"
                );
                result = false;
            }
            if self.pool.is_none() {
                tracing::warn!(
                    link = %self.name,
                    "aborted setting a port: port 0 requires a liquid pool accumulator handle"
                );
                result = false;
            }
        } else if port == 1
            && !nodes.is_ground(node)
            && nodes.node(node).content().phase() != Phase::Gas
        {
            tracing::warn!(
                link = %self.name,
                "aborted setting a port: cannot assign port 1 to a liquid node"
            );
            result = false;
        }
        result
    }
}

fn validate(
    name: &str,
    config: &EvaporationConfig,
    input: &EvaporationInput,
    catalog: &PropertyCatalog,
    nodes: &NodeList,
    port1: usize,
) -> LinkResult<()> {
    let invalid = |rule: &'static str| LinkError::InvalidConfig {
        link: name.to_string(),
        rule,
    };
    if !is_in_range(-10.0, config.pool_mass_exponent, 10.0) {
        return Err(invalid("pool mass exponent outside of (-10, 10)"));
    }
    if config.evaporation_coeff < 0.0 {
        return Err(invalid("evaporation coefficient < 0"));
    }
    if config.gas_type.phase() != Phase::Gas {
        return Err(invalid("gas type is not a gas-phase species"));
    }
    if catalog
        .saturation_pressure(config.gas_type, 300.0)
        .is_err()
    {
        return Err(invalid("gas type has no saturation data"));
    }
    if !nodes.is_ground(port1) && !nodes.node(port1).content().composition().contains(config.gas_type) {
        return Err(invalid("gas type is not in the gas node species list"));
    }
    if input.gas_total_pressure < 0.0 {
        return Err(LinkError::InvalidInput {
            link: name.to_string(),
            rule: "gas total pressure < 0",
        });
    }
    if input.vapor_potential < 0.0 {
        return Err(LinkError::InvalidInput {
            link: name.to_string(),
            rule: "vapor potential < 0",
        });
    }
    if input.evaporation_rate < 0.0 {
        return Err(LinkError::InvalidInput {
            link: name.to_string(),
            rule: "evaporation rate < 0",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{AccumulatorConfig, AccumulatorInput};
    use nd_fluids::FluidInput;
    use nd_network::Node;

    fn config() -> EvaporationConfig {
        EvaporationConfig {
            gas_type: Species::WaterVapor,
            evaporation_coeff: 1.0e-4,
            pool_mass_exponent: 0.1,
        }
    }

    fn input() -> EvaporationInput {
        EvaporationInput {
            malf_blockage_flag: false,
            malf_blockage_value: 0.0,
            gas_total_pressure: 101.325,
            vapor_potential: 1.0e-4,
            evaporation_rate: 0.0,
        }
    }

    fn network() -> NodeList {
        let mut liquid = Fluid::new(Composition::pure(Species::Water), 294.0, 101.325);
        liquid.set_mass(100.0);
        let mut gas = Fluid::new(
            Composition::new_mole_fractions(vec![
                (Species::N2, 0.98),
                (Species::WaterVapor, 0.02),
            ])
            .unwrap(),
            294.0,
            101.325,
        );
        gas.set_mass(1.0);
        NodeList::new(vec![Node::new(101.325, liquid), Node::new(101.325, gas)])
    }

    fn pool(nodes: &NodeList) -> Rc<RefCell<Accumulator>> {
        let config = AccumulatorConfig {
            max_conductance: 1.0,
            min_conductance_scale: 0.1,
            accum_volume: 0.1,
            min_chamber_vol_pct: 10.0,
            min_deadband_vol_pct: 15.0,
            force_bellows_max_rate: 1.0 / 60.0,
            edit_hold_time: 5.0,
            min_temperature: 274.0,
            max_temperature: 373.0,
            max_pressure: 600.0,
            spring_coeff_0: 0.0,
            spring_coeff_1: 1.0e-6,
            spring_coeff_2: 0.0,
            fill_mode_pressure_threshold: 0.0,
            eff_cond_scale_one_way_rate: 0.0,
        };
        let input = AccumulatorInput {
            initial_bellows_position: 0.5,
            liquid_fluid: Some(FluidInput::new(294.0, 101.325, vec![(Species::Water, 1.0)])),
            gas_fluid: None,
        };
        Rc::new(RefCell::new(
            Accumulator::new_spring("pool", &config, &input, nodes, nodes.ground(), 0).unwrap(),
        ))
    }

    fn catalog() -> Arc<PropertyCatalog> {
        Arc::new(PropertyCatalog::new().unwrap())
    }

    #[test]
    fn validation_rejects_bad_config() {
        let nodes = network();
        let accum = pool(&nodes);

        let mut bad = config();
        bad.pool_mass_exponent = 11.0;
        assert!(
            EvaporationLink::new("evap", &bad, &input(), Some(accum.clone()), catalog(), &nodes, 0, 1)
                .is_err()
        );
        let mut bad = config();
        bad.evaporation_coeff = -1.0;
        assert!(
            EvaporationLink::new("evap", &bad, &input(), Some(accum.clone()), catalog(), &nodes, 0, 1)
                .is_err()
        );
        let mut bad = config();
        bad.gas_type = Species::Water;
        assert!(
            EvaporationLink::new("evap", &bad, &input(), Some(accum.clone()), catalog(), &nodes, 0, 1)
                .is_err()
        );
        let mut bad = config();
        bad.gas_type = Species::N2;
        assert!(
            EvaporationLink::new("evap", &bad, &input(), Some(accum.clone()), catalog(), &nodes, 0, 1)
                .is_err()
        );
        let mut bad_input = input();
        bad_input.vapor_potential = -1.0;
        assert!(
            EvaporationLink::new("evap", &config(), &bad_input, Some(accum.clone()), catalog(), &nodes, 0, 1)
                .is_err()
        );
        // Liquid port without a pool handle is rejected.
        assert!(
            EvaporationLink::new("evap", &config(), &input(), None, catalog(), &nodes, 0, 1)
                .is_err()
        );
    }

    #[test]
    fn drives_accumulator_spring_and_computes_rate() {
        // The gas port is ground, so the vapor potential and total
        // pressure come from the interface inputs.
        let nodes = network();
        let accum = pool(&nodes);
        let mut link = EvaporationLink::new(
            "evap",
            &config(),
            &input(),
            Some(accum.clone()),
            catalog(),
            &nodes,
            0,
            nodes.ground(),
        )
        .unwrap();

        let mut nodes = nodes;
        link.step(&mut nodes, 0.1);

        let coeffs = accum.borrow().spring_coeffs();
        assert_eq!(coeffs.0, 101.325);
        assert_eq!(coeffs.1, 1.0e-6);
        assert_eq!(coeffs.2, 0.0);

        let pool_mass = link.liquid_pool_mass();
        assert!(pool_mass > 0.0);
        let expected = 1.0e-4 * 1.0e-4 * pool_mass.powf(0.1);
        assert!(
            ((link.evaporation_rate() - expected) / expected).abs() < 1e-9,
            "rate {} vs {expected}",
            link.evaporation_rate()
        );
        // Source vector moves flux from the liquid to the gas port.
        let flux = link.io().flux;
        assert!(flux > 0.0);
        assert_eq!(link.io().source_vector[0], -flux);
        assert_eq!(link.io().source_vector[1], flux);
    }

    #[test]
    fn gas_node_vapor_potential_from_saturation() {
        let nodes = network();
        let accum = pool(&nodes);
        let mut link = EvaporationLink::new(
            "evap",
            &config(),
            &input(),
            Some(accum),
            catalog(),
            &nodes,
            0,
            1,
        )
        .unwrap();

        let mut nodes = nodes;
        link.io_mut().potential_vector[1] = 101.325;
        link.step(&mut nodes, 0.1);

        // p_sat(294 K) ~ 2.5 kPa against a partial pressure of ~ 2.03 kPa.
        let drop = link.vapor_potential();
        assert!(drop > 0.2 && drop < 1.0, "vapor potential = {drop}");
        // Power is the heat of vaporization at the gas temperature.
        assert!(link.io().power > 0.0);
    }

    #[test]
    fn blockage_scales_rate() {
        let nodes = network();
        let accum = pool(&nodes);
        let mut open_link = EvaporationLink::new(
            "evap",
            &config(),
            &input(),
            Some(accum.clone()),
            catalog(),
            &nodes,
            0,
            nodes.ground(),
        )
        .unwrap();
        let mut blocked_input = input();
        blocked_input.malf_blockage_flag = true;
        blocked_input.malf_blockage_value = 0.75;
        let mut blocked_link = EvaporationLink::new(
            "evap_blocked",
            &config(),
            &blocked_input,
            Some(accum),
            catalog(),
            &nodes,
            0,
            nodes.ground(),
        )
        .unwrap();

        let mut nodes = nodes;
        open_link.step(&mut nodes, 0.1);
        blocked_link.step(&mut nodes, 0.1);
        let ratio = blocked_link.evaporation_rate() / open_link.evaporation_rate();
        assert!((ratio - 0.25).abs() < 1e-9);
    }

    #[test]
    fn rate_limited_by_available_pool_mass() {
        let nodes = network();
        let accum = pool(&nodes);
        // A coefficient large enough that the pool-mass limit binds.
        let mut big = config();
        big.evaporation_coeff = 1.0e6;
        let mut link = EvaporationLink::new(
            "evap",
            &big,
            &input(),
            Some(accum.clone()),
            catalog(),
            &nodes,
            0,
            nodes.ground(),
        )
        .unwrap();

        let mut nodes = nodes;
        link.step(&mut nodes, 0.1);
        let pool_mass = link.liquid_pool_mass();
        assert!(link.evaporation_rate() <= pool_mass / 0.1 + 1e-9);
    }

    #[test]
    fn transport_moves_mass_between_nodes() {
        let nodes = network();
        let accum = pool(&nodes);
        let mut boosted = config();
        boosted.evaporation_coeff = 1.0;
        let mut link = EvaporationLink::new(
            "evap",
            &boosted,
            &input(),
            Some(accum),
            catalog(),
            &nodes,
            0,
            1,
        )
        .unwrap();

        let mut nodes = nodes;
        link.io_mut().potential_vector[1] = 101.325;
        link.step(&mut nodes, 0.1);
        assert!(link.evaporation_rate() > 0.0);
        link.compute_flows(&mut nodes, 0.1);
        assert_eq!(link.io().port_directions[0], PortDirection::Source);
        assert_eq!(link.io().port_directions[1], PortDirection::Sink);

        let gas_mass_before = nodes.node(1).content().mass();
        let liq_mass_before = nodes.node(0).content().mass();
        link.transport_flows(&mut nodes, 0.1);
        nodes.node_mut(0).integrate_flows(0.1);
        nodes.node_mut(1).integrate_flows(0.1);
        assert!(nodes.node(1).content().mass() > gas_mass_before);
        assert!(nodes.node(0).content().mass() < liq_mass_before);
        // The vapor fraction at the gas node grew.
        assert!(nodes.node(1).content().mass_fraction(Species::WaterVapor) > 0.0);
    }

    #[test]
    fn restart_clears_cached_pool_mass() {
        let nodes = network();
        let accum = pool(&nodes);
        let mut link = EvaporationLink::new(
            "evap",
            &config(),
            &input(),
            Some(accum),
            catalog(),
            &nodes,
            0,
            nodes.ground(),
        )
        .unwrap();
        let mut nodes = nodes;
        link.step(&mut nodes, 0.1);
        assert!(link.liquid_pool_mass() > 0.0);
        link.restart();
        assert_eq!(link.liquid_pool_mass(), 0.0);
    }
}
