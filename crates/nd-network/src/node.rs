//! Lumped control-volume nodes with additive flow collection.

use nd_core::FLOW_EPSILON;
use nd_fluids::{Fluid, Species};

/// A network node: one scalar potential (pressure, kPa) over one lump of
/// fluid, plus the collection terms links add to during a tick.
///
/// Links write collection terms additively; the node integrator applies and
/// clears them at tick boundaries. The `outflow` sample is the fluid state
/// that flows leaving this node carry, frozen from the content at the last
/// integration.
#[derive(Debug, Clone)]
pub struct Node {
    potential_kpa: f64,
    content: Fluid,
    outflow: Fluid,
    /// Collected influx mass rates per species [kg/s].
    influx_species: Vec<(Species, f64)>,
    /// Collected influx enthalpy rate [W].
    influx_enthalpy: f64,
    /// Collected outflux mass rate [kg/s].
    outflux_rate: f64,
    /// Molar outflux scheduled by links for the flow orchestrator [kmol/s].
    scheduled_outflux: f64,
    /// Collected heat rate [W].
    heat_flux: f64,
}

impl Node {
    pub fn new(potential_kpa: f64, content: Fluid) -> Self {
        let outflow = content.clone();
        Self {
            potential_kpa,
            content,
            outflow,
            influx_species: Vec::new(),
            influx_enthalpy: 0.0,
            outflux_rate: 0.0,
            scheduled_outflux: 0.0,
            heat_flux: 0.0,
        }
    }

    pub fn potential(&self) -> f64 {
        self.potential_kpa
    }

    /// The solver writes the solved potential here between step and
    /// compute-flows.
    pub fn set_potential(&mut self, potential_kpa: f64) {
        self.potential_kpa = potential_kpa;
    }

    pub fn content(&self) -> &Fluid {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut Fluid {
        &mut self.content
    }

    /// Sample carried by flows leaving this node.
    pub fn outflow(&self) -> &Fluid {
        &self.outflow
    }

    /// Links announce molar outflux so the orchestrator can split
    /// over-subscribed nodes.
    pub fn schedule_outflux(&mut self, flux_kmol_s: f64) {
        self.scheduled_outflux += flux_kmol_s;
    }

    pub fn scheduled_outflux(&self) -> f64 {
        self.scheduled_outflux
    }

    /// Add an incoming mass rate carrying the given fluid sample.
    ///
    /// A negative rate pulls the sample's species mix back out of this node;
    /// phase-change links use that to extract a single species from a
    /// mixture.
    pub fn collect_influx(&mut self, mass_rate: f64, sample: &Fluid) {
        for species in Species::ALL {
            let w = sample.mass_fraction(species);
            if w > 0.0 {
                self.add_species_rate(species, mass_rate * w);
            }
        }
        self.influx_enthalpy += mass_rate * sample.specific_enthalpy();
    }

    /// Remove mass at this node's own outflow composition.
    pub fn collect_outflux(&mut self, mass_rate: f64) {
        self.outflux_rate += mass_rate;
    }

    /// Add heat [W].
    pub fn collect_heat_flux(&mut self, heat_w: f64) {
        self.heat_flux += heat_w;
    }

    pub fn collected_heat_flux(&self) -> f64 {
        self.heat_flux
    }

    /// Net collected mass rate [kg/s] (influx minus outflux), for tests and
    /// diagnostics.
    pub fn net_mass_rate(&self) -> f64 {
        let influx: f64 = self.influx_species.iter().map(|(_, r)| r).sum();
        influx - self.outflux_rate
    }

    fn add_species_rate(&mut self, species: Species, rate: f64) {
        if let Some(entry) = self.influx_species.iter_mut().find(|(s, _)| *s == species) {
            entry.1 += rate;
        } else {
            self.influx_species.push((species, rate));
        }
    }

    /// Minimal node integration standing in for the external solver: apply
    /// the collected terms to the content over `dt`, then clear them and
    /// refresh the outflow sample.
    pub fn integrate_flows(&mut self, dt: f64) {
        let old_mass = self.content.mass();
        let h_old = self.content.specific_enthalpy();

        let mut new_mass = 0.0;
        let mut fractions = Vec::new();
        for species in Species::ALL {
            let mut m = old_mass * self.content.mass_fraction(species);
            if let Some((_, rate)) = self.influx_species.iter().find(|(s, _)| *s == species) {
                m += rate * dt;
            }
            m -= self.outflux_rate * dt * self.outflow.mass_fraction(species);
            if m > 0.0 {
                fractions.push((species, m));
                new_mass += m;
            }
        }

        if new_mass > FLOW_EPSILON {
            let heat = old_mass * h_old
                + (self.influx_enthalpy + self.heat_flux) * dt
                - self.outflux_rate * self.outflow.specific_enthalpy() * dt;
            let t = self.content.compute_temperature(heat / new_mass);
            if self.content.set_mass_and_mass_fractions(new_mass, fractions).is_ok() {
                self.content.set_temperature(t);
            }
        }

        self.reset_flows();
        self.refresh_outflow();
    }

    pub fn reset_flows(&mut self) {
        self.influx_species.clear();
        self.influx_enthalpy = 0.0;
        self.outflux_rate = 0.0;
        self.scheduled_outflux = 0.0;
        self.heat_flux = 0.0;
    }

    pub fn refresh_outflow(&mut self) {
        self.outflow = self.content.clone();
    }
}

/// The network's nodes with the distinguished ground (vacuum) node in the
/// last slot.
#[derive(Debug, Clone)]
pub struct NodeList {
    nodes: Vec<Node>,
}

impl NodeList {
    /// Builds a list from the real nodes, appending the ground node.
    pub fn new(mut nodes: Vec<Node>) -> Self {
        use nd_fluids::Composition;
        let vacuum = Fluid::new(Composition::pure(Species::N2), 270.0, f64::EPSILON);
        nodes.push(Node::new(0.0, vacuum));
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ground(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_ground(&self, index: usize) -> bool {
        index == self.ground()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }
}
