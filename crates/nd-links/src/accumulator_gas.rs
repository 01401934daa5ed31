//! Gas pressurizer chamber layered on the accumulator.
//!
//! With a gas chamber present, port 0 becomes an active gas node connection:
//! the gas side writes the reserved admittance slot `a[0]` and source slot 0,
//! carries its own capacitance-derived conductance (floored at the
//! configured minimum, never fully closed), and supplies the pressurizer
//! pressure behind the bellows. The chamber adds the gas pressure edit, the
//! simultaneous-edit arbitration against bellows edits, and the bellows
//! rupture fault.

use serde::{Deserialize, Serialize};

use crate::accumulator::{
    Accumulator, AccumulatorInput, GAS_PORT, compute_conductance, compute_flow_rate,
    compute_mass_from_flow, compute_mass_from_volume, process_timer, ramp_value,
    transport_accum_fluid,
};
use crate::error::{LinkError, LinkResult};
use nd_core::limit_range;
use nd_fluids::Fluid;
use nd_network::{CONDUCTANCE_LIMIT, NodeList, PortDirection};

/// Gas chamber configuration, immutable after init.
#[derive(Debug, Clone)]
pub struct GasChamberConfig {
    /// Max effective conductance of the gas path [m2].
    pub gas_max_conductance: f64,
    /// Min effective conductance of the gas path [m2]; the gas side never
    /// closes completely.
    pub gas_min_conductance: f64,
    /// Max rate for forced pressure movement [kPa/s].
    pub max_force_pressure_rate: f64,
}

/// Serde snapshot of the gas chamber's checkpointable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasChamberCheckpoint {
    pub fluid: Fluid,
    pub gas_effective_conductance: f64,
    pub gas_capacitance: f64,
    pub gas_pressure_reading: f64,
    pub gas_flow_rate: f64,
    pub gas_flux: f64,
    pub gas_housing_q: f64,
    pub edit_pressure_flag: bool,
    pub edit_pressure_value: f64,
    pub edit_pressure_rate: f64,
    pub edit_pressure_timer: f64,
    pub pressure_malf_set: bool,
    pub edit_hold_pressure: f64,
    pub malf_bellows_rupture_flag: bool,
    pub rupture_position: f64,
    pub rupture_position_rate: f64,
    pub rupture_pressure: f64,
    pub rupture_pressure_rate: f64,
}

/// Gas pressurizer state owned by the accumulator.
#[derive(Debug)]
pub struct GasChamber {
    pub(crate) gas_max_conductance: f64,
    pub(crate) gas_min_conductance: f64,
    pub(crate) gas_effective_conductance: f64,
    pub(crate) gas_capacitance: f64,
    pub(crate) gas_pressure_reading: f64,
    pub(crate) gas_flow_rate: f64,
    pub(crate) gas_flux: f64,
    pub(crate) gas_housing_q: f64,
    pub(crate) edit_pressure_flag: bool,
    pub(crate) edit_pressure_value: f64,
    pub(crate) edit_pressure_rate: f64,
    pub(crate) edit_pressure_timer: f64,
    pub(crate) max_force_pressure_rate: f64,
    pub(crate) pressure_malf_set: bool,
    /// Liquid-pressure snapshot the gas chamber holds to during bellows
    /// edits; last-iteration gas pressure would drift with the spring as
    /// the bellows moves.
    pub(crate) edit_hold_pressure: f64,
    pub(crate) malf_bellows_rupture_flag: bool,
    pub(crate) rupture_position: f64,
    pub(crate) rupture_position_rate: f64,
    pub(crate) rupture_pressure: f64,
    pub(crate) rupture_pressure_rate: f64,
    pub(crate) fluid: Fluid,
}

impl GasChamber {
    pub(crate) fn checkpoint(&self) -> GasChamberCheckpoint {
        GasChamberCheckpoint {
            fluid: self.fluid.clone(),
            gas_effective_conductance: self.gas_effective_conductance,
            gas_capacitance: self.gas_capacitance,
            gas_pressure_reading: self.gas_pressure_reading,
            gas_flow_rate: self.gas_flow_rate,
            gas_flux: self.gas_flux,
            gas_housing_q: self.gas_housing_q,
            edit_pressure_flag: self.edit_pressure_flag,
            edit_pressure_value: self.edit_pressure_value,
            edit_pressure_rate: self.edit_pressure_rate,
            edit_pressure_timer: self.edit_pressure_timer,
            pressure_malf_set: self.pressure_malf_set,
            edit_hold_pressure: self.edit_hold_pressure,
            malf_bellows_rupture_flag: self.malf_bellows_rupture_flag,
            rupture_position: self.rupture_position,
            rupture_position_rate: self.rupture_position_rate,
            rupture_pressure: self.rupture_pressure,
            rupture_pressure_rate: self.rupture_pressure_rate,
        }
    }

    pub(crate) fn restore(&mut self, snapshot: &GasChamberCheckpoint) {
        self.fluid = snapshot.fluid.clone();
        self.gas_effective_conductance = snapshot.gas_effective_conductance;
        self.gas_capacitance = snapshot.gas_capacitance;
        self.gas_pressure_reading = snapshot.gas_pressure_reading;
        self.gas_flow_rate = snapshot.gas_flow_rate;
        self.gas_flux = snapshot.gas_flux;
        self.gas_housing_q = snapshot.gas_housing_q;
        self.edit_pressure_flag = snapshot.edit_pressure_flag;
        self.edit_pressure_value = snapshot.edit_pressure_value;
        self.edit_pressure_rate = snapshot.edit_pressure_rate;
        self.edit_pressure_timer = snapshot.edit_pressure_timer;
        self.pressure_malf_set = snapshot.pressure_malf_set;
        self.edit_hold_pressure = snapshot.edit_hold_pressure;
        self.malf_bellows_rupture_flag = snapshot.malf_bellows_rupture_flag;
        self.rupture_position = snapshot.rupture_position;
        self.rupture_position_rate = snapshot.rupture_position_rate;
        self.rupture_pressure = snapshot.rupture_pressure;
        self.rupture_pressure_rate = snapshot.rupture_pressure_rate;
    }
}

impl Accumulator {
    pub(crate) fn init_gas_chamber(
        &mut self,
        config: &GasChamberConfig,
        input: &AccumulatorInput,
        _nodes: &NodeList,
    ) -> LinkResult<()> {
        let invalid = |rule: &'static str| LinkError::InvalidConfig {
            link: self.name.clone(),
            rule,
        };
        if config.gas_max_conductance < 0.0 {
            return Err(invalid("gas max conductance < 0"));
        }
        if config.gas_min_conductance < f64::EPSILON {
            return Err(invalid("gas min conductance must be >= epsilon"));
        }
        if config.max_force_pressure_rate <= 0.0 {
            return Err(invalid("max force pressure rate must be > 0"));
        }
        let gas_input = input.gas_fluid.as_ref().ok_or(LinkError::InvalidInput {
            link: self.name.clone(),
            rule: "gas fluid input is required",
        })?;

        let mut fluid = gas_input
            .build()
            .map_err(|e| LinkError::fluid(&self.name, e))?;
        let mass = compute_mass_from_volume(self.pressurizer_volume, fluid.density());
        fluid.set_mass(mass);

        self.gas = Some(GasChamber {
            gas_max_conductance: config.gas_max_conductance,
            gas_min_conductance: config.gas_min_conductance,
            gas_effective_conductance: config.gas_max_conductance,
            gas_capacitance: 0.0,
            gas_pressure_reading: gas_input.pressure_kpa,
            gas_flow_rate: 0.0,
            gas_flux: 0.0,
            gas_housing_q: 0.0,
            edit_pressure_flag: false,
            edit_pressure_value: 0.0,
            edit_pressure_rate: config.max_force_pressure_rate,
            edit_pressure_timer: 0.0,
            max_force_pressure_rate: config.max_force_pressure_rate,
            pressure_malf_set: false,
            edit_hold_pressure: gas_input.pressure_kpa,
            malf_bellows_rupture_flag: false,
            rupture_position: 0.0,
            rupture_position_rate: 0.0,
            rupture_pressure: 0.0,
            rupture_pressure_rate: config.max_force_pressure_rate,
            fluid,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Gas accessors and operator setters
    // ---------------------------------------------------------------------

    pub fn gas_fluid(&self) -> Option<&Fluid> {
        self.gas.as_ref().map(|g| &g.fluid)
    }

    pub fn gas_effective_conductance(&self) -> f64 {
        self.gas.as_ref().map_or(0.0, |g| g.gas_effective_conductance)
    }

    pub fn gas_capacitance(&self) -> f64 {
        self.gas.as_ref().map_or(0.0, |g| g.gas_capacitance)
    }

    pub fn gas_pressure_reading(&self) -> f64 {
        self.gas.as_ref().map_or(0.0, |g| g.gas_pressure_reading)
    }

    pub fn gas_flux(&self) -> f64 {
        self.gas.as_ref().map_or(0.0, |g| g.gas_flux)
    }

    pub fn liq_capacitance(&self) -> f64 {
        self.liq_capacitance
    }

    pub fn set_gas_housing_q(&mut self, heat_w: f64) {
        if let Some(gas) = self.gas.as_mut() {
            gas.gas_housing_q = heat_w;
        }
    }

    /// Arms the gas pressure edit; the target is a liquid pressure,
    /// including the spring contribution.
    pub fn edit_pressure(&mut self, target_kpa: f64, rate_kpa_s: f64) {
        if let Some(gas) = self.gas.as_mut() {
            gas.edit_pressure_flag = true;
            gas.edit_pressure_value = target_kpa;
            gas.edit_pressure_rate = rate_kpa_s;
        }
    }

    /// Clears the gas pressure edit (operator abort).
    pub fn clear_pressure_edit(&mut self) {
        if let Some(gas) = self.gas.as_mut() {
            gas.edit_pressure_flag = false;
            gas.edit_pressure_timer = 0.0;
        }
    }

    pub fn pressure_edit_active(&self) -> bool {
        self.gas.as_ref().is_some_and(|g| g.edit_pressure_flag)
    }

    /// Sets the bellows rupture fault: the bellows drives to `pos` and the
    /// gas pressure to `press` at the given rates, then nominal updates
    /// resume with both latched.
    pub fn set_malf_bellows_rupture(
        &mut self,
        flag: bool,
        pos: f64,
        pos_rate: f64,
        press: f64,
        press_rate: f64,
    ) {
        if let Some(gas) = self.gas.as_mut() {
            gas.malf_bellows_rupture_flag = flag;
            gas.rupture_position = pos;
            gas.rupture_position_rate = pos_rate;
            gas.rupture_pressure = press;
            gas.rupture_pressure_rate = press_rate;
        }
    }

    // ---------------------------------------------------------------------
    // Step-phase overlays
    // ---------------------------------------------------------------------

    /// Gas capacitance from the chamber state, and the liquid capacitance
    /// derived from it. With a spring present the smaller of the two wins.
    pub(crate) fn update_gas_capacitance(&mut self) {
        let volume = self.pressurizer_volume;
        let (gas_capacitance, gas_density, gas_mweight) = {
            let gas = self.gas.as_ref().expect("gas chamber present");
            (
                compute_gas_capacitance(&gas.fluid, volume),
                gas.fluid.density(),
                gas.fluid.mweight(),
            )
        };
        self.gas.as_mut().expect("gas chamber present").gas_capacitance = gas_capacitance;

        let liq_mweight = self.liquid.mweight();
        if gas_density > 0.0 && liq_mweight > 0.0 {
            let liq_capacitance =
                gas_capacitance * self.liquid.density() * gas_mweight / gas_density / liq_mweight;
            if self.spring_coeff_0 > f64::EPSILON
                || self.spring_coeff_1 > f64::EPSILON
                || self.spring_coeff_2 > f64::EPSILON
            {
                self.liq_capacitance = liq_capacitance.min(self.spring_capacitance);
            } else {
                self.liq_capacitance = liq_capacitance;
            }
        } else {
            tracing::warn!(
                link = %self.name,
                "gas density or molecular weight <= 0, liquid capacitance update aborted"
            );
            self.liq_capacitance = 0.0;
        }
    }

    pub(crate) fn update_gas_effective_conductance(&mut self, dt: f64) {
        let gas = self.gas.as_mut().expect("gas chamber present");
        gas.gas_effective_conductance = compute_conductance(
            gas.gas_capacitance,
            gas.gas_max_conductance,
            gas.gas_effective_conductance,
            gas.gas_min_conductance,
            dt,
        );
    }

    pub(crate) fn build_gas_conductance(&mut self) {
        let gas_system_conductance = limit_range(
            0.0,
            self.gas.as_ref().expect("gas chamber present").gas_effective_conductance,
            CONDUCTANCE_LIMIT,
        );
        if self.io.admittance_matrix[0] != gas_system_conductance {
            self.io.admittance_matrix[0] = gas_system_conductance;
            self.io.admittance_update = true;
        }
    }

    pub(crate) fn build_gas_potential(&mut self) {
        self.io.source_vector[0] = self.gas.as_ref().expect("gas chamber present").fluid.pressure()
            * self.io.admittance_matrix[0];
    }

    pub(crate) fn compute_gas_flows(&mut self, nodes: &mut NodeList) {
        let gas_node = self.ports[GAS_PORT];
        let flux = (nodes.node(gas_node).potential()
            - self.gas.as_ref().expect("gas chamber present").fluid.pressure())
            * self.io.admittance_matrix[0];
        self.gas.as_mut().expect("gas chamber present").gas_flux = flux;
        if flux > f64::EPSILON {
            nodes.node_mut(gas_node).schedule_outflux(flux);
            self.io.port_directions[GAS_PORT] = PortDirection::Source;
        } else if flux < -f64::EPSILON {
            self.io.port_directions[GAS_PORT] = PortDirection::Sink;
        }
    }

    // ---------------------------------------------------------------------
    // Transport-phase overlays
    // ---------------------------------------------------------------------

    /// The bellows override hook: rupture drives the bellows to the rupture
    /// position with normal temperature updates; a pressure edit holds the
    /// bellows in place with temperature frozen.
    pub(crate) fn pressurizer_oride_bellows(&mut self, nodes: &NodeList, dt: f64) {
        let rupture = self
            .gas
            .as_ref()
            .is_some_and(|gas| gas.malf_bellows_rupture_flag);
        if self.gas.is_none() {
            return;
        }
        if rupture {
            self.reset_edit_flags_and_timers();
            let (position, rate) = {
                let gas = self.gas.as_ref().expect("gas chamber present");
                (gas.rupture_position, gas.rupture_position_rate)
            };
            let (_complete, target, rate) =
                self.force_liq_chamber(nodes, dt, position, rate, true);
            let gas = self.gas.as_mut().expect("gas chamber present");
            gas.rupture_position = target;
            gas.rupture_position_rate = rate;
        } else {
            let position = self.bellows_position;
            let _ = self.force_liq_chamber(nodes, dt, position, 0.0, false);
        }
    }

    /// Shared temperature edit applied to the gas chamber: force the
    /// temperature, back-calculate mass so the pressurizer volume holds.
    pub(crate) fn edit_pressurizer_temperature(&mut self) {
        if self.gas.is_none() {
            return;
        }
        let value = limit_range(
            self.min_temperature,
            self.edit_temperature_value,
            self.max_temperature,
        );
        let volume = self.pressurizer_volume;
        let gas = self.gas.as_mut().expect("gas chamber present");
        gas.fluid.set_temperature(value);
        let mass = compute_mass_from_volume(volume, gas.fluid.density());
        gas.fluid.set_mass(mass);
    }

    /// Forces the liquid-side pressure toward a target by setting the gas
    /// pressure under it (the spring contribution is subtracted out).
    /// Returns (complete, clamped target, clamped rate).
    pub(crate) fn force_gas_chamber(
        &mut self,
        nodes: &NodeList,
        dt: f64,
        target: f64,
        rate: f64,
        update_temperature: bool,
    ) -> (bool, f64, f64) {
        let max_force_rate = self
            .gas
            .as_ref()
            .expect("gas chamber present")
            .max_force_pressure_rate;
        let ramp = ramp_value(
            dt,
            self.liquid.pressure(),
            target,
            rate,
            f64::EPSILON,
            self.max_pressure,
            0.0,
            max_force_rate,
        );
        {
            let spring_pressure = self.spring_pressure;
            let gas = self.gas.as_mut().expect("gas chamber present");
            gas.fluid.set_pressure(ramp.current - spring_pressure);
        }

        if update_temperature {
            // Back-calculate mass against the new pressure before the
            // normal temperature update.
            {
                let volume = self.pressurizer_volume;
                let gas = self.gas.as_mut().expect("gas chamber present");
                let mass = compute_mass_from_volume(volume, gas.fluid.density());
                gas.fluid.set_mass(mass);
            }
            let (flow_rate, housing_q) = {
                let gas = self.gas.as_ref().expect("gas chamber present");
                (gas.gas_flow_rate, gas.gas_housing_q)
            };
            let in_enthalpy = nodes
                .node(self.ports[GAS_PORT])
                .outflow()
                .specific_enthalpy();
            let temperature = self.compute_chamber_temperature(
                dt,
                flow_rate,
                in_enthalpy,
                &self.gas.as_ref().expect("gas chamber present").fluid,
                housing_q,
            );
            self.gas
                .as_mut()
                .expect("gas chamber present")
                .fluid
                .set_temperature(temperature);
        } else {
            let volume = self.pressurizer_volume;
            let gas = self.gas.as_mut().expect("gas chamber present");
            let temperature = gas.fluid.temperature();
            gas.fluid.set_temperature(temperature);
            let mass = compute_mass_from_volume(volume, gas.fluid.density());
            gas.fluid.set_mass(mass);
        }
        (ramp.complete, ramp.target, ramp.rate)
    }

    /// Nominal gas chamber update: temperature from flow enthalpy, mass
    /// from flow (mixing inflow into the chamber), pressure from the
    /// equation of state at the resulting density.
    fn update_gas_chamber(&mut self, nodes: &NodeList, dt: f64) {
        if self.hold_accum_flag {
            return;
        }
        let gas_node = self.ports[GAS_PORT];
        let (flow_rate, housing_q) = {
            let gas = self.gas.as_ref().expect("gas chamber present");
            (gas.gas_flow_rate, gas.gas_housing_q)
        };
        let in_enthalpy = nodes.node(gas_node).outflow().specific_enthalpy();
        let temperature = self.compute_chamber_temperature(
            dt,
            flow_rate,
            in_enthalpy,
            &self.gas.as_ref().expect("gas chamber present").fluid,
            housing_q,
        );

        let old_mass = self.gas.as_ref().expect("gas chamber present").fluid.mass();
        let new_mass = compute_mass_from_flow(dt, flow_rate, old_mass);
        {
            let inflow = nodes.node(gas_node).outflow().clone();
            let gas = self.gas.as_mut().expect("gas chamber present");
            gas.fluid.set_temperature(temperature);
            if flow_rate > f64::EPSILON {
                if gas
                    .fluid
                    .mix_masses(old_mass, &inflow, dt * flow_rate)
                    .is_err()
                {
                    gas.fluid.set_mass(new_mass);
                }
            } else {
                gas.fluid.set_mass(new_mass);
            }
        }

        if self.pressurizer_volume > 0.0 {
            let density = new_mass / self.pressurizer_volume;
            let max_pressure = self.max_pressure;
            let gas = self.gas.as_mut().expect("gas chamber present");
            let pressure = gas.fluid.compute_pressure(gas.fluid.temperature(), density);
            gas.fluid
                .set_pressure(limit_range(f64::EPSILON, pressure, max_pressure));
        } else {
            tracing::warn!(
                link = %self.name,
                "pressurizer volume <= 0, gas pressure update aborted"
            );
        }
    }

    /// The gas-side transport pass: flow rate from the solved gas flux,
    /// fault/edit arbitration, nominal chamber update, pressure reading,
    /// and transport to the gas node.
    pub(crate) fn update_pressurizer_fluid(&mut self, nodes: &mut NodeList, dt: f64) {
        if self.gas.is_none() {
            return;
        }
        // Fall-through logic below reasserts the override where needed.
        self.pressurizer_oride_bellows_flag = false;
        let gas_node = self.ports[GAS_PORT];
        {
            let flux = self.gas.as_ref().expect("gas chamber present").gas_flux;
            let flow_rate = compute_flow_rate(
                flux,
                nodes.node(gas_node),
                &self.gas.as_ref().expect("gas chamber present").fluid,
            );
            self.gas.as_mut().expect("gas chamber present").gas_flow_rate = flow_rate;
        }

        if self
            .gas
            .as_ref()
            .expect("gas chamber present")
            .malf_bellows_rupture_flag
        {
            self.pressurizer_oride_bellows_flag = true;
            let latched = self.gas.as_ref().expect("gas chamber present").pressure_malf_set
                && self.bellows_malf_set;
            if latched {
                // Both targets reached; resume nominal updates at the
                // ruptured state.
                self.update_gas_chamber(nodes, dt);
            } else {
                let (pressure, rate) = {
                    let gas = self.gas.as_ref().expect("gas chamber present");
                    (gas.rupture_pressure, gas.rupture_pressure_rate)
                };
                let (complete, target, rate) =
                    self.force_gas_chamber(nodes, dt, pressure, rate, true);
                let gas = self.gas.as_mut().expect("gas chamber present");
                gas.rupture_pressure = target;
                gas.rupture_pressure_rate = rate;
                if complete {
                    gas.pressure_malf_set = true;
                }
            }
        } else {
            self.gas.as_mut().expect("gas chamber present").pressure_malf_set = false;
            self.bellows_malf_set = false;

            // A simultaneous pressure + bellows edit releases only when
            // both edits are complete; until then every chamber holds its
            // edited value regardless of reactivity.
            let edit_pressure_flag =
                self.gas.as_ref().expect("gas chamber present").edit_pressure_flag;
            if edit_pressure_flag && self.edit_bellows_flag {
                self.simultaneous_edits_in_progress = true;
            } else if !edit_pressure_flag && !self.edit_bellows_flag {
                self.simultaneous_edits_in_progress = false;
            }

            if edit_pressure_flag {
                // Snapshot the liquid pressure in case this edit is
                // released early with a simultaneous edit pending.
                let liquid_pressure = self.liquid.pressure();
                self.gas
                    .as_mut()
                    .expect("gas chamber present")
                    .edit_hold_pressure = liquid_pressure;
                if !self.edit_bellows_flag
                    && (!self.edits_are_reactive || self.simultaneous_edits_in_progress)
                {
                    self.pressurizer_oride_bellows_flag = true;
                }
                let update_temperature =
                    self.edits_are_reactive && !self.simultaneous_edits_in_progress;
                let (value, rate) = {
                    let gas = self.gas.as_ref().expect("gas chamber present");
                    (gas.edit_pressure_value, gas.edit_pressure_rate)
                };
                let (complete, value, rate) =
                    self.force_gas_chamber(nodes, dt, value, rate, update_temperature);
                {
                    let gas = self.gas.as_mut().expect("gas chamber present");
                    gas.edit_pressure_value = value;
                    gas.edit_pressure_rate = rate;
                }
                if complete {
                    let timer = self.gas.as_ref().expect("gas chamber present").edit_pressure_timer;
                    let (expired, timer) = process_timer(dt, timer, self.edit_hold_time);
                    let gas = self.gas.as_mut().expect("gas chamber present");
                    gas.edit_pressure_timer = timer;
                    if expired {
                        gas.edit_pressure_flag = false;
                        gas.edit_hold_pressure = gas.edit_pressure_value;
                    }
                }
            } else {
                self.gas
                    .as_mut()
                    .expect("gas chamber present")
                    .edit_pressure_timer = 0.0;
                if self.simultaneous_edits_in_progress
                    || (self.edit_bellows_flag && !self.edits_are_reactive)
                {
                    // Hold the liquid pressure at the snapshot until the
                    // bellows edit finishes.
                    let (hold, max_rate) = {
                        let gas = self.gas.as_ref().expect("gas chamber present");
                        (gas.edit_hold_pressure, gas.max_force_pressure_rate)
                    };
                    let (_complete, hold, _rate) =
                        self.force_gas_chamber(nodes, dt, hold, max_rate, false);
                    self.gas
                        .as_mut()
                        .expect("gas chamber present")
                        .edit_hold_pressure = hold;
                } else {
                    let liquid_pressure = self.liquid.pressure();
                    self.gas
                        .as_mut()
                        .expect("gas chamber present")
                        .edit_hold_pressure = liquid_pressure;
                    self.update_gas_chamber(nodes, dt);
                }
            }
        }

        // The reading tracks the node: decreasing conductance near a hard
        // stop shows up in the reading, not a phantom chamber-pressure
        // rise.
        let reading = nodes.node(gas_node).potential();
        self.gas
            .as_mut()
            .expect("gas chamber present")
            .gas_pressure_reading = reading;

        let flow_rate = self.gas.as_ref().expect("gas chamber present").gas_flow_rate;
        let fluid = &self.gas.as_ref().expect("gas chamber present").fluid;
        transport_accum_fluid(flow_rate, nodes.node_mut(gas_node), fluid);
    }
}

/// Gas chamber fluid capacitance [kmol/kPa]: centered finite difference of
/// the chamber gas moles over a +/-10% pressure window.
fn compute_gas_capacitance(fluid: &Fluid, volume: f64) -> f64 {
    let pressure = fluid.pressure();
    let mweight = fluid.mweight();
    let p_lo = 0.9 * pressure;
    let p_hi = 1.1 * pressure;
    if p_hi - p_lo <= 0.0 || mweight <= 0.0 {
        return 0.0;
    }
    let rho_lo = fluid.density_at(fluid.temperature(), p_lo);
    let rho_hi = fluid.density_at(fluid.temperature(), p_hi);
    (volume * (rho_hi - rho_lo) / (p_hi - p_lo) / mweight).max(0.0)
}
