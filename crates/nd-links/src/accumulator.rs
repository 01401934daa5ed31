//! Two-chamber bellows accumulator with a built-in spring pressurizer.
//!
//! The accumulator couples a liquid chamber to a pressurizer chamber through
//! a movable bellows. It acts on the network as a grounded potential source
//! on the liquid port: the node-to-node admittance entries stay zero and the
//! liquid path runs through the port's virtual path to ground. The central
//! stability mechanism is the effective-conductance controller, which ramps
//! the liquid path closed as the bellows approaches a travel hard stop and
//! reopens it as the bellows moves away.
//!
//! Chamber volume layout:
//!
//! ```text
//!  <----->                       min chamber volume (stability margin)
//!  <----------------->           dead band range
//!  <-------------------------------- total volume --------------------->
//!         <------------ bellows movement range (0 - 100%) ------->
//! ```
//!
//! `min_chamber_vol_pct` of the accumulator volume is added outside the
//! bellows travel so neither chamber ever empties completely; the dead band
//! between it and `min_deadband_vol_pct` is where the liquid conductance is
//! scaled down for stability.

use serde::{Deserialize, Serialize};

use crate::accumulator_gas::{GasChamber, GasChamberCheckpoint, GasChamberConfig};
use crate::error::{LinkError, LinkResult};
use nd_core::{FLOW_EPSILON, is_in_range, limit_range};
use nd_fluids::{Fluid, FluidInput, Phase};
use nd_network::{CONDUCTANCE_LIMIT, FluidLink, LinkIo, Node, NodeList, PortDirection};

pub(crate) const GAS_PORT: usize = 0;
pub(crate) const LIQUID_PORT: usize = 1;

/// Pressure-differential classification of net liquid flow direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FillMode {
    /// Inside and outside liquid pressures are equalized.
    #[default]
    Equalized,
    /// Outside pressure exceeds inside; flow pushes the bellows up.
    Filling,
    /// Inside pressure exceeds outside; flow pushes the bellows down.
    Draining,
}

/// Bellows position relative to the dead bands and hard stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BellowsZone {
    /// Liquid hard stop.
    Empty,
    /// Inside the liquid-side dead band.
    EmptyDeadband,
    /// Outside both dead bands.
    #[default]
    Middle,
    /// Inside the pressurizer-side dead band.
    FullDeadband,
    /// Pressurizer hard stop.
    Full,
}

/// Accumulator configuration, immutable after init.
#[derive(Debug, Clone)]
pub struct AccumulatorConfig {
    /// Max effective conductance of the liquid path [m2].
    pub max_conductance: f64,
    /// Min scale used to crack the liquid side open at a bellows limit.
    pub min_conductance_scale: f64,
    /// Documented real-world accumulator volume [m3].
    pub accum_volume: f64,
    /// Percent of accum volume added for the minimum chamber volume.
    pub min_chamber_vol_pct: f64,
    /// Percent of accum volume bounding the dead band; must exceed
    /// `min_chamber_vol_pct`.
    pub min_deadband_vol_pct: f64,
    /// Max rate for forced bellows movement [fraction/s].
    pub force_bellows_max_rate: f64,
    /// Hold time after an edit completes, for system stability [s].
    pub edit_hold_time: f64,
    /// Temperature limits for all chambers [K].
    pub min_temperature: f64,
    pub max_temperature: f64,
    /// Max pressure the accumulator will compute [kPa].
    pub max_pressure: f64,
    /// Spring pressure polynomial: p = c2*x^2 + c1*x + c0 over bellows
    /// position x, in kPa. All zero turns the spring off.
    pub spring_coeff_0: f64,
    pub spring_coeff_1: f64,
    pub spring_coeff_2: f64,
    /// Threshold for fill-mode classification [kPa]. Non-zero activates the
    /// one-way conductance-scale ramping.
    pub fill_mode_pressure_threshold: f64,
    /// Rate for the one-way conductance-scale ramp [fraction/s].
    pub eff_cond_scale_one_way_rate: f64,
}

/// Accumulator initial state.
#[derive(Debug, Clone)]
pub struct AccumulatorInput {
    /// Fraction of the liquid chamber that is filled (0-1).
    pub initial_bellows_position: f64,
    /// Initial liquid fluid state; required.
    pub liquid_fluid: Option<FluidInput>,
    /// Initial gas fluid state; required when a gas chamber is configured.
    pub gas_fluid: Option<FluidInput>,
}

/// Serde snapshot of the checkpointable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccumulatorCheckpoint {
    pub bellows_position: f64,
    pub liquid_volume: f64,
    pub pressurizer_volume: f64,
    pub effective_conductance: f64,
    pub eff_cond_scale: f64,
    pub liq_capacitance: f64,
    pub spring_capacitance: f64,
    pub spring_pressure: f64,
    pub spring_coeffs: (f64, f64, f64),
    pub liquid_pressure_reading: f64,
    pub accel_pressure_head: f64,
    pub liquid_housing_q: f64,
    pub liquid: Fluid,
    pub edit_bellows_flag: bool,
    pub edit_bellows_position: f64,
    pub edit_bellows_rate: f64,
    pub edit_bellows_timer: f64,
    pub edit_temperature_flag: bool,
    pub edit_temperature_value: f64,
    pub hold_accum_flag: bool,
    pub hold_temperature_flag: bool,
    pub pressurizer_oride_bellows_flag: bool,
    pub bellows_stuck: bool,
    pub bellows_malf_set: bool,
    pub edits_are_reactive: bool,
    pub simultaneous_edits_in_progress: bool,
    pub malf_bellows_stick_flag: bool,
    pub malf_bellows_stick_to_pos_flag: bool,
    pub malf_bellows_stick_to_pos_value: f64,
    pub malf_bellows_stick_to_pos_rate: f64,
    pub fill_mode: FillMode,
    pub bellows_zone: BellowsZone,
    pub gas: Option<GasChamberCheckpoint>,
}

/// The accumulator link. Port 0 is the pressurizer side (ground for a
/// spring-only unit, a gas node with a gas chamber); port 1 is the liquid
/// side.
#[derive(Debug)]
pub struct Accumulator {
    pub(crate) name: String,
    pub(crate) io: LinkIo,
    pub(crate) ports: Vec<usize>,

    // Solver coupling
    pub(crate) max_conductance: f64,
    min_conductance_scale: f64,
    pub(crate) effective_conductance: f64,
    eff_cond_scale: f64,
    pub(crate) liq_capacitance: f64,

    // Chamber geometry, fixed at init
    total_volume: f64,
    pub(crate) min_chamber_vol: f64,
    max_chamber_vol: f64,
    min_deadband_vol: f64,
    active_vol_range: f64,

    // Bellows and chamber state
    pub(crate) bellows_position: f64,
    pub(crate) liquid_volume: f64,
    pub(crate) pressurizer_volume: f64,
    liquid_pressure_reading: f64,
    liquid_housing_q: f64,

    // Spring
    pub(crate) spring_capacitance: f64,
    pub(crate) spring_coeff_0: f64,
    pub(crate) spring_coeff_1: f64,
    pub(crate) spring_coeff_2: f64,
    pub(crate) spring_pressure: f64,

    // Edits
    pub(crate) edit_hold_time: f64,
    pub(crate) edit_bellows_flag: bool,
    edit_bellows_position: f64,
    edit_bellows_rate: f64,
    edit_bellows_timer: f64,
    edit_temperature_flag: bool,
    pub(crate) edit_temperature_value: f64,
    pub(crate) hold_accum_flag: bool,
    hold_temperature_flag: bool,
    pub(crate) pressurizer_oride_bellows_flag: bool,
    pub(crate) edits_are_reactive: bool,
    pub(crate) simultaneous_edits_in_progress: bool,

    // Malfunctions
    malf_bellows_stick_flag: bool,
    malf_bellows_stick_to_pos_flag: bool,
    malf_bellows_stick_to_pos_value: f64,
    malf_bellows_stick_to_pos_rate: f64,
    bellows_stuck: bool,
    pub(crate) bellows_malf_set: bool,

    // Limits
    force_bellows_max_rate: f64,
    pub(crate) min_temperature: f64,
    pub(crate) max_temperature: f64,
    pub(crate) max_pressure: f64,

    // Conductance-scale controller state
    fill_mode: FillMode,
    bellows_zone: BellowsZone,
    fill_mode_pressure_threshold: f64,
    eff_cond_scale_one_way_rate: f64,

    accel_pressure_head: f64,

    pub(crate) liquid: Fluid,
    pub(crate) gas: Option<GasChamber>,
}

impl Accumulator {
    /// Builds a spring-pressurized accumulator. Port 0 must be the ground
    /// node (or a gas node it ignores); port 1 is the liquid node.
    pub fn new_spring(
        name: &str,
        config: &AccumulatorConfig,
        input: &AccumulatorInput,
        nodes: &NodeList,
        port0: usize,
        port1: usize,
    ) -> LinkResult<Self> {
        Self::build(name, config, None, input, nodes, port0, port1)
    }

    /// Builds a gas-pressurized accumulator. Port 0 is the gas node.
    pub fn new_gas(
        name: &str,
        config: &AccumulatorConfig,
        gas_config: &GasChamberConfig,
        input: &AccumulatorInput,
        nodes: &NodeList,
        port0: usize,
        port1: usize,
    ) -> LinkResult<Self> {
        Self::build(name, config, Some(gas_config), input, nodes, port0, port1)
    }

    fn build(
        name: &str,
        config: &AccumulatorConfig,
        gas_config: Option<&GasChamberConfig>,
        input: &AccumulatorInput,
        nodes: &NodeList,
        port0: usize,
        port1: usize,
    ) -> LinkResult<Self> {
        validate(name, config, input)?;
        let liquid = input
            .liquid_fluid
            .as_ref()
            .expect("validated above")
            .build()
            .map_err(|e| LinkError::fluid(name, e))?;

        let min_chamber_vol = config.accum_volume * config.min_chamber_vol_pct / 100.0;
        let max_chamber_vol = config.accum_volume;
        let min_deadband_vol = config.accum_volume * config.min_deadband_vol_pct / 100.0;
        let active_vol_range = max_chamber_vol - min_chamber_vol;
        let total_volume = config.accum_volume + min_chamber_vol;

        let bellows_position = input.initial_bellows_position;
        let spring_pressure = bellows_position * bellows_position * config.spring_coeff_2
            + bellows_position * config.spring_coeff_1
            + config.spring_coeff_0;
        let pressure_slope = 2.0 * bellows_position * config.spring_coeff_2 + config.spring_coeff_1;

        let mut accum = Self {
            name: name.to_string(),
            io: LinkIo::new(2),
            ports: vec![port0, port1],
            max_conductance: config.max_conductance,
            min_conductance_scale: config.min_conductance_scale,
            effective_conductance: config.max_conductance,
            eff_cond_scale: 1.0,
            liq_capacitance: 0.0,
            total_volume,
            min_chamber_vol,
            max_chamber_vol,
            min_deadband_vol,
            active_vol_range,
            bellows_position,
            liquid_volume: 0.0,
            pressurizer_volume: 0.0,
            liquid_pressure_reading: input
                .liquid_fluid
                .as_ref()
                .expect("validated above")
                .pressure_kpa,
            liquid_housing_q: 0.0,
            spring_capacitance: 0.0,
            spring_coeff_0: config.spring_coeff_0,
            spring_coeff_1: config.spring_coeff_1,
            spring_coeff_2: config.spring_coeff_2,
            spring_pressure,
            edit_hold_time: config.edit_hold_time,
            edit_bellows_flag: false,
            edit_bellows_position: 0.0,
            edit_bellows_rate: config.force_bellows_max_rate,
            edit_bellows_timer: 0.0,
            edit_temperature_flag: false,
            edit_temperature_value: 0.0,
            hold_accum_flag: false,
            hold_temperature_flag: false,
            pressurizer_oride_bellows_flag: false,
            edits_are_reactive: true,
            simultaneous_edits_in_progress: false,
            malf_bellows_stick_flag: false,
            malf_bellows_stick_to_pos_flag: false,
            malf_bellows_stick_to_pos_value: 0.0,
            malf_bellows_stick_to_pos_rate: config.force_bellows_max_rate,
            bellows_stuck: false,
            bellows_malf_set: false,
            force_bellows_max_rate: config.force_bellows_max_rate,
            min_temperature: config.min_temperature,
            max_temperature: config.max_temperature,
            max_pressure: config.max_pressure,
            fill_mode: FillMode::Equalized,
            bellows_zone: BellowsZone::Middle,
            fill_mode_pressure_threshold: config.fill_mode_pressure_threshold,
            eff_cond_scale_one_way_rate: config.eff_cond_scale_one_way_rate,
            accel_pressure_head: 0.0,
            liquid,
            gas: None,
        };

        for (port, node) in [(0usize, port0), (1usize, port1)] {
            if node >= nodes.len() || !accum.check_specific_port_rules(nodes, port, node) {
                return Err(LinkError::InvalidConfig {
                    link: name.to_string(),
                    rule: "port assignment violates accumulator port rules",
                });
            }
        }

        accum.derive_chamber_volumes();
        let mass = compute_mass_from_volume(accum.liquid_volume, accum.liquid.density());
        accum.liquid.set_mass(mass);

        if pressure_slope > f64::EPSILON {
            accum.spring_capacitance = 1.0 / pressure_slope * accum.active_vol_range
                * accum.liquid.density()
                / accum.liquid.mweight();
        } else {
            // A gas chamber must then supply the capacitance.
            accum.spring_capacitance = 0.0;
        }
        accum.liq_capacitance = accum.spring_capacitance;

        if let Some(gas_config) = gas_config {
            accum.init_gas_chamber(gas_config, input, nodes)?;
        }
        Ok(accum)
    }

    // ---------------------------------------------------------------------
    // Accessors and operator setters
    // ---------------------------------------------------------------------

    pub fn bellows_position(&self) -> f64 {
        self.bellows_position
    }

    pub fn liquid_volume(&self) -> f64 {
        self.liquid_volume
    }

    pub fn pressurizer_volume(&self) -> f64 {
        self.pressurizer_volume
    }

    pub fn effective_conductance(&self) -> f64 {
        self.effective_conductance
    }

    pub fn eff_cond_scale(&self) -> f64 {
        self.eff_cond_scale
    }

    pub fn liquid(&self) -> &Fluid {
        &self.liquid
    }

    pub fn fill_mode(&self) -> FillMode {
        self.fill_mode
    }

    pub fn bellows_zone(&self) -> BellowsZone {
        self.bellows_zone
    }

    pub fn bellows_stuck(&self) -> bool {
        self.bellows_stuck
    }

    pub fn liquid_pressure_reading(&self) -> f64 {
        self.liquid_pressure_reading
    }

    pub fn spring_coeffs(&self) -> (f64, f64, f64) {
        (self.spring_coeff_0, self.spring_coeff_1, self.spring_coeff_2)
    }

    /// Liquid mass above the minimum chamber volume, i.e. the part that can
    /// actually be extracted.
    pub fn usable_mass(&self) -> f64 {
        // Divide by zero prevented by the min chamber volume validation,
        // which bounds liquid_volume from below.
        self.liquid.mass() * (1.0 - self.min_chamber_vol / self.liquid_volume)
    }

    /// Arms the temperature edit for all chambers.
    pub fn set_temperature(&mut self, temperature: f64) {
        self.edit_temperature_flag = true;
        self.edit_temperature_value = temperature;
    }

    pub fn set_spring_coeffs(&mut self, coeff0: f64, coeff1: f64, coeff2: f64) {
        self.spring_coeff_0 = coeff0;
        self.spring_coeff_1 = coeff1;
        self.spring_coeff_2 = coeff2;
    }

    /// Extra pressure head at the exit due to the liquid column under
    /// acceleration [kPa].
    pub fn set_accel_pressure_head(&mut self, pressure: f64) {
        self.accel_pressure_head = pressure;
    }

    /// Heat input from the housing thermal aspect [W].
    pub fn set_liquid_housing_q(&mut self, heat_w: f64) {
        self.liquid_housing_q = heat_w;
    }

    /// Arms the bellows-position edit.
    pub fn edit_bellows_position(&mut self, target: f64, rate: f64) {
        self.edit_bellows_flag = true;
        self.edit_bellows_position = target;
        self.edit_bellows_rate = rate;
    }

    /// Clears the bellows-position edit (operator abort).
    pub fn clear_bellows_edit(&mut self) {
        self.edit_bellows_flag = false;
        self.edit_bellows_timer = 0.0;
    }

    pub fn set_hold_accum(&mut self, flag: bool) {
        self.hold_accum_flag = flag;
    }

    pub fn set_hold_temperature(&mut self, flag: bool) {
        self.hold_temperature_flag = flag;
    }

    pub fn set_edits_are_reactive(&mut self, flag: bool) {
        self.edits_are_reactive = flag;
    }

    /// Sticks the bellows in its current position while set.
    pub fn set_malf_bellows_stick(&mut self, flag: bool) {
        self.malf_bellows_stick_flag = flag;
    }

    /// Ramps the bellows to `value` at `rate` and sticks it there.
    pub fn set_malf_bellows_stick_to_pos(&mut self, flag: bool, value: f64, rate: f64) {
        self.malf_bellows_stick_to_pos_flag = flag;
        self.malf_bellows_stick_to_pos_value = value;
        self.malf_bellows_stick_to_pos_rate = rate;
    }

    // ---------------------------------------------------------------------
    // Step phase
    // ---------------------------------------------------------------------

    fn update_capacitance(&mut self) {
        let pressure_slope = 2.0 * self.bellows_position * self.spring_coeff_2
            + self.spring_coeff_1
            + self.accel_pressure_head / self.bellows_position.max(f64::EPSILON);
        if pressure_slope > f64::EPSILON {
            self.spring_capacitance = 1.0 / pressure_slope * self.active_vol_range
                * self.liquid.density()
                / self.liquid.mweight();
        } else {
            self.spring_capacitance = 0.0;
        }
        self.liq_capacitance = self.spring_capacitance;
        if self.gas.is_some() {
            self.update_gas_capacitance();
        }
    }

    /// The dead-band stability controller. Ramps the liquid-side scale to
    /// zero as the bellows approaches a hard stop and reopens it moving
    /// away, either symmetrically from bellows position (legacy) or with the
    /// time-based one-way ramp when a fill-mode threshold is configured.
    fn update_eff_cond_scale(&mut self, nodes: &NodeList, dt: f64) {
        let deadband_range = self.min_deadband_vol - self.min_chamber_vol;
        if deadband_range <= 0.0 {
            tracing::warn!(
                link = %self.name,
                "dead band range <= 0, invalid volume config; conductance scale update aborted"
            );
            return;
        }

        let inside_pressure = self.liquid.pressure();
        let outside_pressure = nodes.node(self.ports[LIQUID_PORT]).potential();

        let one_way_target_scale = 1.0;
        let mut one_way_rate_limit = 0.0;
        if dt > 0.0 {
            one_way_rate_limit = one_way_target_scale / dt;
        }

        self.fill_mode = if outside_pressure - inside_pressure > self.fill_mode_pressure_threshold {
            FillMode::Filling
        } else if inside_pressure - outside_pressure > self.fill_mode_pressure_threshold {
            FillMode::Draining
        } else {
            FillMode::Equalized
        };

        let full_deadband_vol = self.max_chamber_vol - deadband_range;
        self.bellows_zone = if self.liquid_volume <= self.min_chamber_vol {
            BellowsZone::Empty
        } else if self.liquid_volume >= self.max_chamber_vol {
            BellowsZone::Full
        } else if self.liquid_volume < self.min_deadband_vol {
            BellowsZone::EmptyDeadband
        } else if self.liquid_volume > full_deadband_vol {
            BellowsZone::FullDeadband
        } else {
            BellowsZone::Middle
        };

        if self.bellows_stuck {
            // Closed off entirely; pressures are allowed to diverge.
            self.eff_cond_scale = 0.0;
        } else if self.bellows_zone == BellowsZone::Middle
            || self.pressurizer_oride_bellows_flag
            || self.edit_bellows_flag
        {
            self.eff_cond_scale = 1.0;
        } else if self.fill_mode_pressure_threshold > f64::EPSILON
            && self.fill_mode != FillMode::Equalized
        {
            // One-way mode: ramp down only when approaching a hard stop.
            // Moving away ramps toward 1.0 with time rather than bellows
            // position, which avoids the sluggish fill/drain signature while
            // still not slamming the scale open.
            match self.fill_mode {
                FillMode::Filling => match self.bellows_zone {
                    BellowsZone::FullDeadband => {
                        self.eff_cond_scale = limit_range(
                            0.0,
                            (self.pressurizer_volume - self.min_chamber_vol) / deadband_range,
                            1.0,
                        );
                    }
                    BellowsZone::Full => {
                        self.eff_cond_scale = 0.0;
                    }
                    _ => {
                        self.ramp_scale_open(dt, one_way_target_scale, one_way_rate_limit);
                    }
                },
                FillMode::Draining => match self.bellows_zone {
                    BellowsZone::EmptyDeadband => {
                        self.eff_cond_scale = limit_range(
                            0.0,
                            (self.liquid_volume - self.min_chamber_vol) / deadband_range,
                            1.0,
                        );
                    }
                    BellowsZone::Empty => {
                        self.eff_cond_scale = 0.0;
                    }
                    _ => {
                        self.ramp_scale_open(dt, one_way_target_scale, one_way_rate_limit);
                    }
                },
                FillMode::Equalized => unreachable!("excluded by the branch condition"),
            }
        } else {
            // Legacy symmetric mode: scale follows the remaining dead-band
            // volume on both approach and retreat.
            match self.bellows_zone {
                BellowsZone::EmptyDeadband => {
                    self.eff_cond_scale = limit_range(
                        0.0,
                        (self.liquid_volume - self.min_chamber_vol) / deadband_range,
                        1.0,
                    );
                }
                BellowsZone::FullDeadband => {
                    self.eff_cond_scale = limit_range(
                        0.0,
                        (self.pressurizer_volume - self.min_chamber_vol) / deadband_range,
                        1.0,
                    );
                }
                BellowsZone::Empty if self.fill_mode == FillMode::Filling => {
                    self.eff_cond_scale = self.min_conductance_scale;
                }
                BellowsZone::Full if self.fill_mode == FillMode::Draining => {
                    self.eff_cond_scale = self.min_conductance_scale;
                }
                _ => {
                    // At a stop with pressure keeping it there.
                    self.eff_cond_scale = 0.0;
                }
            }
        }
    }

    fn ramp_scale_open(&mut self, dt: f64, target: f64, rate_limit: f64) {
        let ramp = ramp_value(
            dt,
            self.eff_cond_scale,
            target,
            self.eff_cond_scale_one_way_rate,
            0.0,
            1.0,
            0.0,
            rate_limit,
        );
        self.eff_cond_scale = ramp.current;
        self.eff_cond_scale_one_way_rate = ramp.rate;
    }

    fn update_effective_conductance(&mut self, nodes: &NodeList, dt: f64) {
        self.update_eff_cond_scale(nodes, dt);
        self.effective_conductance = self.eff_cond_scale
            * compute_conductance(
                self.liq_capacitance,
                self.max_conductance,
                self.effective_conductance,
                0.0,
                dt,
            );
        self.effective_conductance =
            limit_range(0.0, self.effective_conductance, self.max_conductance);
        if self.gas.is_some() {
            self.update_gas_effective_conductance(dt);
        }
    }

    /// Admittance assembly. Entries (1,2) stay zero: there is never direct
    /// node-to-node flow. a[3] is the liquid port's virtual path to ground;
    /// a[0] is reserved for a gas pressurizer and intentionally not cleared
    /// here.
    fn build_conductance(&mut self) {
        let liquid_system_conductance =
            limit_range(0.0, self.effective_conductance, CONDUCTANCE_LIMIT);
        if self.io.admittance_matrix[3] != liquid_system_conductance {
            self.io.admittance_matrix[1] = 0.0;
            self.io.admittance_matrix[2] = 0.0;
            self.io.admittance_matrix[3] = liquid_system_conductance;
            self.io.admittance_update = true;
        }
    }

    /// Source vector: the liquid chamber acts as a potential source behind
    /// a[3]. Slot 0 is zeroed for the pressurizer to overwrite.
    fn build_potential(&mut self) {
        self.io.source_vector[0] = 0.0;
        self.io.source_vector[1] = self.liquid.pressure() * self.io.admittance_matrix[3];
    }

    // ---------------------------------------------------------------------
    // Transport phase
    // ---------------------------------------------------------------------

    pub(crate) fn derive_chamber_volumes(&mut self) {
        self.liquid_volume = self.bellows_position * self.active_vol_range + self.min_chamber_vol;
        self.liquid_volume = limit_range(self.min_chamber_vol, self.liquid_volume, self.max_chamber_vol);
        self.update_pressurizer_volume();
    }

    /// Piecewise pressurizer volume, pinned exactly at the stops to defeat
    /// round-off against the liquid volume.
    fn update_pressurizer_volume(&mut self) {
        if self.liquid_volume >= self.max_chamber_vol {
            self.pressurizer_volume = self.min_chamber_vol;
        } else if self.liquid_volume <= self.min_chamber_vol {
            self.pressurizer_volume = self.max_chamber_vol;
        } else {
            self.pressurizer_volume = limit_range(
                self.min_chamber_vol,
                self.total_volume - self.liquid_volume,
                self.max_chamber_vol,
            );
        }
    }

    /// Temperature for a chamber after one transport pass, honoring the
    /// temperature hold and the configured limits.
    pub(crate) fn compute_chamber_temperature(
        &self,
        dt: f64,
        flow_rate: f64,
        in_specific_enthalpy: f64,
        fluid: &Fluid,
        housing_q: f64,
    ) -> f64 {
        let mut new_temperature = fluid.temperature();
        let current_mass = fluid.mass();
        let new_mass = compute_mass_from_flow(dt, flow_rate, current_mass);

        if !self.hold_temperature_flag {
            if new_mass > 0.0 {
                let mut flow_heat_flux = 0.0;
                if flow_rate < -FLOW_EPSILON {
                    flow_heat_flux = flow_rate * fluid.specific_enthalpy();
                } else if flow_rate > FLOW_EPSILON {
                    flow_heat_flux = flow_rate * in_specific_enthalpy;
                }
                let current_heat = current_mass * fluid.specific_enthalpy();
                let new_enthalpy = (current_heat + (housing_q + flow_heat_flux) * dt) / new_mass;
                new_temperature = fluid.compute_temperature(new_enthalpy);
            } else {
                tracing::warn!(link = %self.name, "chamber mass <= 0, temperature update aborted");
            }
        }
        limit_range(self.min_temperature, new_temperature, self.max_temperature)
    }

    /// Clamps the temperature edit value, forces the chamber temperature,
    /// and back-calculates mass so density changes but volume does not.
    fn edit_temperature_liquid(&mut self) {
        self.edit_temperature_value = limit_range(
            self.min_temperature,
            self.edit_temperature_value,
            self.max_temperature,
        );
        self.liquid.set_temperature(self.edit_temperature_value);
        let mass = compute_mass_from_volume(self.liquid_volume, self.liquid.density());
        self.liquid.set_mass(mass);
    }

    /// Forces the bellows toward a target position for edits and
    /// malfunctions. Returns (complete, clamped target, clamped rate) so
    /// callers can expose the clamping back to the operator.
    pub(crate) fn force_liq_chamber(
        &mut self,
        nodes: &NodeList,
        dt: f64,
        target: f64,
        rate: f64,
        update_temperature: bool,
    ) -> (bool, f64, f64) {
        let ramp = ramp_value(
            dt,
            self.bellows_position,
            target,
            rate,
            0.0,
            1.0,
            0.0,
            self.force_bellows_max_rate,
        );
        self.bellows_position = ramp.current;
        self.derive_chamber_volumes();

        if update_temperature {
            let mass = compute_mass_from_volume(self.liquid_volume, self.liquid.density());
            self.liquid.set_mass(mass);
            let temperature = self.compute_chamber_temperature(
                dt,
                self.io.flow_rate,
                nodes.node(self.ports[LIQUID_PORT]).outflow().specific_enthalpy(),
                &self.liquid,
                self.liquid_housing_q,
            );
            self.liquid.set_temperature(temperature);
        } else {
            // Temperature held; back-calculate mass against the held
            // density after the volume change.
            let temperature = self.liquid.temperature();
            self.liquid.set_temperature(temperature);
            let mass = compute_mass_from_volume(self.liquid_volume, self.liquid.density());
            self.liquid.set_mass(mass);
        }

        // The rupture fault waits on this latch before resuming nominal
        // updates.
        if self.pressurizer_oride_bellows_flag && ramp.complete {
            self.bellows_malf_set = true;
        }
        (ramp.complete, ramp.target, ramp.rate)
    }

    fn edit_liq_chamber(&mut self, nodes: &NodeList, dt: f64) {
        // Temperature reacts normally only for a lone reactive edit; a
        // simultaneous pressurizer edit freezes it until both finish.
        let update_temperature_normally =
            self.edits_are_reactive && !self.simultaneous_edits_in_progress;
        let (complete, target, rate) = self.force_liq_chamber(
            nodes,
            dt,
            self.edit_bellows_position,
            self.edit_bellows_rate,
            update_temperature_normally,
        );
        self.edit_bellows_position = target;
        self.edit_bellows_rate = rate;
        if complete {
            let (expired, timer) = process_timer(dt, self.edit_bellows_timer, self.edit_hold_time);
            self.edit_bellows_timer = timer;
            if expired {
                self.edit_bellows_flag = false;
            }
        }
    }

    fn fail_liq_chamber(&mut self, nodes: &NodeList, dt: f64) {
        // Only one malfunction at a time; plain stick has priority.
        if self.malf_bellows_stick_flag {
            self.bellows_stuck = true;
        } else {
            let (complete, target, rate) = self.force_liq_chamber(
                nodes,
                dt,
                self.malf_bellows_stick_to_pos_value,
                self.malf_bellows_stick_to_pos_rate,
                true,
            );
            self.malf_bellows_stick_to_pos_value = target;
            self.malf_bellows_stick_to_pos_rate = rate;
            self.bellows_stuck = complete;
        }
    }

    fn update_liq_chamber(&mut self, nodes: &NodeList, dt: f64) {
        if self.hold_accum_flag {
            return;
        }

        let temperature = self.compute_chamber_temperature(
            dt,
            self.io.flow_rate,
            nodes.node(self.ports[LIQUID_PORT]).outflow().specific_enthalpy(),
            &self.liquid,
            self.liquid_housing_q,
        );
        self.liquid.set_temperature(temperature);

        let new_mass = compute_mass_from_flow(dt, self.io.flow_rate, self.liquid.mass());
        self.liquid.set_mass(new_mass);
        let density = self.liquid.density();

        if density > 0.0 {
            self.liquid_volume =
                limit_range(self.min_chamber_vol, new_mass / density, self.max_chamber_vol);
        } else {
            tracing::warn!(link = %self.name, "liquid density too small, volume update aborted");
        }
        self.update_pressurizer_volume();

        if self.active_vol_range > 0.0 {
            self.bellows_position =
                (self.liquid_volume - self.min_chamber_vol) / self.active_vol_range;
            self.bellows_position = limit_range(0.0, self.bellows_position, 1.0);
        } else {
            tracing::warn!(
                link = %self.name,
                "active volume range <= 0, bellows position update aborted"
            );
        }
    }

    fn update_pressure(&mut self, nodes: &NodeList) {
        self.spring_pressure = self.bellows_position * self.bellows_position * self.spring_coeff_2
            + self.bellows_position * self.spring_coeff_1
            + self.spring_coeff_0;
        // With an acceleration head the total is the pressure at the bottom
        // of the liquid column, which is the entrance/exit.
        let pressurizer = self.pressurizer_pressure();
        self.liquid.set_pressure(limit_range(
            f64::EPSILON,
            self.spring_pressure + self.accel_pressure_head + pressurizer,
            self.max_pressure,
        ));
        // The sensor reading tracks the node so a closed-off conductance is
        // observable while the chamber pressure follows the pressurizer.
        self.liquid_pressure_reading = nodes.node(self.ports[LIQUID_PORT]).potential();
    }

    pub(crate) fn pressurizer_pressure(&self) -> f64 {
        match &self.gas {
            Some(gas) => gas.fluid.pressure(),
            None => 0.0,
        }
    }

    pub(crate) fn reset_edit_flags_and_timers(&mut self) {
        self.edit_bellows_flag = false;
        self.edit_bellows_timer = 0.0;
        self.edit_temperature_flag = false;
        if let Some(gas) = self.gas.as_mut() {
            gas.edit_pressure_flag = false;
            gas.edit_pressure_timer = 0.0;
        }
        self.simultaneous_edits_in_progress = false;
    }

    // ---------------------------------------------------------------------
    // Checkpoint
    // ---------------------------------------------------------------------

    pub fn checkpoint(&self) -> AccumulatorCheckpoint {
        AccumulatorCheckpoint {
            bellows_position: self.bellows_position,
            liquid_volume: self.liquid_volume,
            pressurizer_volume: self.pressurizer_volume,
            effective_conductance: self.effective_conductance,
            eff_cond_scale: self.eff_cond_scale,
            liq_capacitance: self.liq_capacitance,
            spring_capacitance: self.spring_capacitance,
            spring_pressure: self.spring_pressure,
            spring_coeffs: (self.spring_coeff_0, self.spring_coeff_1, self.spring_coeff_2),
            liquid_pressure_reading: self.liquid_pressure_reading,
            accel_pressure_head: self.accel_pressure_head,
            liquid_housing_q: self.liquid_housing_q,
            liquid: self.liquid.clone(),
            edit_bellows_flag: self.edit_bellows_flag,
            edit_bellows_position: self.edit_bellows_position,
            edit_bellows_rate: self.edit_bellows_rate,
            edit_bellows_timer: self.edit_bellows_timer,
            edit_temperature_flag: self.edit_temperature_flag,
            edit_temperature_value: self.edit_temperature_value,
            hold_accum_flag: self.hold_accum_flag,
            hold_temperature_flag: self.hold_temperature_flag,
            pressurizer_oride_bellows_flag: self.pressurizer_oride_bellows_flag,
            bellows_stuck: self.bellows_stuck,
            bellows_malf_set: self.bellows_malf_set,
            edits_are_reactive: self.edits_are_reactive,
            simultaneous_edits_in_progress: self.simultaneous_edits_in_progress,
            malf_bellows_stick_flag: self.malf_bellows_stick_flag,
            malf_bellows_stick_to_pos_flag: self.malf_bellows_stick_to_pos_flag,
            malf_bellows_stick_to_pos_value: self.malf_bellows_stick_to_pos_value,
            malf_bellows_stick_to_pos_rate: self.malf_bellows_stick_to_pos_rate,
            fill_mode: self.fill_mode,
            bellows_zone: self.bellows_zone,
            gas: self.gas.as_ref().map(GasChamber::checkpoint),
        }
    }

    pub fn restore(&mut self, snapshot: &AccumulatorCheckpoint) -> LinkResult<()> {
        if snapshot.gas.is_some() != self.gas.is_some() {
            return Err(LinkError::Checkpoint {
                link: self.name.clone(),
                what: "pressurizer kind differs from the checkpoint",
            });
        }
        self.bellows_position = snapshot.bellows_position;
        self.liquid_volume = snapshot.liquid_volume;
        self.pressurizer_volume = snapshot.pressurizer_volume;
        self.effective_conductance = snapshot.effective_conductance;
        self.eff_cond_scale = snapshot.eff_cond_scale;
        self.liq_capacitance = snapshot.liq_capacitance;
        self.spring_capacitance = snapshot.spring_capacitance;
        self.spring_pressure = snapshot.spring_pressure;
        (self.spring_coeff_0, self.spring_coeff_1, self.spring_coeff_2) = snapshot.spring_coeffs;
        self.liquid_pressure_reading = snapshot.liquid_pressure_reading;
        self.accel_pressure_head = snapshot.accel_pressure_head;
        self.liquid_housing_q = snapshot.liquid_housing_q;
        self.liquid = snapshot.liquid.clone();
        self.edit_bellows_flag = snapshot.edit_bellows_flag;
        self.edit_bellows_position = snapshot.edit_bellows_position;
        self.edit_bellows_rate = snapshot.edit_bellows_rate;
        self.edit_bellows_timer = snapshot.edit_bellows_timer;
        self.edit_temperature_flag = snapshot.edit_temperature_flag;
        self.edit_temperature_value = snapshot.edit_temperature_value;
        self.hold_accum_flag = snapshot.hold_accum_flag;
        self.hold_temperature_flag = snapshot.hold_temperature_flag;
        self.pressurizer_oride_bellows_flag = snapshot.pressurizer_oride_bellows_flag;
        self.bellows_stuck = snapshot.bellows_stuck;
        self.bellows_malf_set = snapshot.bellows_malf_set;
        self.edits_are_reactive = snapshot.edits_are_reactive;
        self.simultaneous_edits_in_progress = snapshot.simultaneous_edits_in_progress;
        self.malf_bellows_stick_flag = snapshot.malf_bellows_stick_flag;
        self.malf_bellows_stick_to_pos_flag = snapshot.malf_bellows_stick_to_pos_flag;
        self.malf_bellows_stick_to_pos_value = snapshot.malf_bellows_stick_to_pos_value;
        self.malf_bellows_stick_to_pos_rate = snapshot.malf_bellows_stick_to_pos_rate;
        self.fill_mode = snapshot.fill_mode;
        self.bellows_zone = snapshot.bellows_zone;
        if let (Some(gas), Some(snap)) = (self.gas.as_mut(), snapshot.gas.as_ref()) {
            gas.restore(snap);
        }
        Ok(())
    }
}

impl FluidLink for Accumulator {
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
        self.update_capacitance();
        self.update_effective_conductance(nodes, dt);
        self.build_conductance();
        self.build_potential();
        if self.gas.is_some() {
            self.build_gas_conductance();
            self.build_gas_potential();
        }
    }

    fn compute_flows(&mut self, nodes: &mut NodeList, _dt: f64) {
        let liquid_node = self.ports[LIQUID_PORT];
        self.io.flux = (nodes.node(liquid_node).potential() - self.liquid.pressure())
            * self.io.admittance_matrix[3];
        self.io.port_directions[0] = PortDirection::None;
        self.io.port_directions[1] = PortDirection::None;
        if self.io.flux > f64::EPSILON {
            nodes.node_mut(liquid_node).schedule_outflux(self.io.flux);
            self.io.port_directions[LIQUID_PORT] = PortDirection::Source;
        } else if self.io.flux < -f64::EPSILON {
            self.io.port_directions[LIQUID_PORT] = PortDirection::Sink;
        }
        if self.gas.is_some() {
            self.compute_gas_flows(nodes);
        }
    }

    fn transport_flows(&mut self, nodes: &mut NodeList, dt: f64) {
        // Malfunction logic reasserts this below when applicable.
        self.bellows_stuck = false;

        let liquid_node = self.ports[LIQUID_PORT];
        self.io.flow_rate =
            compute_flow_rate(self.io.flux, nodes.node(liquid_node), &self.liquid);
        self.io.vol_flow_rate =
            compute_vol_flow_rate(self.io.flow_rate, nodes.node(liquid_node), &self.liquid);

        // The temperature edit applies at any time, regardless of malfs or
        // other overrides, and is the only edit shared directly between the
        // liquid and pressurizer chambers.
        if self.edit_temperature_flag {
            self.edit_temperature_liquid();
            self.edit_pressurizer_temperature();
            self.edit_temperature_flag = false;
        }

        if self.pressurizer_oride_bellows_flag {
            self.pressurizer_oride_bellows(nodes, dt);
        } else if self.malf_bellows_stick_flag || self.malf_bellows_stick_to_pos_flag {
            self.reset_edit_flags_and_timers();
            self.fail_liq_chamber(nodes, dt);
        } else if self.edit_bellows_flag {
            self.edit_liq_chamber(nodes, dt);
        } else {
            self.edit_bellows_timer = 0.0;
            self.update_liq_chamber(nodes, dt);
        }

        transport_accum_fluid(
            self.io.flow_rate,
            nodes.node_mut(liquid_node),
            &self.liquid,
        );
        self.update_pressurizer_fluid(nodes, dt);
        self.update_pressure(nodes);
    }

    fn restart(&mut self) {
        self.bellows_zone = BellowsZone::Middle;
        self.fill_mode = FillMode::Equalized;
    }

    /// Port 0 must be the ground node or a gas node; port 1 must be a
    /// non-ground liquid node.
    fn check_specific_port_rules(&self, nodes: &NodeList, port: usize, node: usize) -> bool {
        let mut result = true;
        if port == 0
            && !nodes.is_ground(node)
            && nodes.node(node).content().phase() != Phase::Gas
        {
            tracing::warn!(
                link = %self.name,
                "aborted setting a port: must assign port 0 to a gas node or the boundary node"
            );
            result = false;
        }
        if port == 1 && nodes.is_ground(node) {
            tracing::warn!(
                link = %self.name,
                "aborted setting a port: cannot assign port 1 (liquid port) to the boundary node"
            );
            result = false;
        }
        if port == 1 && !nodes.is_ground(node) && nodes.node(node).content().phase() != Phase::Liquid
        {
            tracing::warn!(
                link = %self.name,
                "aborted setting a port: must assign port 1 to a liquid node"
            );
            result = false;
        }
        result
    }
}

fn validate(name: &str, config: &AccumulatorConfig, input: &AccumulatorInput) -> LinkResult<()> {
    let invalid = |rule: &'static str| LinkError::InvalidConfig {
        link: name.to_string(),
        rule,
    };
    if config.max_conductance < 0.0 {
        return Err(invalid("max conductance < 0"));
    }
    if !is_in_range(f64::EPSILON, config.min_conductance_scale, 1.0) {
        return Err(invalid("min conductance scale must be within [epsilon, 1]"));
    }
    if config.accum_volume <= f32::EPSILON as f64 {
        return Err(invalid("accumulator volume too small"));
    }
    if config.min_chamber_vol_pct <= 0.0 {
        return Err(invalid("min chamber volume percentage must be > 0"));
    }
    if config.min_chamber_vol_pct >= 50.0 {
        return Err(invalid("min chamber volume percentage must be < 50"));
    }
    if config.min_deadband_vol_pct <= config.min_chamber_vol_pct {
        return Err(invalid(
            "dead band percentage must exceed min chamber volume percentage",
        ));
    }
    if config.min_deadband_vol_pct >= 50.0 {
        return Err(invalid("dead band percentage must be < 50"));
    }
    if config.force_bellows_max_rate <= 0.0 {
        return Err(invalid("force bellows max rate must be > 0"));
    }
    if config.edit_hold_time < 0.0 {
        return Err(invalid("edit hold time cannot be < 0"));
    }
    if config.min_temperature <= 0.0 {
        return Err(invalid("min temperature must be > 0 K"));
    }
    if config.max_temperature <= config.min_temperature {
        return Err(invalid("max temperature must exceed min temperature"));
    }
    if config.max_pressure < f64::EPSILON {
        return Err(invalid("max pressure must be >= epsilon"));
    }
    if config.fill_mode_pressure_threshold > f64::EPSILON
        && config.eff_cond_scale_one_way_rate < f64::EPSILON
    {
        return Err(invalid(
            "one-way conductance scale rate required with a fill mode pressure threshold",
        ));
    }
    if !is_in_range(0.0, input.initial_bellows_position, 1.0) {
        return Err(LinkError::InvalidInput {
            link: name.to_string(),
            rule: "initial bellows position must be within [0, 1]",
        });
    }
    if input.liquid_fluid.is_none() {
        return Err(LinkError::InvalidInput {
            link: name.to_string(),
            rule: "liquid fluid input is required",
        });
    }
    Ok(())
}

// -------------------------------------------------------------------------
// Shared helpers for the accumulator family
// -------------------------------------------------------------------------

pub(crate) struct RampResult {
    pub complete: bool,
    pub current: f64,
    pub target: f64,
    pub rate: f64,
}

/// Ramps `current` toward `target` at `rate` without overshoot. Target and
/// rate are clamped into their limits and returned so callers can surface
/// the clamping. Completion is an exact-equality check against the clamped
/// target; both operands come from the same min/max snap, so the comparison
/// is well defined.
#[allow(clippy::too_many_arguments)]
pub(crate) fn ramp_value(
    dt: f64,
    mut current: f64,
    mut target: f64,
    mut rate: f64,
    target_lower: f64,
    target_upper: f64,
    rate_lower: f64,
    rate_upper: f64,
) -> RampResult {
    target = limit_range(target_lower, target, target_upper);
    rate = limit_range(rate_lower, rate, rate_upper);
    let step = rate * dt;

    if target > current {
        current = (current + step).min(target);
    } else if target < current {
        current = (current - step).max(target);
    }
    RampResult {
        complete: target == current,
        current,
        target,
        rate,
    }
}

/// Advances an edit-hold timer; expired once the timer reaches its limit.
pub(crate) fn process_timer(dt: f64, mut timer: f64, limit: f64) -> (bool, f64) {
    let mut expired = true;
    if timer < limit {
        timer += dt;
        expired = false;
    }
    (expired, timer)
}

/// Conductance from capacitance over the time step, bounded by the limits.
/// A max below min is a debug aid (closing a chamber off); it falls back to
/// a zero floor.
pub(crate) fn compute_conductance(
    capacitance: f64,
    max_conductance: f64,
    current_conductance: f64,
    min_conductance: f64,
    dt: f64,
) -> f64 {
    let mut conductance = current_conductance;
    if dt > f64::EPSILON {
        if max_conductance >= min_conductance {
            conductance = limit_range(min_conductance, capacitance / dt, max_conductance);
        } else {
            conductance = limit_range(0.0, capacitance / dt, max_conductance);
        }
    }
    conductance
}

/// Mass flow from molar flux: inflow carries the node's outflow molecular
/// weight, outflow the chamber's.
pub(crate) fn compute_flow_rate(flux: f64, node: &Node, fluid: &Fluid) -> f64 {
    if flux > 0.0 {
        flux * node.outflow().mweight()
    } else if flux < 0.0 {
        flux * fluid.mweight()
    } else {
        0.0
    }
}

/// Volumetric flow with the density rule matching `compute_flow_rate`.
pub(crate) fn compute_vol_flow_rate(flow_rate: f64, node: &Node, fluid: &Fluid) -> f64 {
    if flow_rate > 0.0 {
        flow_rate / node.outflow().density()
    } else if flow_rate < 0.0 {
        flow_rate / fluid.density()
    } else {
        0.0
    }
}

/// Mass after one pass of flow; sub-threshold flows leave mass untouched.
/// Floored at epsilon so chamber mass is always strictly positive.
pub(crate) fn compute_mass_from_flow(dt: f64, flow_rate: f64, current_mass: f64) -> f64 {
    let mut new_mass = current_mass;
    if flow_rate.abs() > FLOW_EPSILON {
        new_mass = current_mass + flow_rate * dt;
    }
    new_mass.max(f64::EPSILON)
}

pub(crate) fn compute_mass_from_volume(volume: f64, density: f64) -> f64 {
    (volume * density).max(f64::EPSILON)
}

/// Adds the chamber flow to the node's collection terms. Positive flow is
/// into the accumulator.
pub(crate) fn transport_accum_fluid(flow_rate: f64, node: &mut Node, fluid: &Fluid) {
    if flow_rate > FLOW_EPSILON {
        node.collect_outflux(flow_rate);
    } else if flow_rate < -FLOW_EPSILON {
        node.collect_influx(-flow_rate, fluid);
    }
}
