//! Derived metrics over a telemetry snapshot.
//!
//! `MetricsResolver` resolves dot-separated paths against the snapshot
//! tree and dispatches the `computed*` leaf names to a fixed formula
//! registry (an explicit match, so the set of formulas is visible in one
//! place). All outputs are recomputed per query against the snapshot the
//! resolver was built over; nothing is cached, so swapping in a new
//! snapshot is the only state transition.
//!
//! Local and cloud snapshots shape the heat-pump subtrees differently
//! (fixed `hp1`/`hp2` keys vs an indexed `heatPumps` list), so the
//! resolver carries a `SnapshotShape` and derives per-unit paths and
//! topology probes from it.

use crate::client::TelemetrySnapshot;
use crate::models::quatt::{
    AllElectricSupervisoryControlMode, ElectricityTariffType, GasTariffType, SupervisoryControlMode,
};
use log::{debug, warn};
use serde_json::Value;

/// Water heat-capacity/density conversion factors by temperature (°C),
/// at the fixed system pressure. Used by the power formulas.
const CONVERSION_FACTORS: [(f64, f64); 16] = [
    (5.0, 1.166667),
    (10.0, 1.164444),
    (15.0, 1.162889),
    (20.0, 1.161111),
    (25.0, 1.157438),
    (30.0, 1.157753),
    (35.0, 1.157931),
    (40.0, 1.157964),
    (45.0, 1.157859),
    (50.0, 1.157617),
    (55.0, 1.157243),
    (60.0, 1.156742),
    (65.0, 1.156117),
    (70.0, 1.155369),
    (75.0, 1.154503),
    (80.0, 1.153528),
];

/// Nearest tabulated entry; on an exact tie the lower temperature wins.
pub fn conversion_factor(temperature: f64) -> f64 {
    let mut best = CONVERSION_FACTORS[0];
    for entry in CONVERSION_FACTORS {
        if (entry.0 - temperature).abs() < (best.0 - temperature).abs() {
            best = entry;
        }
    }
    best.1
}

/// Supervisory modes in which the heat pump is actively heating.
const HEATPUMP_HEATING_MODES: [SupervisoryControlMode; 2] = [
    SupervisoryControlMode::HeatingHeatpumpOnly,
    SupervisoryControlMode::HeatingHeatpumpPlusBoiler,
];

/// Supervisory modes in which the boiler contributes heat.
const BOILER_HEATING_MODES: [SupervisoryControlMode; 2] = [
    SupervisoryControlMode::HeatingHeatpumpPlusBoiler,
    SupervisoryControlMode::HeatingBoilerOnly,
];

/// Keys that are legitimately absent on some installation topologies:
/// `hp2` on single-heat-pump systems, `boiler` on all-electric systems,
/// `hc` on hybrid systems. Their absence is not worth a warning.
const ABSENT_KEY_WHITELIST: [&str; 3] = ["hp2", "boiler", "hc"];

/// Defrost detection thresholds. Empirically calibrated, kept adjustable
/// rather than hard-coded into the formula.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DefrostThresholds {
    /// Instantaneous heat-pump power (W) below which defrost is plausible.
    pub power_w: f64,
    /// Water delta (K) below which defrost is plausible.
    pub water_delta_k: f64,
}

impl Default for DefrostThresholds {
    fn default() -> Self {
        DefrostThresholds { power_w: -1.0, water_delta_k: -1.0 }
    }
}

/// Root layout of the snapshot tree.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SnapshotShape {
    /// Fixed `hp1`/`hp2`/`qc`/`boiler`/`hc`/`flowMeter` root keys.
    Local,
    /// Envelope-stripped cloud payload: `heatPumps` list, `allEStatus`,
    /// `isBoilerConnected`.
    Cloud,
}

pub struct MetricsResolver<'a> {
    snapshot: &'a TelemetrySnapshot,
    shape: SnapshotShape,
    external_power_w: Option<f64>,
    defrost: DefrostThresholds,
}

impl<'a> MetricsResolver<'a> {
    pub fn new(snapshot: &'a TelemetrySnapshot, shape: SnapshotShape) -> Self {
        MetricsResolver {
            snapshot,
            shape,
            external_power_w: None,
            defrost: DefrostThresholds::default(),
        }
    }

    /// Supply the host-side electrical power reading (W) used by
    /// `computedCop`. Without it the COP is absent.
    pub fn with_external_power(mut self, power_w: Option<f64>) -> Self {
        self.external_power_w = power_w;
        self
    }

    pub fn with_defrost_thresholds(mut self, thresholds: DefrostThresholds) -> Self {
        self.defrost = thresholds;
        self
    }

    // =====================
    // Path resolution
    // =====================

    /// Resolve a dot-separated path. A numeric segment indexes a list;
    /// a `computed*` leaf dispatches to the formula registry (formulas
    /// return their own result, the default does not apply to them). A
    /// missing key yields the default, with a warning unless the key is
    /// whitelisted as legitimately absent.
    pub fn resolve(&self, path: &str, default: Option<Value>) -> Option<Value> {
        let mut current = self.snapshot.root();
        let mut consumed: Vec<&str> = Vec::new();

        for part in path.split('.') {
            if current.is_null() {
                return default;
            }

            if part.starts_with("computed") && Self::is_formula(part) {
                // Formulas are leaf-only and scoped by the path prefix
                // resolved so far.
                let parent = if consumed.is_empty() { None } else { Some(consumed.join(".")) };
                return self.dispatch(part, parent.as_deref());
            }

            match current {
                Value::Object(map) => match map.get(part) {
                    Some(next) => current = next,
                    None => {
                        if ABSENT_KEY_WHITELIST.contains(&part) {
                            debug!("Could not find {} of {}", part, path);
                        } else {
                            warn!("Could not find {} of {}", part, path);
                        }
                        return default;
                    }
                },
                Value::Array(list) => match part.parse::<usize>().ok().and_then(|i| list.get(i)) {
                    Some(next) => current = next,
                    None => {
                        warn!("Could not find index {} of {}", part, path);
                        return default;
                    }
                },
                _ => {
                    warn!("Could not find {} of {}", part, path);
                    return default;
                }
            }

            consumed.push(part);
        }

        if current.is_null() { None } else { Some(current.clone()) }
    }

    fn resolve_f64(&self, path: &str) -> Option<f64> {
        self.resolve(path, None).and_then(|v| v.as_f64())
    }

    fn resolve_i64(&self, path: &str) -> Option<i64> {
        self.resolve(path, None).and_then(|v| v.as_i64())
    }

    fn is_formula(name: &str) -> bool {
        matches!(
            name,
            "computedWaterDelta"
                | "computedHeatPower"
                | "computedBoilerHeatPower"
                | "computedSystemPower"
                | "computedPowerInput"
                | "computedPower"
                | "computedCop"
                | "computedQuattCop"
                | "computedDefrost"
                | "computedSupervisoryControlMode"
                | "computedAllESupervisoryControlMode"
                | "computedElectricityTariffType"
                | "computedGasTariffType"
        )
    }

    /// The formula registry. `parent` is the path prefix resolved before
    /// the formula segment, scoping per-unit formulas to one heat pump.
    fn dispatch(&self, name: &str, parent: Option<&str>) -> Option<Value> {
        match name {
            "computedWaterDelta" => self.water_delta(parent).map(number),
            "computedHeatPower" => self.heat_power().map(number),
            "computedBoilerHeatPower" => self.boiler_heat_power().map(number),
            "computedSystemPower" => self.system_power().map(number),
            "computedPowerInput" => self.total_power_input().map(number),
            "computedPower" => self.total_power().map(number),
            "computedCop" => self.cop().map(number),
            "computedQuattCop" => self.quatt_cop(parent).map(number),
            "computedDefrost" => self.defrost_active(parent).map(Value::Bool),
            "computedSupervisoryControlMode" => self.supervisory_mode_text().map(Value::String),
            "computedAllESupervisoryControlMode" => self.all_electric_mode_text().map(Value::String),
            "computedElectricityTariffType" => self.electricity_tariff_text().map(Value::String),
            "computedGasTariffType" => self.gas_tariff_text().map(Value::String),
            _ => None,
        }
    }

    // =====================
    // Installation topology probes (recomputed per call, never cached)
    // =====================

    pub fn second_heatpump_active(&self) -> bool {
        match self.shape {
            SnapshotShape::Local => self.resolve("hp2", None).is_some(),
            SnapshotShape::Cloud => self.heatpump_count() >= 2,
        }
    }

    pub fn all_electric_active(&self) -> bool {
        let path = match self.shape {
            SnapshotShape::Local => "hc.electricalPower",
            SnapshotShape::Cloud => "allEStatus",
        };
        self.resolve(path, None).is_some()
    }

    pub fn boiler_opentherm(&self) -> bool {
        let path = match self.shape {
            SnapshotShape::Local => "boiler.otFbChModeActive",
            SnapshotShape::Cloud => "isBoilerConnected",
        };
        self.resolve(path, None).is_some()
    }

    fn heatpump_count(&self) -> usize {
        match self.snapshot.root().get("heatPumps") {
            Some(Value::Array(list)) => list.len(),
            _ => 0,
        }
    }

    /// Path prefix of one heat pump unit (1-based) in the current shape.
    fn hp_prefix(&self, unit: u8) -> String {
        match self.shape {
            SnapshotShape::Local => format!("hp{}", unit),
            SnapshotShape::Cloud => format!("heatPumps.{}", unit - 1),
        }
    }

    // =====================
    // Formulas
    // =====================

    fn heatpump_heating(state: i64) -> bool {
        HEATPUMP_HEATING_MODES.iter().any(|m| m.code() == state)
    }

    fn boiler_heating(state: i64) -> bool {
        BOILER_HEATING_MODES.iter().any(|m| m.code() == state)
    }

    /// Outlet minus inlet temperature. Scoped to one unit, or, without a
    /// scope, across the cascade: outlet of the second unit minus inlet
    /// of the first.
    fn water_delta(&self, parent: Option<&str>) -> Option<f64> {
        let (out_path, in_path) = match parent {
            Some(prefix) => (
                format!("{}.temperatureWaterOut", prefix),
                format!("{}.temperatureWaterIn", prefix),
            ),
            None => (
                format!("{}.temperatureWaterOut", self.hp_prefix(2)),
                format!("{}.temperatureWaterIn", self.hp_prefix(1)),
            ),
        };
        let water_out = self.resolve_f64(&out_path)?;
        let water_in = self.resolve_f64(&in_path)?;
        Some(round2(water_out - water_in))
    }

    /// Heat output of the heat pump(s): delta * filtered flow rate *
    /// conversion factor at the outlet temperature. Zero outright when the
    /// supervisory mode says the heat pumps are not heating.
    fn heat_power(&self) -> Option<f64> {
        let state = self.resolve_i64("qc.supervisoryControlMode")?;
        if !Self::heatpump_heating(state) {
            return Some(0.0);
        }

        let (delta, water_out) = if self.second_heatpump_active() {
            (
                self.water_delta(None),
                self.resolve_f64(&format!("{}.temperatureWaterOut", self.hp_prefix(2))),
            )
        } else {
            let hp1 = self.hp_prefix(1);
            (
                self.water_delta(Some(&hp1)),
                self.resolve_f64(&format!("{}.temperatureWaterOut", hp1)),
            )
        };
        let delta = delta?;
        let water_out = water_out?;
        let flow_rate = self.resolve_f64("qc.flowRateFiltered")?;

        let value = round2(delta * flow_rate * conversion_factor(water_out));
        Some(value.max(0.0))
    }

    /// Heat the boiler adds on top of the heat pump outlet, measured
    /// against the flow meter's supply temperature.
    fn boiler_heat_power(&self) -> Option<f64> {
        let state = self.resolve_i64("qc.supervisoryControlMode")?;
        if !Self::boiler_heating(state) {
            return Some(0.0);
        }

        let hp_out_path = if self.second_heatpump_active() {
            format!("{}.temperatureWaterOut", self.hp_prefix(2))
        } else {
            format!("{}.temperatureWaterOut", self.hp_prefix(1))
        };
        let heatpump_water_out = self.resolve_f64(&hp_out_path)?;
        let flow_rate = self.resolve_f64("qc.flowRateFiltered")?;
        let supply_temperature = self.resolve_f64("flowMeter.waterSupplyTemperature")?;

        let value = round2(
            (supply_temperature - heatpump_water_out) * flow_rate * conversion_factor(supply_temperature),
        );
        Some(value.max(0.0))
    }

    /// Heat pump output plus the auxiliary heater: the backup electric
    /// heater on all-electric installations, the boiler otherwise.
    fn system_power(&self) -> Option<f64> {
        let heater_power = if self.all_electric_active() {
            self.resolve_f64("hc.electricalPower")
        } else {
            self.boiler_heat_power()
        }?;
        let heatpump_power = self.total_power()?;
        Some(heater_power + heatpump_power)
    }

    /// Summed electrical input of the installed heat pumps.
    fn total_power_input(&self) -> Option<f64> {
        let first = self.resolve_f64(&format!("{}.powerInput", self.hp_prefix(1))).unwrap_or(0.0);
        let second = if self.second_heatpump_active() {
            self.resolve_f64(&format!("{}.powerInput", self.hp_prefix(2))).unwrap_or(0.0)
        } else {
            0.0
        };
        Some(first + second)
    }

    /// Summed thermal output of the installed heat pumps.
    fn total_power(&self) -> Option<f64> {
        let first = self.resolve_f64(&format!("{}.power", self.hp_prefix(1))).unwrap_or(0.0);
        let second = if self.second_heatpump_active() {
            self.resolve_f64(&format!("{}.power", self.hp_prefix(2))).unwrap_or(0.0)
        } else {
            0.0
        };
        Some(first + second)
    }

    /// Heat power divided by the host-supplied electrical power reading.
    /// Absent when either operand is missing or zero.
    fn cop(&self) -> Option<f64> {
        let electrical_power = self.external_power_w?;
        let heat_power = self.heat_power()?;
        if electrical_power == 0.0 || heat_power == 0.0 {
            return None;
        }
        Some(round2(heat_power / electrical_power))
    }

    /// `power / powerInput`, per unit or (without a scope) for the whole
    /// system. A zero ratio is coerced to plain 0.0 so rounding a small
    /// negative never yields -0.0.
    fn quatt_cop(&self, parent: Option<&str>) -> Option<f64> {
        let (power_input, power_output) = match parent {
            Some(prefix) => (
                self.resolve_f64(&format!("{}.powerInput", prefix))?,
                self.resolve_f64(&format!("{}.power", prefix))?,
            ),
            None => (self.total_power_input()?, self.total_power()?),
        };
        if power_input == 0.0 {
            return None;
        }
        let value = round2(power_output / power_input);
        Some(if value == 0.0 { 0.0 } else { value })
    }

    /// Heuristic defrost detection for one unit: heat-pump heating mode
    /// with power and water delta both below their thresholds. Only
    /// meaningful with a unit scope.
    fn defrost_active(&self, parent: Option<&str>) -> Option<bool> {
        let prefix = parent?;
        let state = self.resolve_i64("qc.supervisoryControlMode")?;
        let power_output = self.resolve_f64(&format!("{}.power", prefix))?;
        let water_delta = self.water_delta(Some(prefix))?;

        Some(
            Self::heatpump_heating(state)
                && power_output < self.defrost.power_w
                && water_delta < self.defrost.water_delta_k,
        )
    }

    fn supervisory_mode_text(&self) -> Option<String> {
        let state = self.resolve_i64("qc.supervisoryControlMode")?;
        if state >= 100 {
            return Some("Commissioning modes".to_string());
        }
        SupervisoryControlMode::from_code(state).map(|m| m.description().to_string())
    }

    fn all_electric_mode_text(&self) -> Option<String> {
        let state = self.resolve_i64("qcAllE.allESupervisoryControlMode")?;
        AllElectricSupervisoryControlMode::from_code(state).map(|m| m.description().to_string())
    }

    fn electricity_tariff_text(&self) -> Option<String> {
        let state = self.resolve_i64("system.electricityTariffType")?;
        ElectricityTariffType::from_code(state).map(|m| m.description().to_string())
    }

    fn gas_tariff_text(&self) -> Option<String> {
        let state = self.resolve_i64("system.gasTariffType")?;
        GasTariffType::from_code(state).map(|m| m.description().to_string())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}
