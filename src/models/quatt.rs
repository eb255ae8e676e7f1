//! Typed models for the Quatt mobile API and the CIC mode code tables.
//!
//! Scope: types only — no API client code.
//!
//! Notes
//! - The telemetry feed itself is schemaless and stays `serde_json::Value`
//!   (see `crate::client::TelemetrySnapshot`); only the auth/pairing
//!   responses are decoded into structs here.
//! - Mode enums are integer-coded on the wire; unknown codes are kept as
//!   `None` rather than an error since the firmware grows new codes.

use serde::Deserialize;

// =====================
// Supervisory control modes
// =====================

/// System-wide operating state reported at `qc.supervisoryControlMode`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SupervisoryControlMode {
    Standby,
    StandbyHeating,
    HeatingHeatpumpOnly,
    HeatingHeatpumpPlusBoiler,
    HeatingBoilerOnly,
    AntifreezeBoilerOn,
    AntifreezeBoilerPrepump,
    AntifreezeWaterCirculation,
    FaultCirculationPumpOn,
}

impl SupervisoryControlMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Standby),
            1 => Some(Self::StandbyHeating),
            2 => Some(Self::HeatingHeatpumpOnly),
            3 => Some(Self::HeatingHeatpumpPlusBoiler),
            4 => Some(Self::HeatingBoilerOnly),
            96 => Some(Self::AntifreezeBoilerOn),
            97 => Some(Self::AntifreezeBoilerPrepump),
            98 => Some(Self::AntifreezeWaterCirculation),
            99 => Some(Self::FaultCirculationPumpOn),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Standby => 0,
            Self::StandbyHeating => 1,
            Self::HeatingHeatpumpOnly => 2,
            Self::HeatingHeatpumpPlusBoiler => 3,
            Self::HeatingBoilerOnly => 4,
            Self::AntifreezeBoilerOn => 96,
            Self::AntifreezeBoilerPrepump => 97,
            Self::AntifreezeWaterCirculation => 98,
            Self::FaultCirculationPumpOn => 99,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Standby => "Standby",
            Self::StandbyHeating => "Standby - heating",
            Self::HeatingHeatpumpOnly => "Heating - heatpump only",
            Self::HeatingHeatpumpPlusBoiler => "Heating - heatpump + boiler",
            Self::HeatingBoilerOnly => "Heating - boiler only",
            Self::AntifreezeBoilerOn => "Anti-freeze protection - boiler on",
            Self::AntifreezeBoilerPrepump => "Anti-freeze protection - boiler pre-pump",
            Self::AntifreezeWaterCirculation => "Anti-freeze protection - water circulation",
            Self::FaultCirculationPumpOn => "Fault - circulation pump on",
        }
    }
}

/// Operating state of an all-electric installation's heat battery,
/// reported at `qcAllE.allESupervisoryControlMode`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AllElectricSupervisoryControlMode {
    Idle,
    PrePostPumping,
    ChargeNormal,
    ChargeBoost,
    ChargeBackup,
    ChargeNormalBackup,
    ChargeChBackup,
    ChBackup,
    Discharge,
    DischargeChBackup,
    StickyPumpProtection,
    PrePostPumpToCharging,
    PrePostPumpToDischarging,
}

impl AllElectricSupervisoryControlMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Idle),
            1 => Some(Self::PrePostPumping),
            2 => Some(Self::ChargeNormal),
            3 => Some(Self::ChargeBoost),
            4 => Some(Self::ChargeBackup),
            5 => Some(Self::ChargeNormalBackup),
            6 => Some(Self::ChargeChBackup),
            7 => Some(Self::ChBackup),
            8 => Some(Self::Discharge),
            9 => Some(Self::DischargeChBackup),
            10 => Some(Self::StickyPumpProtection),
            11 => Some(Self::PrePostPumpToCharging),
            12 => Some(Self::PrePostPumpToDischarging),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::PrePostPumping => "Pre/post pumping",
            Self::ChargeNormal => "Charge - normal",
            Self::ChargeBoost => "Charge - boost",
            Self::ChargeBackup => "Charge - backup",
            Self::ChargeNormalBackup => "Charge - normal backup",
            Self::ChargeChBackup => "Charge - CH backup",
            Self::ChBackup => "CH backup",
            Self::Discharge => "Discharge",
            Self::DischargeChBackup => "Discharge CH backup",
            Self::StickyPumpProtection => "Sticky pump protection",
            Self::PrePostPumpToCharging => "Pre/post pump to charging",
            Self::PrePostPumpToDischarging => "Pre/post pump to discharging",
        }
    }
}

/// Electricity contract type at `system.electricityTariffType`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ElectricityTariffType {
    Single,
    Double,
    Dynamic,
}

impl ElectricityTariffType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Single),
            1 => Some(Self::Double),
            2 => Some(Self::Dynamic),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Single => "Single tariff",
            Self::Double => "Double tariff",
            Self::Dynamic => "Dynamic tariff",
        }
    }
}

/// Gas contract type at `system.gasTariffType`. There is no double gas
/// tariff; code 1 is unassigned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GasTariffType {
    Single,
    Dynamic,
}

impl GasTariffType {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Single),
            2 => Some(Self::Dynamic),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Single => "Single tariff",
            Self::Dynamic => "Dynamic tariff",
        }
    }
}

// =====================
// Cloud API response models
// =====================

/// `POST …/installations` response: ephemeral Firebase installation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseInstallationResponse {
    pub fid: Option<String>,
    #[serde(default)]
    pub auth_token: Option<FirebaseAuthToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FirebaseAuthToken {
    pub token: Option<String>,
}

/// `signupNewUser` response (camelCase field names).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Secure-token refresh response. Unlike signup this endpoint uses
/// snake_case field names; both shapes are service-mandated.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// `GET /me` envelope, used while polling for pairing completion.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEnvelope {
    #[serde(default)]
    pub result: Option<Account>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub cic_ids: Vec<String>,
}

/// `GET /me/installations` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallationsEnvelope {
    #[serde(default)]
    pub result: Vec<Installation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub external_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervisory_mode_codes_round_trip() {
        for code in [0, 1, 2, 3, 4, 96, 97, 98, 99] {
            let mode = SupervisoryControlMode::from_code(code).expect("known code");
            assert_eq!(mode.code(), code);
        }
        assert!(SupervisoryControlMode::from_code(5).is_none());
        assert!(SupervisoryControlMode::from_code(100).is_none());
    }

    #[test]
    fn gas_tariff_skips_code_one() {
        assert_eq!(GasTariffType::from_code(0), Some(GasTariffType::Single));
        assert!(GasTariffType::from_code(1).is_none());
        assert_eq!(GasTariffType::from_code(2), Some(GasTariffType::Dynamic));
    }

    #[test]
    fn account_envelope_parses_cic_ids() {
        let json = r#"{"result": {"cicIds": ["CIC-abc123"], "email": null}}"#;
        let env: AccountEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.result.unwrap().cic_ids, vec!["CIC-abc123".to_string()]);
    }

    #[test]
    fn installations_envelope_tolerates_missing_external_id() {
        let json = r#"{"result": [{"name": "home"}, {"externalId": "INS-0001"}]}"#;
        let env: InstallationsEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.result.len(), 2);
        assert!(env.result[0].external_id.is_none());
        assert_eq!(env.result[1].external_id.as_deref(), Some("INS-0001"));
    }
}
