use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    #[serde(rename = "activo")]
    Active,
    #[serde(rename = "inactivo")]
    Inactive,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverStatus::Active => "activo",
            DriverStatus::Inactive => "inactivo",
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "activo" => Ok(DriverStatus::Active),
            "inactivo" => Ok(DriverStatus::Inactive),
            other => Err(AppError::Validation(format!(
                "unknown driver status: {other}, expected activo/inactivo"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseClass {
    C,
    D,
    E,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredZone {
    #[serde(rename = "oriental")]
    Eastern,
    #[serde(rename = "occidental")]
    Western,
    #[serde(rename = "ambas")]
    Both,
}

impl Default for PreferredZone {
    fn default() -> Self {
        PreferredZone::Both
    }
}

impl PreferredZone {
    pub fn covers(&self, zone: Zone) -> bool {
        match self {
            PreferredZone::Both => true,
            PreferredZone::Eastern => zone == Zone::Eastern,
            PreferredZone::Western => zone == Zone::Western,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: u64,
    #[serde(rename = "cedula")]
    pub national_id: String,
    #[serde(rename = "nombre_completo")]
    pub full_name: String,
    #[serde(rename = "telefono")]
    pub phone: Option<String>,
    #[serde(rename = "licencia_tipo")]
    pub license_class: LicenseClass,
    #[serde(rename = "zona_preferida")]
    pub preferred_zone: PreferredZone,
    #[serde(rename = "estado")]
    pub status: DriverStatus,
    #[serde(rename = "creado_en")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "actualizado_en")]
    pub updated_at: DateTime<Utc>,
}

/// A truck seen in at least one assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truck {
    #[serde(rename = "camion_id")]
    pub id: String,
    #[serde(rename = "camion_tipo")]
    pub class: String,
    #[serde(rename = "registrado_en")]
    pub first_seen_at: DateTime<Utc>,
}
