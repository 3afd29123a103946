use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use tracing::info;

use crate::engine::assignment::open_assignment_for_driver;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, LicenseClass, PreferredZone, Truck};
use crate::models::zone::Zone;
use crate::state::AppState;

const NATIONAL_ID_LEN: usize = 10;
const MAX_PROVINCE_CODE: u32 = 24;
const MAX_TRUCK_ID_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct NewDriver {
    pub national_id: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub license_class: LicenseClass,
    pub preferred_zone: Option<PreferredZone>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DriverFilter {
    pub status: Option<DriverStatus>,
    pub zone: Option<Zone>,
}

impl DriverFilter {
    pub fn matches(&self, driver: &Driver) -> bool {
        self.status.is_none_or(|status| driver.status == status)
            && self.zone.is_none_or(|zone| driver.preferred_zone.covers(zone))
    }
}

pub fn register_driver(state: &AppState, new: NewDriver) -> Result<Driver, AppError> {
    let national_id = new.national_id.trim().to_string();
    validate_national_id(&national_id)?;

    let full_name = new.full_name.trim().to_string();
    let name_len = full_name.chars().count();
    if !(5..=100).contains(&name_len) {
        return Err(AppError::Validation(
            "nombre_completo must be 5-100 characters".to_string(),
        ));
    }

    let phone = new
        .phone
        .map(|phone| phone.trim().to_string())
        .filter(|phone| !phone.is_empty());
    if let Some(phone) = &phone {
        if !(9..=10).contains(&phone.len()) || !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::Validation(
                "telefono must be 9-10 digits".to_string(),
            ));
        }
    }

    let driver = match state.national_ids.entry(national_id.clone()) {
        Entry::Occupied(existing) => {
            return Err(AppError::Conflict(format!(
                "driver with cedula {national_id} already exists (id {})",
                existing.get()
            )));
        }
        Entry::Vacant(slot) => {
            let now = Utc::now();
            let driver = Driver {
                id: state.driver_ids.next(),
                national_id,
                full_name,
                phone,
                license_class: new.license_class,
                preferred_zone: new.preferred_zone.unwrap_or_default(),
                status: DriverStatus::Active,
                created_at: now,
                updated_at: now,
            };
            state.drivers.insert(driver.id, driver.clone());
            slot.insert(driver.id);
            driver
        }
    };

    info!(
        driver_id = driver.id,
        license = ?driver.license_class,
        preferred_zone = ?driver.preferred_zone,
        "driver registered"
    );

    Ok(driver)
}

fn validate_national_id(national_id: &str) -> Result<(), AppError> {
    if national_id.len() != NATIONAL_ID_LEN || !national_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(format!(
            "cedula must be exactly {NATIONAL_ID_LEN} digits"
        )));
    }

    let province: u32 = national_id[..2]
        .parse()
        .map_err(|_| AppError::Validation("cedula province code is not numeric".to_string()))?;
    if !(1..=MAX_PROVINCE_CODE).contains(&province) {
        return Err(AppError::Validation(format!(
            "cedula province code must be 01-{MAX_PROVINCE_CODE}"
        )));
    }

    Ok(())
}

pub fn get_driver(state: &AppState, id: u64) -> Result<Driver, AppError> {
    state
        .drivers
        .get(&id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
}

pub fn list_drivers(state: &AppState, filter: DriverFilter) -> Vec<Driver> {
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .filter(|entry| filter.matches(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by_key(|driver| driver.id);
    drivers
}

/// Active drivers holding no open assignment.
pub fn available_drivers(state: &AppState, zone: Option<Zone>) -> Vec<Driver> {
    let filter = DriverFilter {
        status: Some(DriverStatus::Active),
        zone,
    };

    list_drivers(state, filter)
        .into_iter()
        .filter(|driver| open_assignment_for_driver(state, driver.id).is_none())
        .collect()
}

pub async fn set_driver_status(
    state: &AppState,
    id: u64,
    status: DriverStatus,
) -> Result<Driver, AppError> {
    let _dispatch_guard = state.dispatch_lock.lock().await;

    if status == DriverStatus::Inactive {
        if let Some(open) = open_assignment_for_driver(state, id) {
            return Err(AppError::InvalidState(format!(
                "driver {id} holds open assignment {} on route {}",
                open.id, open.route_id
            )));
        }
    }

    let driver = {
        let mut entry = state
            .drivers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;
        entry.status = status;
        entry.updated_at = Utc::now();
        entry.clone()
    };

    info!(driver_id = id, status = %status, "driver status changed");

    Ok(driver)
}

/// Validates the truck fields of an assignment request and returns them
/// normalised.
pub(crate) fn check_truck(
    state: &AppState,
    truck_id: &str,
    truck_type: &str,
) -> Result<(String, String), AppError> {
    let truck_id = truck_id.trim();
    let truck_type = truck_type.trim().to_lowercase();

    if truck_id.is_empty() || truck_id.len() > MAX_TRUCK_ID_LEN {
        return Err(AppError::Validation(format!(
            "camion_id must be 1-{MAX_TRUCK_ID_LEN} characters"
        )));
    }

    if !state
        .config
        .truck_classes
        .iter()
        .any(|class| class.eq_ignore_ascii_case(&truck_type))
    {
        return Err(AppError::Validation(format!(
            "unknown camion_tipo: {truck_type}, expected one of {}",
            state.config.truck_classes.join("/")
        )));
    }

    if let Some(known) = state.trucks.get(truck_id) {
        if known.class != truck_type {
            return Err(AppError::Validation(format!(
                "truck {truck_id} is registered as {}, not {truck_type}",
                known.class
            )));
        }
    }

    Ok((truck_id.to_string(), truck_type))
}

pub(crate) fn record_truck(state: &AppState, truck_id: &str, truck_type: &str, now: DateTime<Utc>) {
    state
        .trucks
        .entry(truck_id.to_string())
        .or_insert_with(|| Truck {
            id: truck_id.to_string(),
            class: truck_type.to_string(),
            first_seen_at: now,
        });
}

pub fn list_trucks(state: &AppState) -> Vec<Truck> {
    let mut trucks: Vec<Truck> = state
        .trucks
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    trucks.sort_by(|a, b| a.id.cmp(&b.id));
    trucks
}
