use crate::models::incident::GeoPoint;
use crate::models::zone::Zone;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

const AREA_LAT_MIN: f64 = -0.97;
const AREA_LAT_MAX: f64 = -0.90;
const AREA_LON_MIN: f64 = -78.65;
const AREA_LON_MAX: f64 = -78.58;

/// Longitude of the highway that splits the service area.
const ZONE_DIVIDER_LON: f64 = -78.615;

pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lon = (delta_lon / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_M * central_angle
}

pub fn within_service_area(point: &GeoPoint) -> bool {
    (AREA_LAT_MIN..=AREA_LAT_MAX).contains(&point.lat)
        && (AREA_LON_MIN..=AREA_LON_MAX).contains(&point.lon)
}

/// Zone of a point inside the service area; `None` outside it.
pub fn classify_zone(point: &GeoPoint) -> Option<Zone> {
    if !within_service_area(point) {
        return None;
    }

    if point.lon > ZONE_DIVIDER_LON {
        Some(Zone::Eastern)
    } else {
        Some(Zone::Western)
    }
}
