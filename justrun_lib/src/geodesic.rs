use crate::position::Position;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two positions using the haversine formula.
pub fn distance_km(a: Position, b: Position) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Length of a polyline, summing consecutive segments.
pub fn route_distance_km(route: &[Position]) -> f64 {
    route.windows(2).map(|pair| distance_km(pair[0], pair[1])).sum()
}
