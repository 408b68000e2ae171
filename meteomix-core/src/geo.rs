use crate::{error::WeatherError, model::Coordinates};

/// Cities known to the fixed lookup table. A production deployment would
/// swap this for a real geocoding service (e.g. Nominatim); the fixed table
/// is the documented contract for now.
const CITIES: &[(&str, Coordinates)] = &[
    ("paris", Coordinates { lat: 48.8566, lon: 2.3522 }),
    ("london", Coordinates { lat: 51.5074, lon: -0.1278 }),
    ("new york", Coordinates { lat: 40.7128, lon: -74.0060 }),
    ("tokyo", Coordinates { lat: 35.6762, lon: 139.6503 }),
];

/// Resolve a city name to coordinates. Lookup is case-insensitive and has no
/// side effects; unknown cities fail with [`WeatherError::NotFound`].
pub fn resolve(city: &str) -> Result<Coordinates, WeatherError> {
    let lower = city.to_lowercase();

    CITIES
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, coords)| *coords)
        .ok_or_else(|| WeatherError::NotFound(format!("coordinates for city: {city}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_case_insensitive() {
        let a = resolve("Paris").unwrap();
        let b = resolve("PARIS").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.lat, 48.8566);
        assert_eq!(a.lon, 2.3522);
    }

    #[test]
    fn resolve_is_stable_across_calls() {
        for city in ["paris", "london", "new york", "tokyo"] {
            let first = resolve(city).unwrap();
            let second = resolve(city).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn unknown_city_is_not_found() {
        let err = resolve("Atlantis").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Atlantis"));
    }
}
