//! Province reference data and population denominators.
//!
//! Codes follow INDEC resolution 55/2019. Populations are the INDEC 2020
//! projections; coordinates point at each provincial capital.

use crate::error::{CoreError, CoreResult};
use crate::models::Province;

pub const COUNTRY_NAME: &str = "Argentina";
pub const COUNTRY_POPULATION: u64 = 45_376_763;

const fn province(slug: &'static str, name: &'static str, population: u64, lat: f64, lng: f64) -> Province {
    Province { slug, name, population, lat: Some(lat), lng: Some(lng) }
}

static PROVINCES: [Province; 24] = [
    province("02", "CABA", 3_075_646, -34.6037, -58.3816),
    province("06", "Buenos Aires", 17_541_141, -34.9214, -57.9545),
    province("10", "Catamarca", 415_438, -28.4696, -65.7795),
    province("14", "Córdoba", 3_760_450, -31.4201, -64.1888),
    province("18", "Corrientes", 1_120_801, -27.4692, -58.8306),
    province("22", "Chaco", 1_204_541, -27.4606, -58.9839),
    province("26", "Chubut", 618_994, -43.3002, -65.1023),
    province("30", "Entre Ríos", 1_385_961, -31.7319, -60.5238),
    province("34", "Formosa", 605_193, -26.1775, -58.1781),
    province("38", "Jujuy", 770_881, -24.1858, -65.2995),
    province("42", "La Pampa", 358_428, -36.6203, -64.2906),
    province("46", "La Rioja", 393_531, -29.4131, -66.8558),
    province("50", "Mendoza", 1_990_338, -32.8895, -68.8458),
    province("54", "Misiones", 1_261_294, -27.3671, -55.8961),
    province("58", "Neuquén", 664_057, -38.9516, -68.0591),
    province("62", "Río Negro", 747_610, -40.8135, -62.9967),
    province("66", "Salta", 1_424_397, -24.7821, -65.4232),
    province("70", "San Juan", 781_217, -31.5375, -68.5364),
    province("74", "San Luis", 508_328, -33.3017, -66.3378),
    province("78", "Santa Cruz", 365_698, -51.6230, -69.2168),
    province("82", "Santa Fe", 3_536_418, -31.6333, -60.7000),
    province("86", "Santiago del Estero", 978_313, -27.7834, -64.2642),
    province("90", "Tucumán", 1_694_656, -26.8083, -65.2176),
    province("94", "Tierra del Fuego", 173_432, -54.8019, -68.3030),
];

/// All provinces in slug order.
pub fn provinces() -> &'static [Province] {
    &PROVINCES
}

/// Look up a province by slug. `None` means "unknown province".
pub fn resolve(slug: &str) -> Option<&'static Province> {
    let slug = slug.trim();
    PROVINCES.iter().find(|p| p.slug == slug)
}

// ── Population table ──────────────────────────────────────────────────────────

/// Source of population denominators. `None` is the whole country.
pub trait PopulationTable: Send + Sync {
    fn population_for(&self, slug: Option<&str>) -> CoreResult<f64>;
}

/// Population figures baked into the province table.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPopulation;

impl PopulationTable for StaticPopulation {
    fn population_for(&self, slug: Option<&str>) -> CoreResult<f64> {
        match slug {
            None => Ok(COUNTRY_POPULATION as f64),
            Some(s) => resolve(s)
                .map(|p| p.population as f64)
                .ok_or_else(|| CoreError::UnknownProvince(s.to_string())),
        }
    }
}
