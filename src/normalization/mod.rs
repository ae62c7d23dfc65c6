//! Per-capita rates over aggregated series.

use crate::error::{CoreError, CoreResult};
use crate::models::{NormalizedRow, ProvinceStats, TimeSeriesRow};

pub const PER_100K: f64 = 100_000.0;
pub const PER_MILLION: f64 = 1_000_000.0;

/// Decimal digits kept on every rate column.
pub const RATE_DIGITS: usize = 5;

/// Round to `digits` decimals, ties to even, on the exact decimal value of
/// `value` (so 2.675 rounds down: its binary value is below the tie).
pub fn round_half_even(value: f64, digits: usize) -> f64 {
    if !value.is_finite() {
        return value;
    }
    format!("{value:.digits$}").parse().unwrap_or(value)
}

fn check_population(population: f64) -> CoreResult<f64> {
    if population.is_nan() || population <= 0.0 {
        return Err(CoreError::InvalidPopulation(population));
    }
    Ok(population)
}

fn rate(count: u64, base: f64, population: f64) -> f64 {
    round_half_even(count as f64 * base / population, RATE_DIGITS)
}

/// Attach per-100k and per-million rates to every row.
///
/// Fails as a whole on a non-positive population; no partial output.
pub fn normalize(series: &[TimeSeriesRow], population: f64) -> CoreResult<Vec<NormalizedRow>> {
    let population = check_population(population)?;

    Ok(series
        .iter()
        .map(|row| NormalizedRow {
            date: row.date,
            cases: row.cases,
            deaths: row.deaths,
            cases_cumulative: row.cases_cumulative,
            deaths_cumulative: row.deaths_cumulative,
            cases_per_100k: rate(row.cases, PER_100K, population),
            deaths_per_100k: rate(row.deaths, PER_100K, population),
            cases_cum_per_100k: rate(row.cases_cumulative, PER_100K, population),
            deaths_cum_per_100k: rate(row.deaths_cumulative, PER_100K, population),
            cases_per_million: rate(row.cases, PER_MILLION, population),
            deaths_per_million: rate(row.deaths, PER_MILLION, population),
            cases_cum_per_million: rate(row.cases_cumulative, PER_MILLION, population),
            deaths_cum_per_million: rate(row.deaths_cumulative, PER_MILLION, population),
        })
        .collect())
}

/// Headline totals for a region. Rates are whole numbers; lethality keeps
/// four decimals and is zero when there are no cases.
pub fn summarize(name: &str, population: f64, cases: u64, deaths: u64) -> CoreResult<ProvinceStats> {
    let population = check_population(population)?;
    let per = |count: u64, base: f64| round_half_even(count as f64 * base / population, 0);

    let lethality = if cases == 0 {
        0.0
    } else {
        round_half_even(deaths as f64 / cases as f64, 4)
    };

    Ok(ProvinceStats {
        name: name.to_string(),
        population: population as u64,
        cases,
        deaths,
        cases_per_million: per(cases, PER_MILLION),
        cases_per_100k: per(cases, PER_100K),
        deaths_per_million: per(deaths, PER_MILLION),
        deaths_per_100k: per(deaths, PER_100K),
        lethality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, cases: u64, deaths: u64, cc: u64, dc: u64) -> TimeSeriesRow {
        TimeSeriesRow {
            date: NaiveDate::from_ymd_opt(2020, 3, day).unwrap(),
            cases,
            deaths,
            cases_cumulative: cc,
            deaths_cumulative: dc,
        }
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(0.125, 2), 0.12);
        assert_eq!(round_half_even(0.375, 2), 0.38);
        assert_eq!(round_half_even(2.5, 0), 2.0);
        assert_eq!(round_half_even(3.5, 0), 4.0);
        assert_eq!(round_half_even(2.675, 2), 2.67);
        assert_eq!(round_half_even(33333.333333333, 5), 33333.33333);
        assert!(round_half_even(f64::NAN, 5).is_nan());
    }

    #[test]
    fn test_population_of_100k_is_identity() {
        let series = vec![row(1, 2, 0, 2, 0), row(2, 0, 0, 2, 0), row(3, 7, 3, 9, 3)];
        let out = normalize(&series, 100_000.0).unwrap();
        assert_eq!(out.len(), series.len());
        for (n, r) in out.iter().zip(&series) {
            assert_eq!(n.cases_per_100k, r.cases as f64);
            assert_eq!(n.deaths_per_100k, r.deaths as f64);
            assert_eq!(n.cases_cum_per_100k, r.cases_cumulative as f64);
            assert_eq!(n.deaths_cum_per_million, r.deaths_cumulative as f64 * 10.0);
            assert_eq!(n.date, r.date);
            assert_eq!(n.cases_cumulative, r.cases_cumulative);
        }
    }

    #[test]
    fn test_rates_are_rounded_to_five_digits() {
        let out = normalize(&[row(1, 1, 1, 2, 1)], 3.0).unwrap();
        assert_eq!(out[0].cases_per_100k, 33333.33333);
        assert_eq!(out[0].cases_cum_per_100k, 66666.66667);
        assert_eq!(out[0].cases_per_million, 333333.33333);
        assert_eq!(out[0].deaths_cum_per_million, 333333.33333);
    }

    #[test]
    fn test_invalid_population() {
        let series = vec![row(1, 1, 0, 1, 0)];
        assert_eq!(normalize(&series, 0.0), Err(CoreError::InvalidPopulation(0.0)));
        assert_eq!(normalize(&series, -5.0), Err(CoreError::InvalidPopulation(-5.0)));
        assert!(normalize(&series, f64::NAN).is_err());
        assert!(normalize(&[], 0.0).is_err());
    }

    #[test]
    fn test_summarize() {
        let s = summarize("Chubut", 618_994.0, 1_000, 25).unwrap();
        assert_eq!(s.population, 618_994);
        assert_eq!(s.cases_per_million, 1616.0);
        assert_eq!(s.cases_per_100k, 162.0);
        assert_eq!(s.deaths_per_million, 40.0);
        assert_eq!(s.deaths_per_100k, 4.0);
        assert_eq!(s.lethality, 0.025);

        let empty = summarize("Formosa", 605_193.0, 0, 0).unwrap();
        assert_eq!(empty.lethality, 0.0);

        assert!(summarize("X", 0.0, 1, 0).is_err());
    }
}
