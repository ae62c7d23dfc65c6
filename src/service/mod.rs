//! Query entry points: store → aggregator → normalizer.
//!
//! Every operation takes an optional province slug. An unknown slug is not
//! an error; it yields an empty result (zero count, no rows, no stats).

use crate::aggregation::{aggregate, DateWindow, GroupKey};
use crate::models::{CaseFilter, CaseRecord, NormalizedRow, Province, ProvinceStats};
use crate::normalization::{normalize, summarize};
use crate::provinces::{self, PopulationTable, StaticPopulation, COUNTRY_NAME};
use crate::storage::{Field, RecordSet, RecordStore};
use anyhow::Result;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// Province scope of a request.
enum Scope {
    Country,
    Province(&'static Province),
    Unknown,
}

pub struct CovidService<S: RecordStore + ?Sized, P: PopulationTable = StaticPopulation> {
    store: Arc<S>,
    population: P,
}

impl<S: RecordStore + ?Sized> CovidService<S, StaticPopulation> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, population: StaticPopulation }
    }
}

impl<S: RecordStore + ?Sized, P: PopulationTable> CovidService<S, P> {
    pub fn with_population(store: Arc<S>, population: P) -> Self {
        Self { store, population }
    }

    fn scope(slug: Option<&str>) -> Scope {
        match slug {
            None => Scope::Country,
            Some(s) => match provinces::resolve(s) {
                Some(p) => Scope::Province(p),
                None => {
                    debug!("Unknown province slug {:?}", s);
                    Scope::Unknown
                }
            },
        }
    }

    fn scoped_set(&self, filter: &CaseFilter, province: &Province) -> RecordSet<'_, S> {
        RecordSet::new(self.store.as_ref())
            .with_filter(filter)
            .filter_eq(Field::Province, province.name)
    }

    fn country_set(&self, filter: &CaseFilter) -> RecordSet<'_, S> {
        RecordSet::new(self.store.as_ref()).with_filter(filter)
    }

    /// Matching case records.
    pub fn cases(&self, filter: &CaseFilter, province: Option<&str>) -> Result<Vec<CaseRecord>> {
        match Self::scope(province) {
            Scope::Country => self.country_set(filter).records(),
            Scope::Province(p) => self.scoped_set(filter, p).records(),
            Scope::Unknown => Ok(Vec::new()),
        }
    }

    /// Number of matching case records.
    pub fn count(&self, filter: &CaseFilter, province: Option<&str>) -> Result<u64> {
        match Self::scope(province) {
            Scope::Country => self.country_set(filter).count(),
            Scope::Province(p) => self.scoped_set(filter, p).count(),
            Scope::Unknown => Ok(0),
        }
    }

    /// Date the source last stamped the dataset (`ultima_actualizacion`).
    pub fn last_update(&self) -> Result<Option<NaiveDate>> {
        Ok(self.store.max_value(Field::LastUpdated)?.and_then(|v| v.as_date()))
    }

    /// Latest diagnosis date in the full, unfiltered dataset.
    pub fn last_diagnosis_date(&self) -> Result<Option<NaiveDate>> {
        Ok(self.store.max_value(Field::DiagnosisDate)?.and_then(|v| v.as_date()))
    }

    /// Calendar-complete, per-capita daily series for the filtered records.
    ///
    /// The window runs from `filter.date_from` (default: dataset epoch) to
    /// `filter.date_to` (default: last diagnosis date of the unfiltered
    /// dataset). With no explicit end and an empty store there is nothing
    /// to anchor the calendar to, so the result is empty.
    pub fn summary(&self, filter: &CaseFilter, province: Option<&str>) -> Result<Vec<NormalizedRow>> {
        let (records, group_key, slug) = match Self::scope(province) {
            Scope::Country => (self.country_set(filter).records()?, None, None),
            Scope::Province(p) => (
                self.scoped_set(filter, p).records()?,
                Some(GroupKey::Province),
                Some(p.slug),
            ),
            Scope::Unknown => return Ok(Vec::new()),
        };

        let end = match filter.date_to {
            Some(d) => d,
            None => match self.last_diagnosis_date()? {
                Some(d) => d,
                None => return Ok(Vec::new()),
            },
        };
        let window = DateWindow::resolve(filter.date_from, Some(end), end);
        debug!(
            "Aggregating {} records over {} → {} ({} days)",
            records.len(),
            window.start,
            window.end,
            window.len()
        );

        let series = aggregate(&records, group_key, window);
        let population = self.population.population_for(slug)?;
        Ok(normalize(&series, population)?)
    }

    /// Headline figures over confirmed cases for one province or the country.
    pub fn stats(&self, province: Option<&str>) -> Result<Option<ProvinceStats>> {
        let confirmed = CaseFilter::confirmed();
        let (name, slug, set) = match Self::scope(province) {
            Scope::Country => (COUNTRY_NAME, None, self.country_set(&confirmed)),
            Scope::Province(p) => (p.name, Some(p.slug), self.scoped_set(&confirmed, p)),
            Scope::Unknown => return Ok(None),
        };

        let cases = set.count()?;
        let deaths = set.filter_eq(Field::Deceased, true).count()?;
        let population = self.population.population_for(slug)?;
        Ok(Some(summarize(name, population, cases, deaths)?))
    }

    /// Stats for every province followed by the country total.
    pub fn all_stats(&self) -> Result<Vec<ProvinceStats>> {
        let mut out = Vec::with_capacity(provinces::provinces().len() + 1);
        for p in provinces::provinces() {
            out.extend(self.stats(Some(p.slug))?);
        }
        out.extend(self.stats(None)?);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, CoreResult};
    use crate::models::Classification;
    use crate::storage::MemoryStore;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, day).unwrap()
    }

    fn rec(id: i64, province: &str, diagnosis: NaiveDate) -> CaseRecord {
        CaseRecord {
            event_id: id,
            sex: Some("F".into()),
            age: Some(40),
            province_name: province.into(),
            classification: Classification::Confirmed,
            diagnosis_date: Some(diagnosis),
            is_deceased: false,
            death_date: None,
            icu: false,
            respirator: false,
            last_updated: Some(d(6, 1)),
        }
    }

    fn service() -> CovidService<MemoryStore> {
        let mut dead = rec(4, "CABA", d(3, 3));
        dead.is_deceased = true;
        dead.death_date = Some(d(3, 5));

        let mut rejected = rec(5, "Chaco", d(3, 2));
        rejected.classification = Classification::Rejected;

        CovidService::new(Arc::new(MemoryStore::new(vec![
            rec(1, "CABA", d(3, 1)),
            rec(2, "CABA", d(3, 1)),
            rec(3, "Chaco", d(3, 10)),
            dead,
            rejected,
        ])))
    }

    #[test]
    fn test_count_scopes() {
        let svc = service();
        let all = CaseFilter::default();
        assert_eq!(svc.count(&all, None).unwrap(), 5);
        assert_eq!(svc.count(&all, Some("02")).unwrap(), 3);
        assert_eq!(svc.count(&CaseFilter::confirmed(), Some("22")).unwrap(), 1);
        assert_eq!(svc.count(&all, Some("99")).unwrap(), 0);
        assert!(svc.cases(&all, Some("99")).unwrap().is_empty());
    }

    #[test]
    fn test_province_summary() {
        let svc = service();
        let filter = CaseFilter {
            date_from: Some(d(3, 1)),
            date_to: Some(d(3, 5)),
            ..Default::default()
        };
        let rows = svc.summary(&filter, Some("02")).unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows.iter().map(|r| r.cases).collect::<Vec<_>>(), [2, 0, 1, 0, 0]);
        assert_eq!(rows.iter().map(|r| r.deaths_cumulative).collect::<Vec<_>>(), [0, 0, 0, 0, 1]);
        // 2 cases over CABA's 3,075,646 inhabitants.
        assert_eq!(rows[0].cases_per_million, 0.65027);
    }

    #[test]
    fn test_summary_end_defaults_to_unfiltered_max() {
        let svc = service();
        // Nothing in Misiones, but the calendar still spans to the last
        // diagnosis anywhere in the dataset (2020-03-10).
        let filter = CaseFilter { date_from: Some(d(3, 1)), ..Default::default() };
        let rows = svc.summary(&filter, Some("54")).unwrap();
        assert_eq!(rows.len(), 10);
        assert_eq!(rows.last().map(|r| r.date), Some(d(3, 10)));
        assert!(rows.iter().all(|r| r.cases_cumulative == 0 && r.cases_per_100k == 0.0));
    }

    #[test]
    fn test_country_summary_starts_at_epoch() {
        let rows = service().summary(&CaseFilter::default(), None).unwrap();
        assert_eq!(rows.first().map(|r| r.date), NaiveDate::from_ymd_opt(2020, 2, 11));
        assert_eq!(rows.last().map(|r| r.cases_cumulative), Some(5));
    }

    #[test]
    fn test_summary_edge_cases() {
        let svc = service();
        assert!(svc.summary(&CaseFilter::default(), Some("99")).unwrap().is_empty());

        let inverted = CaseFilter {
            date_from: Some(d(3, 5)),
            date_to: Some(d(3, 1)),
            ..Default::default()
        };
        assert!(svc.summary(&inverted, None).unwrap().is_empty());

        let empty: CovidService<MemoryStore> = CovidService::new(Arc::new(MemoryStore::default()));
        assert!(empty.summary(&CaseFilter::default(), None).unwrap().is_empty());
    }

    struct BrokenPopulation;

    impl PopulationTable for BrokenPopulation {
        fn population_for(&self, _slug: Option<&str>) -> CoreResult<f64> {
            Ok(0.0)
        }
    }

    #[test]
    fn test_invalid_population_aborts_summary() {
        let store = Arc::new(MemoryStore::new(vec![rec(1, "CABA", d(3, 1))]));
        let svc = CovidService::with_population(store, BrokenPopulation);
        let err = svc.summary(&CaseFilter::default(), None).unwrap_err();
        assert_eq!(err.downcast_ref::<CoreError>(), Some(&CoreError::InvalidPopulation(0.0)));
    }

    #[test]
    fn test_stats() {
        let svc = service();
        let caba = svc.stats(Some("02")).unwrap().unwrap();
        assert_eq!((caba.cases, caba.deaths), (3, 1));
        assert_eq!(caba.lethality, 0.3333);

        let country = svc.stats(None).unwrap().unwrap();
        assert_eq!(country.name, "Argentina");
        assert_eq!(country.cases, 4);

        assert!(svc.stats(Some("99")).unwrap().is_none());

        let all = svc.all_stats().unwrap();
        assert_eq!(all.len(), 25);
        assert_eq!(all.last().map(|s| s.name.as_str()), Some("Argentina"));
    }

    #[test]
    fn test_last_update() {
        let svc = service();
        assert_eq!(svc.last_update().unwrap(), Some(d(6, 1)));
        assert_eq!(svc.last_diagnosis_date().unwrap(), Some(d(3, 10)));
    }
}
