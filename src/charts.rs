use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Daily production bars drawn on one machine card.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MiniChart {
    pub machine_no: String,
    pub labels: Vec<String>,
    pub daily: Vec<f64>,
    /// Bumped on every in-place update.
    pub revision: u64,
}

impl MiniChart {
    pub fn bars(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.daily.iter().copied())
    }

    pub fn peak(&self) -> f64 {
        self.daily.iter().copied().fold(0.0, f64::max)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    Created,
    Updated,
}

/// Owns at most one chart per machine identifier.
#[derive(Debug, Default)]
pub struct ChartRegistry {
    charts: HashMap<String, MiniChart>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the machine's chart on first use, otherwise replaces its series in place.
    pub fn upsert(&mut self, machine_no: &str, labels: Vec<String>, daily: Vec<f64>) -> Upsert {
        match self.charts.get_mut(machine_no) {
            Some(chart) => {
                chart.labels = labels;
                chart.daily = daily;
                chart.revision += 1;
                Upsert::Updated
            }
            None => {
                self.charts.insert(
                    machine_no.to_string(),
                    MiniChart {
                        machine_no: machine_no.to_string(),
                        labels,
                        daily,
                        revision: 0,
                    },
                );
                Upsert::Created
            }
        }
    }

    pub fn get(&self, machine_no: &str) -> Option<&MiniChart> {
        self.charts.get(machine_no)
    }

    pub fn dispose(&mut self, machine_no: &str) -> bool {
        self.charts.remove(machine_no).is_some()
    }

    /// Disposes every chart whose card is gone. Returns how many were dropped.
    pub fn retain_machines<'a, I>(&mut self, live: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let live: HashSet<&str> = live.into_iter().collect();
        let gone: Vec<String> = self
            .charts
            .keys()
            .filter(|machine_no| !live.contains(machine_no.as_str()))
            .cloned()
            .collect();
        gone.iter().filter(|machine_no| self.dispose(machine_no)).count()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> (Vec<String>, Vec<f64>) {
        let labels = (1..=n).map(|d| format!("0{d}/06")).collect();
        let daily = (1..=n).map(|d| d as f64 * 10.0).collect();
        (labels, daily)
    }

    #[test]
    fn second_upsert_updates_in_place() {
        let mut registry = ChartRegistry::new();
        let (labels, daily) = series(3);
        assert_eq!(registry.upsert("MC-01", labels, daily), Upsert::Created);
        let (labels, daily) = series(5);
        assert_eq!(registry.upsert("MC-01", labels, daily), Upsert::Updated);

        assert_eq!(registry.len(), 1);
        let chart = registry.get("MC-01").unwrap();
        assert_eq!(chart.revision, 1);
        assert_eq!(chart.daily.len(), 5);
        assert_eq!(chart.peak(), 50.0);
    }

    #[test]
    fn removed_cards_dispose_their_charts() {
        let mut registry = ChartRegistry::new();
        for machine in ["MC-01", "MC-02", "MC-03"] {
            let (labels, daily) = series(2);
            registry.upsert(machine, labels, daily);
        }
        assert_eq!(registry.retain_machines(["MC-02"]), 2);
        assert!(registry.get("MC-01").is_none());
        assert!(registry.get("MC-02").is_some());
        assert!(registry.dispose("MC-02"));
        assert!(!registry.dispose("MC-02"));
    }

    #[test]
    fn bars_pair_labels_with_values() {
        let mut registry = ChartRegistry::new();
        registry.upsert("MC-01", vec!["Mon".into(), "Tue".into()], vec![3.0, 7.0]);
        let bars: Vec<_> = registry.get("MC-01").unwrap().bars().collect();
        assert_eq!(bars, vec![("Mon", 3.0), ("Tue", 7.0)]);
    }
}
