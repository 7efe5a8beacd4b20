use crate::model::{MachineAggregate, ScanRow};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Groups rows by machine and sums targets and scanned counts per group.
///
/// Rows keep their input order inside each group. Groups come back sorted by
/// machine identifier, ignoring case first and using the raw text as the
/// tie-break so the order is total.
pub fn group_by_machine(rows: &[ScanRow]) -> Vec<MachineAggregate> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<MachineAggregate> = Vec::new();

    for row in rows {
        let key = row.machine_key();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(MachineAggregate::new(key));
            groups.len() - 1
        });
        let group = &mut groups[slot];
        group.total_target = group.total_target.saturating_add(row.target);
        group.total_scanned = group.total_scanned.saturating_add(row.scanned_count);
        group.last_scan = match (group.last_scan, row.last_scan) {
            (Some(current), Some(ts)) => Some(current.max(ts)),
            (current, ts) => current.or(ts),
        };
        group.lots.push(row.clone());
    }

    groups.sort_by(|a, b| machine_order(&a.machine_no, &b.machine_no));
    groups
}

pub fn machine_order(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Keeps rows whose department contains `department`, ignoring case.
/// An empty department or `Overall` keeps everything.
pub fn apply_department_filter(rows: Vec<ScanRow>, department: &str) -> Vec<ScanRow> {
    let wanted = department.trim().to_lowercase();
    if wanted.is_empty() || wanted == "overall" {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            row.department
                .as_deref()
                .unwrap_or_default()
                .to_lowercase()
                .contains(&wanted)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UNASSIGNED_MACHINE;
    use chrono::{Duration, TimeZone, Utc};

    fn row(machine: Option<&str>, target: u64, scanned: u64) -> ScanRow {
        ScanRow {
            lot_no: format!("LOT-{machine:?}-{target}-{scanned}"),
            machine_no: machine.map(str::to_string),
            target,
            scanned_count: scanned,
            ..ScanRow::default()
        }
    }

    #[test]
    fn groups_and_sums_per_machine() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut a = row(Some("MC-01"), 100, 40);
        a.last_scan = Some(now - Duration::minutes(10));
        let mut b = row(Some("MC-01"), 50, 50);
        b.last_scan = Some(now - Duration::hours(1));

        let groups = group_by_machine(&[a.clone(), b.clone()]);
        assert_eq!(groups.len(), 1);
        let mc = &groups[0];
        assert_eq!(mc.machine_no, "MC-01");
        assert_eq!(mc.total_target, 150);
        assert_eq!(mc.total_scanned, 90);
        assert_eq!(mc.last_scan, Some(now - Duration::minutes(10)));
        assert_eq!(mc.percent_complete(), 60);
        assert_eq!(mc.lots, vec![a, b]);
    }

    #[test]
    fn grouping_loses_no_rows() {
        let rows = vec![
            row(Some("MC-02"), 10, 3),
            row(None, 5, 7),
            row(Some("MC-01"), 20, 11),
            row(Some(""), 1, 1),
            row(Some("MC-02"), 8, 2),
        ];
        let groups = group_by_machine(&rows);
        let scanned: u64 = groups.iter().map(|g| g.total_scanned).sum();
        let lots: usize = groups.iter().map(|g| g.lots.len()).sum();
        assert_eq!(scanned, rows.iter().map(|r| r.scanned_count).sum::<u64>());
        assert_eq!(lots, rows.len());
        let unassigned = groups
            .iter()
            .find(|g| g.machine_no == UNASSIGNED_MACHINE)
            .unwrap();
        assert_eq!(unassigned.lots.len(), 2);
    }

    #[test]
    fn last_scan_ignores_missing_timestamps() {
        let groups = group_by_machine(&[row(Some("MC-09"), 1, 0)]);
        assert_eq!(groups[0].last_scan, None);
    }

    #[test]
    fn sorted_case_insensitively() {
        let rows = vec![
            row(Some("mc-03"), 1, 0),
            row(Some("MC-01"), 1, 0),
            row(Some("Mc-02"), 1, 0),
        ];
        let order: Vec<String> = group_by_machine(&rows)
            .into_iter()
            .map(|g| g.machine_no)
            .collect();
        assert_eq!(order, vec!["MC-01", "Mc-02", "mc-03"]);
    }

    #[test]
    fn department_filter_matches_substring() {
        let mut a = row(Some("MC-01"), 1, 0);
        a.department = Some("Preform Line 2".into());
        let mut b = row(Some("MC-02"), 1, 0);
        b.department = Some("Assembly".into());
        let c = row(Some("MC-03"), 1, 0);
        let rows = vec![a.clone(), b, c];

        assert_eq!(apply_department_filter(rows.clone(), "overall").len(), 3);
        assert_eq!(apply_department_filter(rows.clone(), "").len(), 3);
        assert_eq!(apply_department_filter(rows, "preform"), vec![a]);
    }
}
