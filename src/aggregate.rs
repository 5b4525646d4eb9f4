//! Count, rank and pivot helpers shared by the chart builders.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::table::{round_to, MonthPeriod};

pub const OTHERS: &str = "Others";

/// Counts per category, most frequent first. Ties keep first-seen order.
pub fn value_counts<I, S>(values: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for value in values {
        let value = value.into();
        match index.get(&value) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(value.clone(), order.len());
                order.push((value, 1));
            }
        }
    }
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
}

/// Relabels every category seen fewer than `min_count` times as [`OTHERS`].
pub fn group_others(values: Vec<String>, min_count: usize) -> Vec<String> {
    let counts = value_counts(values.iter().cloned());
    let kept: BTreeSet<&str> = counts
        .iter()
        .filter(|(_, n)| *n >= min_count)
        .map(|(v, _)| v.as_str())
        .collect();
    values
        .iter()
        .map(|v| {
            if kept.contains(v.as_str()) {
                v.clone()
            } else {
                OTHERS.to_string()
            }
        })
        .collect()
}

/// Counts with small categories merged into one [`OTHERS`] bucket.
pub fn top_n_with_others(values: Vec<String>, min_count: usize) -> Vec<(String, usize)> {
    value_counts(group_others(values, min_count))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Pareto {
    pub labels: Vec<String>,
    pub bars: Vec<usize>,
    pub cum_pct: Vec<f64>,
    pub total_count: usize,
}

/// Top `top_n` categories with cumulative percentages relative to the shown bars.
pub fn pareto<I, S>(values: I, top_n: usize) -> Pareto
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let counts: Vec<(String, usize)> = value_counts(values).into_iter().take(top_n).collect();
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    let denominator = total.max(1) as f64;

    let mut running = 0usize;
    let mut out = Pareto {
        total_count: total,
        ..Pareto::default()
    };
    for (label, n) in counts {
        running += n;
        out.labels.push(label);
        out.bars.push(n);
        out.cum_pct.push(round_to(running as f64 / denominator * 100.0, 2));
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Crosstab {
    pub rows: Vec<String>,
    pub cols: Vec<String>,
    pub z: Vec<Vec<usize>>,
}

impl Crosstab {
    pub fn row_totals(&self) -> Vec<usize> {
        self.z.iter().map(|row| row.iter().sum()).collect()
    }

    /// Reorders rows by descending total; equal totals keep their order.
    pub fn sort_rows_by_total(&mut self) {
        let totals = self.row_totals();
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| totals[b].cmp(&totals[a]));
        self.rows = order.iter().map(|&i| self.rows[i].clone()).collect();
        self.z = order.iter().map(|&i| self.z[i].clone()).collect();
    }
}

/// Row × column counts with sorted labels. `fixed_cols`, when given, is the exact column set and order;
/// pairs outside it are dropped.
pub fn crosstab(pairs: &[(String, String)], fixed_cols: Option<&[&str]>) -> Crosstab {
    let rows: Vec<String> = pairs
        .iter()
        .map(|(r, _)| r.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let cols: Vec<String> = match fixed_cols {
        Some(fixed) => fixed.iter().map(|c| c.to_string()).collect(),
        None => pairs
            .iter()
            .map(|(_, c)| c.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let mut z = vec![vec![0usize; cols.len()]; rows.len()];
    for (r, c) in pairs {
        let (Ok(ri), Some(ci)) = (rows.binary_search(r), cols.iter().position(|x| x == c)) else {
            continue;
        };
        z[ri][ci] += 1;
    }
    Crosstab { rows, cols, z }
}

/// Dense monthly series from sparse counts, zero-filled between the first and last month.
pub fn fill_month_gaps(counts: &BTreeMap<MonthPeriod, usize>) -> Vec<(MonthPeriod, usize)> {
    let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) else {
        return Vec::new();
    };
    first
        .range_to(last)
        .into_iter()
        .map(|month| (month, counts.get(&month).copied().unwrap_or(0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn value_counts_orders_by_count_then_first_seen() {
        let counts = value_counts(["b", "a", "a", "c", "b", "a"]);
        assert_eq!(
            counts,
            vec![("a".to_string(), 3), ("b".to_string(), 2), ("c".to_string(), 1)]
        );
        let ties = value_counts(["z", "y"]);
        assert_eq!(ties[0].0, "z");
    }

    #[test]
    fn small_categories_become_others() {
        let values = strings(&["Fire", "Fire", "Fire", "Spill", "Fall"]);
        let counts = top_n_with_others(values, 2);
        assert_eq!(counts, vec![("Fire".to_string(), 3), (OTHERS.to_string(), 2)]);
    }

    #[test]
    fn pareto_percentages_are_relative_to_shown_bars() {
        let p = pareto(["a", "a", "a", "b", "c", "d"], 2);
        assert_eq!(p.labels, strings(&["a", "b"]));
        assert_eq!(p.bars, vec![3, 1]);
        assert_eq!(p.cum_pct, vec![75.0, 100.0]);
        assert_eq!(p.total_count, 4);
    }

    #[test]
    fn crosstab_honours_fixed_columns() {
        let pairs = vec![
            ("Fire".to_string(), "C1 - Minor".to_string()),
            ("Fall".to_string(), "C3 - Severe".to_string()),
            ("Fire".to_string(), "C1 - Minor".to_string()),
        ];
        let ct = crosstab(&pairs, Some(&["C0 - No Ill Effect", "C1 - Minor", "C3 - Severe"][..]));
        assert_eq!(ct.rows, strings(&["Fall", "Fire"]));
        assert_eq!(ct.z, vec![vec![0, 0, 1], vec![0, 2, 0]]);
    }

    #[test]
    fn month_gaps_are_zero_filled() {
        let mut counts = BTreeMap::new();
        counts.insert(MonthPeriod { year: 2023, month: 11 }, 2);
        counts.insert(MonthPeriod { year: 2024, month: 2 }, 1);
        let filled = fill_month_gaps(&counts);
        let data: Vec<usize> = filled.iter().map(|(_, n)| *n).collect();
        assert_eq!(data, vec![2, 0, 0, 1]);
        assert_eq!(filled[1].0.to_string(), "2023-12");
    }
}
