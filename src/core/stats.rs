use super::types::{
    DistributionSummary, HistogramBin, SimulationParameters, SimulationRun, YearBand,
};

pub const DEFAULT_HISTOGRAM_BINS: usize = 30;

/// R-7 quantile: linear interpolation at rank `(n - 1) * q` of the sorted input.
///
/// Returns NaN for empty input. `q` is clamped to `[0, 1]`. Sorting uses the
/// IEEE total order, so infinities and NaNs never panic.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    quantile_sorted(&sorted, q)
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }

    let rank = q.clamp(0.0, 1.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let (lo, hi) = (sorted[lower], sorted[upper]);

    if lower == upper || lo == hi {
        return lo;
    }

    let w = rank - lower as f64;
    let value = lo + (hi - lo) * w;
    // keeps adjacent segments ordered under rounding; NaN passes through
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

pub fn summarize(run: &SimulationRun, params: &SimulationParameters) -> DistributionSummary {
    let values = &run.final_values;
    if values.is_empty() {
        return DistributionSummary::undefined();
    }

    let n = values.len() as f64;
    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let losses = values
        .iter()
        .filter(|&&v| v < params.initial_amount)
        .count();

    DistributionSummary {
        mean: values.iter().sum::<f64>() / n,
        median: quantile_sorted(&sorted, 0.5),
        q10: quantile_sorted(&sorted, 0.10),
        q25: quantile_sorted(&sorted, 0.25),
        q75: quantile_sorted(&sorted, 0.75),
        q90: quantile_sorted(&sorted, 0.90),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        prob_loss: losses as f64 / n,
    }
}

pub fn year_bands(run: &SimulationRun, years: u32) -> Vec<YearBand> {
    let mut column = Vec::with_capacity(run.trajectories.len());
    (0..=years)
        .map(|year| {
            column.clear();
            column.extend(
                run.trajectories
                    .iter()
                    .filter_map(|t| t.get(year as usize))
                    .map(|point| point.value),
            );
            column.sort_by(|a, b| a.total_cmp(b));

            YearBand {
                year,
                median: quantile_sorted(&column, 0.5),
                q10: quantile_sorted(&column, 0.10),
                q25: quantile_sorted(&column, 0.25),
                q75: quantile_sorted(&column, 0.75),
                q90: quantile_sorted(&column, 0.90),
            }
        })
        .collect()
}

pub fn histogram_with_default_bins(final_values: &[f64]) -> Vec<HistogramBin> {
    histogram(final_values, DEFAULT_HISTOGRAM_BINS)
}

/// Equal-width histogram over the finite range of `final_values`.
///
/// The maximum lands in the last bin, and a zero-width range collapses to one
/// bin. Infinite and NaN values are counted in a trailing `non-finite` bin, so
/// counts always sum to `final_values.len()`.
pub fn histogram(final_values: &[f64], bin_count: usize) -> Vec<HistogramBin> {
    if final_values.is_empty() || bin_count == 0 {
        return Vec::new();
    }

    let finite: Vec<f64> = final_values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    let non_finite = final_values.len() - finite.len();

    let mut bins = finite_bins(&finite, bin_count);
    if non_finite > 0 {
        bins.push(HistogramBin {
            range_label: "non-finite".to_string(),
            start: f64::NAN,
            end: f64::NAN,
            count: non_finite,
        });
    }
    bins
}

fn finite_bins(values: &[f64], bin_count: usize) -> Vec<HistogramBin> {
    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // max - min can still overflow for values near f64::MAX
    let width = (max - min) / bin_count as f64;

    if !(width.is_finite() && width > 0.0) {
        return vec![HistogramBin {
            range_label: range_label(min, max),
            start: min,
            end: max,
            count: values.len(),
        }];
    }

    let mut counts = vec![0_usize; bin_count];
    for &value in values {
        let index = ((value - min) / width).floor() as usize;
        counts[index.min(bin_count - 1)] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let start = min + i as f64 * width;
            let end = if i + 1 == bin_count {
                max
            } else {
                min + (i + 1) as f64 * width
            };
            HistogramBin {
                range_label: range_label(start, end),
                start,
                end,
                count,
            }
        })
        .collect()
}

fn range_label(start: f64, end: f64) -> String {
    format!("{} – {}", compact_amount(start), compact_amount(end))
}

fn compact_amount(value: f64) -> String {
    let magnitude = value.abs();
    if !magnitude.is_finite() {
        format!("{value}")
    } else if magnitude >= 1e9 {
        format!("{:.1}B", value / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.1}M", value / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.0}k", value / 1e3)
    } else {
        format!("{value:.0}")
    }
}
