//! Per-read quality statistics: single-pass summaries, quantiles, sliding
//! windows and trim suggestions.

use crate::quality::{error_probability, Encoding};

/// Single-pass summary of a score vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreSummary {
    pub count: usize,
    pub mean: f64,
    pub min: i8,
    pub max: i8,
}

/// Full statistics over a score vector. Zero-initialized for empty input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QualityStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub std_dev: f64,
    pub min: i8,
    pub max: i8,
}

/// Statistics of one sliding window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    /// 0-based offset of the window start
    pub start: usize,
    pub mean: f64,
    pub min: i8,
    pub max: i8,
}

/// A proposed two-sided quality trim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimSuggestion {
    /// First retained position (0-based)
    pub trim_start: usize,
    /// One past the last retained position
    pub trim_end: usize,
    pub new_length: usize,
    pub mean_after: f64,
}

/// Mean, min and max in one pass, no allocation.
pub fn summarize(scores: &[i8]) -> ScoreSummary {
    let mut iter = scores.iter();
    let Some(&first) = iter.next() else {
        return ScoreSummary::default();
    };
    let mut min = first;
    let mut max = first;
    let mut sum = first as i64;
    for &s in iter {
        if s < min {
            min = s;
        }
        if s > max {
            max = s;
        }
        sum += s as i64;
    }
    ScoreSummary {
        count: scores.len(),
        mean: sum as f64 / scores.len() as f64,
        min,
        max,
    }
}

/// Number of scores strictly below `threshold`.
pub fn count_below(scores: &[i8], threshold: i8) -> usize {
    scores.iter().filter(|&&s| s < threshold).count()
}

/// Sum of per-base error probabilities (the expected number of errors in
/// the read under its encoding's probability mapping).
pub fn expected_errors(scores: &[i8], encoding: Encoding) -> f64 {
    scores.iter().map(|&s| error_probability(s, encoding)).sum()
}

impl QualityStats {
    /// Computes the full statistics, sorting a copy of the scores for the
    /// quantiles. Empty input yields the zero-initialized default.
    pub fn from_scores(scores: &[i8]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }
        let summary = summarize(scores);
        let mut sorted = scores.to_vec();
        sorted.sort_unstable();

        let variance = scores
            .iter()
            .map(|&s| {
                let d = s as f64 - summary.mean;
                d * d
            })
            .sum::<f64>()
            / scores.len() as f64;

        Self {
            count: summary.count,
            mean: summary.mean,
            median: percentile(&sorted, 0.5),
            q1: percentile(&sorted, 0.25),
            q3: percentile(&sorted, 0.75),
            std_dev: variance.sqrt(),
            min: summary.min,
            max: summary.max,
        }
    }
}

/// Linear-interpolated percentile over a sorted slice.
fn percentile(sorted: &[i8], frac: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = frac * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo] as f64
    } else {
        let weight = rank - lo as f64;
        sorted[lo] as f64 * (1.0 - weight) + sorted[hi] as f64 * weight
    }
}

/// Overlapping sliding-window statistics.
///
/// The window size is clamped to `[5, min(100, n)]`; `max(0, n-w+1)` windows
/// are produced.
pub fn windowed(scores: &[i8], window: usize) -> Vec<WindowStats> {
    if scores.is_empty() {
        return Vec::new();
    }
    let w = window.max(5).min(100).min(scores.len());
    scores
        .windows(w)
        .enumerate()
        .map(|(start, win)| {
            let s = summarize(win);
            WindowStats {
                start,
                mean: s.mean,
                min: s.min,
                max: s.max,
            }
        })
        .collect()
}

/// Scans inward from both ends to the first score at or above `threshold`
/// and proposes the retained region. `None` when nothing reaches the
/// threshold or the retained region is shorter than `min_length`.
pub fn suggest_trim(scores: &[i8], threshold: i8, min_length: usize) -> Option<TrimSuggestion> {
    let trim_start = scores.iter().position(|&s| s >= threshold)?;
    let trim_end = scores.iter().rposition(|&s| s >= threshold)? + 1;
    let new_length = trim_end - trim_start;
    if new_length < min_length {
        return None;
    }
    let retained = &scores[trim_start..trim_end];
    Some(TrimSuggestion {
        trim_start,
        trim_end,
        new_length,
        mean_after: summarize(retained).mean,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_input_is_zeroed() {
        assert_eq!(summarize(&[]), ScoreSummary::default());
        assert_eq!(QualityStats::from_scores(&[]), QualityStats::default());
        assert!(windowed(&[], 10).is_empty());
    }

    #[test]
    fn summary_single_pass() {
        let s = summarize(&[10, 20, 30]);
        assert_eq!(s.count, 3);
        assert_eq!(s.mean, 20.0);
        assert_eq!(s.min, 10);
        assert_eq!(s.max, 30);
    }

    #[test]
    fn quantiles_odd_count() {
        let stats = QualityStats::from_scores(&[5, 1, 3, 2, 4]);
        assert_eq!(stats.median, 3.0);
        assert_eq!(stats.q1, 2.0);
        assert_eq!(stats.q3, 4.0);
        assert!((stats.std_dev - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn quantiles_even_count() {
        let stats = QualityStats::from_scores(&[1, 2, 3, 4]);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 4);
    }

    #[test]
    fn below_threshold() {
        assert_eq!(count_below(&[10, 19, 20, 21], 20), 2);
        assert_eq!(count_below(&[], 20), 0);
    }

    #[test]
    fn expected_errors_phred() {
        // Q10 = 0.1, Q20 = 0.01
        let e = expected_errors(&[10, 20], Encoding::Phred33);
        assert!((e - 0.11).abs() < 1e-12);
    }

    #[test]
    fn expected_errors_solexa_dispatches() {
        // Solexa score 0 is probability 0.5, not 1.0
        let e = expected_errors(&[0], Encoding::Solexa);
        assert!((e - 0.5).abs() < 1e-12);
    }

    #[test]
    fn window_count_and_clamping() {
        let scores: Vec<i8> = (0..20).collect();
        // requested 1 clamps up to 5
        let wins = windowed(&scores, 1);
        assert_eq!(wins.len(), 20 - 5 + 1);
        assert_eq!(wins[0].start, 0);
        assert_eq!(wins[0].min, 0);
        assert_eq!(wins[0].max, 4);
        // window larger than the read clamps down to n -> one window
        let wins = windowed(&scores, 500);
        assert_eq!(wins.len(), 1);
    }

    #[test]
    fn trim_scans_inward() {
        let scores = [2i8, 5, 30, 31, 32, 30, 4, 2];
        let t = suggest_trim(&scores, 20, 3).unwrap();
        assert_eq!(t.trim_start, 2);
        assert_eq!(t.trim_end, 6);
        assert_eq!(t.new_length, 4);
        assert!((t.mean_after - 30.75).abs() < 1e-12);
    }

    #[test]
    fn trim_rejects_short_region() {
        let scores = [2i8, 30, 30, 2];
        assert_eq!(suggest_trim(&scores, 20, 3), None);
    }

    #[test]
    fn trim_without_good_bases() {
        assert_eq!(suggest_trim(&[2i8, 3, 4], 20, 1), None);
    }
}
