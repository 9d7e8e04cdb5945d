use crate::join::PlotTable;
use crate::process::AnalysisError;

use clap::ValueEnum;
use itertools::Itertools;
use log::{debug, warn};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};
use std::fmt;
use std::str::FromStr;

/// Two-sample tests accepted by `--test`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatTest {
    TTestInd,
    TTestWelch,
    TTestPaired,
    MannWhitney,
    MannWhitneyGt,
    MannWhitneyLs,
    Levene,
    Wilcoxon,
    Kruskal,
}

impl StatTest {
    pub const ALL: [StatTest; 9] = [
        StatTest::TTestInd,
        StatTest::TTestWelch,
        StatTest::TTestPaired,
        StatTest::MannWhitney,
        StatTest::MannWhitneyGt,
        StatTest::MannWhitneyLs,
        StatTest::Levene,
        StatTest::Wilcoxon,
        StatTest::Kruskal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StatTest::TTestInd => "t-test_ind",
            StatTest::TTestWelch => "t-test_welch",
            StatTest::TTestPaired => "t-test_paired",
            StatTest::MannWhitney => "Mann-Whitney",
            StatTest::MannWhitneyGt => "Mann-Whitney-gt",
            StatTest::MannWhitneyLs => "Mann-Whitney-ls",
            StatTest::Levene => "Levene",
            StatTest::Wilcoxon => "Wilcoxon",
            StatTest::Kruskal => "Kruskal",
        }
    }

    /// Longer name printed in the comparison report.
    pub fn description(&self) -> &'static str {
        match self {
            StatTest::TTestInd => "t-test independent samples",
            StatTest::TTestWelch => "Welch's t-test independent samples",
            StatTest::TTestPaired => "t-test paired samples",
            StatTest::MannWhitney => "Mann-Whitney-Wilcoxon test two-sided",
            StatTest::MannWhitneyGt => "Mann-Whitney-Wilcoxon test greater",
            StatTest::MannWhitneyLs => "Mann-Whitney-Wilcoxon test smaller",
            StatTest::Levene => "Levene test",
            StatTest::Wilcoxon => "Wilcoxon test (paired samples)",
            StatTest::Kruskal => "Kruskal-Wallis paired samples",
        }
    }

    /// Runs the test on two samples.
    ///
    /// Samples too small or too uniform for the test give a NaN p-value.
    /// Paired tests reject samples of different lengths.
    pub fn run(&self, a: &[f64], b: &[f64]) -> Result<TestResult, AnalysisError> {
        let result = match self {
            StatTest::TTestInd => student_t(a, b),
            StatTest::TTestWelch => welch_t(a, b),
            StatTest::TTestPaired => paired_t(a, b)?,
            StatTest::MannWhitney => mann_whitney(a, b, Alternative::TwoSided),
            StatTest::MannWhitneyGt => mann_whitney(a, b, Alternative::Greater),
            StatTest::MannWhitneyLs => mann_whitney(a, b, Alternative::Less),
            StatTest::Levene => levene(a, b),
            StatTest::Wilcoxon => wilcoxon(a, b)?,
            StatTest::Kruskal => kruskal(a, b),
        };
        Ok(result)
    }
}

impl fmt::Display for StatTest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for StatTest {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatTest::ALL
            .iter()
            .find(|t| t.name() == s)
            .copied()
            .ok_or_else(|| {
                AnalysisError::UnsupportedTest(
                    s.to_string(),
                    StatTest::ALL.iter().map(StatTest::name).join(", "),
                )
            })
    }
}

/// Multiple-comparison correction applied across all pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Correction {
    Bonferroni,
    #[value(name = "none")]
    Uncorrected,
}

impl Correction {
    pub fn apply(&self, p: f64, comparisons: usize) -> f64 {
        match self {
            Correction::Bonferroni => (p * comparisons as f64).min(1.0),
            Correction::Uncorrected => p,
        }
    }
}

impl fmt::Display for Correction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Correction::Bonferroni => write!(f, "Bonferroni"),
            Correction::Uncorrected => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
}

impl TestResult {
    fn undefined() -> Self {
        TestResult {
            statistic: f64::NAN,
            p_value: f64::NAN,
        }
    }
}

/// One annotated pair of genotype classes.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: String,
    pub right: String,
    /// Positions of the two classes in the category order.
    pub left_index: usize,
    pub right_index: usize,
    pub left_n: usize,
    pub right_n: usize,
    pub statistic: f64,
    pub p_value: f64,
    pub adjusted_p: f64,
    pub stars: &'static str,
}

impl Comparison {
    pub fn span(&self) -> usize {
        self.right_index - self.left_index
    }
}

/// Tests every unordered pair of categories, in lexicographic pair order.
pub fn pairwise_comparisons(
    table: &PlotTable,
    order: &[String],
    test: StatTest,
    correction: Correction,
) -> Result<Vec<Comparison>, AnalysisError> {
    let pairs: Vec<((usize, &String), (usize, &String))> =
        order.iter().enumerate().tuple_combinations().collect();
    let total = pairs.len();

    let mut comparisons = Vec::with_capacity(total);
    for ((li, left), (ri, right)) in pairs {
        let a = table.values_for(left);
        let b = table.values_for(right);
        let result = test.run(&a, &b)?;
        if result.p_value.is_nan() {
            warn!(
                "{} is undefined for {} (n={}) vs {} (n={})",
                test,
                left,
                a.len(),
                right,
                b.len()
            );
        }
        let adjusted_p = correction.apply(result.p_value, total);
        debug!(
            "{} vs {}: stat={:.4} p={:.3e} adjusted={:.3e}",
            left, right, result.statistic, result.p_value, adjusted_p
        );
        comparisons.push(Comparison {
            left: left.clone(),
            right: right.clone(),
            left_index: li,
            right_index: ri,
            left_n: a.len(),
            right_n: b.len(),
            statistic: result.statistic,
            p_value: result.p_value,
            adjusted_p,
            stars: star_rating(adjusted_p),
        });
    }
    Ok(comparisons)
}

/// Star thresholds: 1e-4, 1e-3, 1e-2, 0.05. NaN is `ns`.
pub fn star_rating(p: f64) -> &'static str {
    if p.is_nan() {
        "ns"
    } else if p <= 1e-4 {
        "****"
    } else if p <= 1e-3 {
        "***"
    } else if p <= 1e-2 {
        "**"
    } else if p <= 0.05 {
        "*"
    } else {
        "ns"
    }
}

/// Five-number summary with Tukey whiskers (1.5 IQR).
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSummary {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: Vec<f64>,
}

impl BoxSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let sorted = sorted_copy(values);
        let q1 = quantile(&sorted, 0.25);
        let median = quantile(&sorted, 0.5);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let low_fence = q1 - 1.5 * iqr;
        let high_fence = q3 + 1.5 * iqr;

        let whisker_low = sorted
            .iter()
            .copied()
            .find(|&v| v >= low_fence)
            .unwrap_or(q1)
            .min(q1);
        let whisker_high = sorted
            .iter()
            .rev()
            .copied()
            .find(|&v| v <= high_fence)
            .unwrap_or(q3)
            .max(q3);
        let outliers = sorted
            .iter()
            .copied()
            .filter(|&v| v < whisker_low || v > whisker_high)
            .collect();

        Some(BoxSummary {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
        })
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Linear-interpolated quantile of sorted data.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance.
fn variance(values: &[f64]) -> f64 {
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0)
}

fn median(values: &[f64]) -> f64 {
    quantile(&sorted_copy(values), 0.5)
}

fn two_sided_t(t: f64, df: f64) -> f64 {
    if t.is_nan() || !(df > 0.0) {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    StudentsT::new(0.0, 1.0, df)
        .map(|dist| (2.0 * dist.sf(t.abs())).min(1.0))
        .unwrap_or(f64::NAN)
}

fn normal_sf(z: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|dist| dist.sf(z))
        .unwrap_or(f64::NAN)
}

fn t_result(diff: f64, se: f64, df: f64) -> TestResult {
    let t = if se > 0.0 {
        diff / se
    } else if diff == 0.0 {
        f64::NAN
    } else {
        diff.signum() * f64::INFINITY
    };
    TestResult {
        statistic: t,
        p_value: two_sided_t(t, df),
    }
}

fn student_t(a: &[f64], b: &[f64]) -> TestResult {
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    if a.is_empty() || b.is_empty() || n1 + n2 < 3.0 {
        return TestResult::undefined();
    }
    let df = n1 + n2 - 2.0;
    let ss1 = if a.len() > 1 { (n1 - 1.0) * variance(a) } else { 0.0 };
    let ss2 = if b.len() > 1 { (n2 - 1.0) * variance(b) } else { 0.0 };
    let pooled = (ss1 + ss2) / df;
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();
    t_result(mean(a) - mean(b), se, df)
}

fn welch_t(a: &[f64], b: &[f64]) -> TestResult {
    if a.len() < 2 || b.len() < 2 {
        return TestResult::undefined();
    }
    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let v1 = variance(a) / n1;
    let v2 = variance(b) / n2;
    let s = v1 + v2;
    let df = s * s / (v1 * v1 / (n1 - 1.0) + v2 * v2 / (n2 - 1.0));
    t_result(mean(a) - mean(b), s.sqrt(), df)
}

fn paired_t(a: &[f64], b: &[f64]) -> Result<TestResult, AnalysisError> {
    let diffs = paired_differences(a, b, StatTest::TTestPaired)?;
    if diffs.len() < 2 {
        return Ok(TestResult::undefined());
    }
    let n = diffs.len() as f64;
    let se = (variance(&diffs) / n).sqrt();
    Ok(t_result(mean(&diffs), se, n - 1.0))
}

fn paired_differences(a: &[f64], b: &[f64], test: StatTest) -> Result<Vec<f64>, AnalysisError> {
    if a.len() != b.len() {
        return Err(AnalysisError::Stats(format!(
            "{} needs samples of equal size, got {} and {}",
            test,
            a.len(),
            b.len()
        )));
    }
    Ok(a.iter().zip(b).map(|(x, y)| x - y).collect())
}

/// Average ranks (1-based) and the tie term sum(t^3 - t).
fn rank_with_ties(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let avg = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = avg;
        }
        let t = (end - start) as f64;
        tie_term += t * t * t - t;
        start = end;
    }
    (ranks, tie_term)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alternative {
    TwoSided,
    Greater,
    Less,
}

/// Samples up to this size (either side) without ties use the exact U distribution.
const MWU_EXACT_MAX: usize = 8;

fn mann_whitney(a: &[f64], b: &[f64], alternative: Alternative) -> TestResult {
    if a.is_empty() || b.is_empty() {
        return TestResult::undefined();
    }
    let n1 = a.len();
    let n2 = b.len();
    let pooled: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, tie_term) = rank_with_ties(&pooled);

    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;

    let u = match alternative {
        Alternative::TwoSided => u1.max(u2),
        Alternative::Greater => u1,
        Alternative::Less => u2,
    };

    let exact = (n1 <= MWU_EXACT_MAX || n2 <= MWU_EXACT_MAX) && tie_term == 0.0;
    let mut p = if exact {
        mwu_exact_sf(u, n1, n2)
    } else {
        let n = (n1 + n2) as f64;
        let mu = (n1 * n2) as f64 / 2.0;
        let sd = ((n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)))).sqrt();
        if !(sd > 0.0) {
            return TestResult {
                statistic: u1,
                p_value: f64::NAN,
            };
        }
        normal_sf((u - mu - 0.5) / sd)
    };
    if alternative == Alternative::TwoSided {
        p *= 2.0;
    }

    TestResult {
        statistic: u1,
        p_value: p.clamp(0.0, 1.0),
    }
}

/// P(U >= u) under the null, from the Gaussian binomial coefficients of
/// `[n1 + n2 choose n1]`.
fn mwu_exact_sf(u: f64, n1: usize, n2: usize) -> f64 {
    let (small, large) = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
    let max_u = small * large;
    let mut counts = vec![0.0f64; max_u + 1];
    counts[0] = 1.0;

    // after step i, counts holds [large + i choose i]_q
    for i in 1..=small {
        let top = large + i;
        for k in (top..=max_u).rev() {
            counts[k] -= counts[k - top];
        }
        for k in i..=max_u {
            counts[k] += counts[k - i];
        }
    }

    let total: f64 = counts.iter().sum();
    let start = u.ceil().max(0.0) as usize;
    if start > max_u {
        return 0.0;
    }
    counts[start..].iter().sum::<f64>() / total
}

/// Brown-Forsythe variant: deviations from the group medians.
fn levene(a: &[f64], b: &[f64]) -> TestResult {
    if a.is_empty() || b.is_empty() || a.len() + b.len() < 3 {
        return TestResult::undefined();
    }
    let groups: Vec<Vec<f64>> = [a, b]
        .iter()
        .map(|g| {
            let m = median(g);
            g.iter().map(|v| (v - m).abs()).collect()
        })
        .collect();

    let k = groups.len() as f64;
    let n_total: f64 = groups.iter().map(|g| g.len() as f64).sum();
    let grand = groups.iter().flatten().sum::<f64>() / n_total;

    let between: f64 = groups
        .iter()
        .map(|g| g.len() as f64 * (mean(g) - grand).powi(2))
        .sum();
    let within: f64 = groups
        .iter()
        .map(|g| {
            let m = mean(g);
            g.iter().map(|z| (z - m).powi(2)).sum::<f64>()
        })
        .sum();

    let w = (n_total - k) / (k - 1.0) * between / within;
    if !w.is_finite() {
        return TestResult::undefined();
    }
    let p = FisherSnedecor::new(k - 1.0, n_total - k)
        .map(|dist| dist.sf(w))
        .unwrap_or(f64::NAN);
    TestResult {
        statistic: w,
        p_value: p,
    }
}

/// Non-zero differences up to this count without ties use the exact distribution.
const WILCOXON_EXACT_MAX: usize = 50;

/// Pairs up to this count keep zero differences in the ranking (Pratt).
const PRATT_MAX_PAIRS: usize = 20;

/// Handling of zero differences in the signed-rank test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZeroMethod {
    /// Zeros are ranked with the other differences, then their ranks dropped.
    Pratt,
    /// Zeros are discarded before ranking.
    Wilcox,
}

fn wilcoxon(a: &[f64], b: &[f64]) -> Result<TestResult, AnalysisError> {
    let diffs = paired_differences(a, b, StatTest::Wilcoxon)?;
    let zero_method = if diffs.len() <= PRATT_MAX_PAIRS {
        ZeroMethod::Pratt
    } else {
        ZeroMethod::Wilcox
    };
    debug!("Wilcoxon zero method: {:?}", zero_method);

    let nonzero: Vec<f64> = diffs.iter().copied().filter(|d| *d != 0.0).collect();
    if nonzero.is_empty() {
        return Ok(TestResult::undefined());
    }
    let ranked = match zero_method {
        ZeroMethod::Pratt => diffs,
        ZeroMethod::Wilcox => nonzero.clone(),
    };
    let zeros = ranked.len() - nonzero.len();

    let magnitudes: Vec<f64> = ranked.iter().map(|d| d.abs()).collect();
    let (ranks, _) = rank_with_ties(&magnitudes);
    let signed_sum = |positive: bool| -> f64 {
        ranked
            .iter()
            .zip(&ranks)
            .filter(|(d, _)| if positive { **d > 0.0 } else { **d < 0.0 })
            .map(|(_, r)| r)
            .sum()
    };
    let t = signed_sum(true).min(signed_sum(false));

    // ties among the zeros do not count
    let nonzero_magnitudes: Vec<f64> = nonzero.iter().map(|d| d.abs()).collect();
    let (_, tie_term) = rank_with_ties(&nonzero_magnitudes);
    let n = ranked.len();

    let p = if zeros == 0 && n <= WILCOXON_EXACT_MAX && tie_term == 0.0 {
        2.0 * signed_rank_cdf(t, n)
    } else {
        let nf = n as f64;
        let zf = zeros as f64;
        let mean_t = (nf * (nf + 1.0) - zf * (zf + 1.0)) / 4.0;
        let var_t = (nf * (nf + 1.0) * (2.0 * nf + 1.0)
            - zf * (zf + 1.0) * (2.0 * zf + 1.0)
            - tie_term / 2.0)
            / 24.0;
        if !(var_t > 0.0) {
            return Ok(TestResult {
                statistic: t,
                p_value: f64::NAN,
            });
        }
        let z = (t - mean_t) / var_t.sqrt();
        2.0 * normal_sf(z.abs())
    };

    Ok(TestResult {
        statistic: t,
        p_value: p.min(1.0),
    })
}

/// P(W+ <= t) for the signed-rank statistic of n untied differences.
fn signed_rank_cdf(t: f64, n: usize) -> f64 {
    let max_sum = n * (n + 1) / 2;
    let mut counts = vec![0.0f64; max_sum + 1];
    counts[0] = 1.0;
    for rank in 1..=n {
        for s in (rank..=max_sum).rev() {
            counts[s] += counts[s - rank];
        }
    }
    let total = 2f64.powi(n as i32);
    let upto = t.floor().max(0.0) as usize;
    counts[..=upto.min(max_sum)].iter().sum::<f64>() / total
}

fn kruskal(a: &[f64], b: &[f64]) -> TestResult {
    if a.is_empty() || b.is_empty() {
        return TestResult::undefined();
    }
    let pooled: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, tie_term) = rank_with_ties(&pooled);
    let n = pooled.len() as f64;

    let (ra, rb) = ranks.split_at(a.len());
    let rank_term: f64 = [ra, rb]
        .iter()
        .map(|r| r.iter().sum::<f64>().powi(2) / r.len() as f64)
        .sum();
    let h = 12.0 / (n * (n + 1.0)) * rank_term - 3.0 * (n + 1.0);

    let correction = 1.0 - tie_term / (n * n * n - n);
    if !(correction > 0.0) {
        return TestResult::undefined();
    }
    let h = h / correction;
    let p = ChiSquared::new(1.0)
        .map(|dist| dist.sf(h))
        .unwrap_or(f64::NAN);
    TestResult {
        statistic: h,
        p_value: p,
    }
}
