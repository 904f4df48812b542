//! Policies crediting execution gas to data proxies and committee members.
//!
//! Every policy caps the gas credited per execution at the remaining
//! execution gas divided by the replication factor, so that the whole
//! committee can never be credited more than the request paid for.

use crate::GasMeter;
use oracle_primitives::Identity;
use std::collections::BTreeSet;

fn per_exec_limit(meter: &GasMeter, replication_factor: u16) -> u64 {
    meter.exec_gas_remaining() / (replication_factor.max(1) as u64)
}

fn is_outlier(outliers: Option<&[bool]>, position: usize) -> bool {
    outliers.is_some_and(|outliers| outliers.get(position).copied().unwrap_or(false))
}

/// Gas a data proxy is credited per execution: its fee converted to gas at
/// `gas_price`, capped at the per-execution limit.
pub fn proxy_gas_per_exec(meter: &GasMeter, fee: u128, replication_factor: u16) -> u64 {
    let gas = fee.checked_div(meter.gas_price()).unwrap_or(0);
    let gas = u64::try_from(gas).unwrap_or(u64::MAX);
    gas.min(per_exec_limit(meter, replication_factor))
}

/// Credit every committer with the fallback cost.
///
/// Used when the committee never agreed on what it executed. Committers are
/// credited in identity order and, if anyone revealed, only revealers are
/// credited.
pub fn meter_fallback(
    meter: &mut GasMeter,
    committers: &BTreeSet<Identity>,
    revealers: &BTreeSet<Identity>,
    replication_factor: u16,
    fallback_cost: u64,
) {
    if committers.is_empty() || meter.exec_gas_remaining() == 0 {
        return;
    }
    let gas = per_exec_limit(meter, replication_factor).min(fallback_cost);
    for committer in committers {
        if !revealers.is_empty() && !revealers.contains(committer) {
            continue;
        }
        meter.consume_exec_gas_for_executor(committer.clone(), gas);
    }
}

/// Returns true if every gas report is the same.
pub fn are_reports_uniform(reports: &[u64]) -> bool {
    reports.windows(2).all(|pair| pair[0] == pair[1])
}

/// Credit every non-outlier the (corrected) uniform report.
pub fn meter_uniform(
    meter: &mut GasMeter,
    executors: &[Identity],
    report: u64,
    outliers: Option<&[bool]>,
    replication_factor: u16,
) {
    let gas = meter
        .correct_exec_gas_report(report)
        .min(per_exec_limit(meter, replication_factor));
    for (position, executor) in executors.iter().enumerate() {
        if is_outlier(outliers, position) {
            continue;
        }
        meter.consume_exec_gas_for_executor(executor.clone(), gas);
    }
}

/// Credit non-outliers when their reports differ.
///
/// The lowest reporter is credited up to twice its report (but no more than
/// the median) and everyone else the median, scaled so that the sum never
/// exceeds `median * (rf - 1) + min(2 * lowest, median)`.
pub fn meter_divergent(
    meter: &mut GasMeter,
    executors: &[Identity],
    reports: &[u64],
    outliers: Option<&[bool]>,
    replication_factor: u16,
) {
    if reports.is_empty() {
        return;
    }
    let limit = per_exec_limit(meter, replication_factor);
    let adjusted: Vec<u64> = reports
        .iter()
        .map(|report| meter.correct_exec_gas_report(*report).min(limit))
        .collect();

    // First occurrence wins ties
    let mut lowest_position = 0;
    for (position, report) in adjusted.iter().enumerate() {
        if *report < adjusted[lowest_position] {
            lowest_position = position;
        }
    }
    let lowest = adjusted[lowest_position] as u128;
    let median = median(&adjusted) as u128;

    let others = (replication_factor.max(1) - 1) as u128;
    let total = median * others + (lowest * 2).min(median);
    let shares = median * others + lowest * 2;
    let (lowest_gas, regular_gas) = if shares == 0 {
        (0, 0)
    } else {
        (
            clamp(lowest * 2 * total / shares),
            clamp(median * total / shares),
        )
    };

    for (position, executor) in executors.iter().enumerate() {
        if is_outlier(outliers, position) {
            continue;
        }
        let gas = if position == lowest_position {
            lowest_gas
        } else {
            regular_gas
        };
        meter.consume_exec_gas_for_executor(executor.clone(), gas);
    }
}

/// Credit committee members with the uniform or divergent policy depending on
/// their reports.
pub fn meter_executors(
    meter: &mut GasMeter,
    executors: &[Identity],
    reports: &[u64],
    outliers: Option<&[bool]>,
    replication_factor: u16,
) {
    match reports.first() {
        None => {}
        Some(report) if are_reports_uniform(reports) => {
            meter_uniform(meter, executors, *report, outliers, replication_factor)
        }
        Some(_) => meter_divergent(meter, executors, reports, outliers, replication_factor),
    }
}

/// Median of `values`, averaging (rounded down) the two middle values of an
/// even-length list.
fn median(values: &[u64]) -> u64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n == 0 {
        return 0;
    }
    if n % 2 == 0 {
        ((sorted[n / 2 - 1] as u128 + sorted[n / 2] as u128) / 2) as u64
    } else {
        sorted[n / 2]
    }
}

fn clamp(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use commonware_macros::test_traced;
    use test_case::test_case;

    fn identities(n: u8) -> Vec<Identity> {
        (0..n).map(|i| Identity::new(vec![i])).collect()
    }

    fn credited(meter: &GasMeter) -> Vec<u64> {
        meter.executors().iter().map(|e| e.amount).collect()
    }

    #[test_case(&[], true; "empty")]
    #[test_case(&[5], true; "single")]
    #[test_case(&[5, 5, 5], true; "equal")]
    #[test_case(&[5, 5, 6], false; "different")]
    fn test_are_reports_uniform(reports: &[u64], expected: bool) {
        assert_eq!(are_reports_uniform(reports), expected);
    }

    #[test_case(&[100, 200, 300], &[200, 200, 200]; "lowest doubled reaches median")]
    #[test_case(&[50, 300, 300], &[100, 300, 300]; "lowest doubled below median")]
    #[test_case(&[200, 300, 300], &[360, 270, 270]; "shares scaled")]
    #[test_case(&[300, 200, 200], &[150, 300, 150]; "first lowest wins")]
    #[test_case(&[0, 0, 7], &[0, 0, 0]; "zero median")]
    fn test_divergent(reports: &[u64], expected: &[u64]) {
        let mut meter = GasMeter::new(0, 0, 1_000_000, 1, 0);
        meter_divergent(&mut meter, &identities(3), reports, None, 3);
        assert_eq!(credited(&meter), expected);
    }

    #[test_traced]
    fn test_divergent_never_exceeds_total() {
        let mut meter = GasMeter::new(0, 0, 1_000_000, 1, 0);
        let reports = [10, 1_000, 2_000, 2_000, 90_000];
        meter_divergent(&mut meter, &identities(5), &reports, None, 5);
        let median = 2_000u64;
        let total: u64 = credited(&meter).iter().sum();
        assert!(total <= median * 4 + 20);
    }

    #[test_traced]
    fn test_divergent_skips_outliers_and_caps() {
        // 900 / 3 = 300 per execution
        let mut meter = GasMeter::new(0, 0, 900, 1, 0);
        let outliers = [false, true, false];
        meter_divergent(
            &mut meter,
            &identities(3),
            &[1_000, 5, 2_000],
            Some(&outliers[..]),
            3,
        );
        assert_eq!(meter.executors().len(), 2);
        assert_eq!(meter.executors()[0].identity, Identity::new(vec![0]));
        assert_eq!(meter.executors()[1].identity, Identity::new(vec![2]));
        assert!(meter.exec_gas_used() <= 900);
    }

    #[test_traced]
    fn test_uniform_corrects_and_caps() {
        let mut meter = GasMeter::new(0, 0, 3_000, 1, 0);
        meter.consume_exec_gas_for_proxy("aa".into(), "payout".into(), 100, 3);
        // (3000 - 300) / 3 = 900 limit, corrected report 500 - 100 = 400
        meter_uniform(&mut meter, &identities(3), 500, None, 3);
        assert_eq!(credited(&meter), vec![400, 400, 400]);

        let mut meter = GasMeter::new(0, 0, 3_000, 1, 0);
        let outliers = [true, false, false];
        meter_uniform(&mut meter, &identities(3), 5_000, Some(&outliers[..]), 3);
        assert_eq!(credited(&meter), vec![1_000, 1_000]);
    }

    #[test_traced]
    fn test_fallback() {
        let committers: BTreeSet<Identity> = identities(3).into_iter().collect();

        let mut meter = GasMeter::new(0, 0, 3_000, 1, 0);
        meter_fallback(&mut meter, &committers, &BTreeSet::new(), 3, 200);
        assert_eq!(credited(&meter), vec![200, 200, 200]);

        let revealers: BTreeSet<Identity> = [Identity::new(vec![2])].into_iter().collect();
        let mut meter = GasMeter::new(0, 0, 3_000, 1, 0);
        meter_fallback(&mut meter, &committers, &revealers, 3, 5_000);
        assert_eq!(meter.executors().len(), 1);
        assert_eq!(meter.executors()[0].amount, 1_000);

        let mut meter = GasMeter::new(0, 0, 0, 1, 0);
        meter_fallback(&mut meter, &committers, &BTreeSet::new(), 3, 200);
        assert!(meter.executors().is_empty());
    }

    #[test_case(10_000, 100, 100; "fee converted")]
    #[test_case(u128::MAX, 1, 333; "capped at per-execution limit")]
    #[test_case(99, 100, 0; "fee below price")]
    fn test_proxy_gas_per_exec(fee: u128, price: u128, expected: u64) {
        let meter = GasMeter::new(0, 0, 1_000, price, 0);
        assert_eq!(proxy_gas_per_exec(&meter, fee, 3), expected);
    }
}
