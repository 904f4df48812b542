use crate::{Error, Filter, FilterCosts, FilterResult};
use oracle_gas::GasMeter;
use oracle_primitives::Reveal;
use std::collections::BTreeMap;
use tracing::debug;

/// Filter the reveals of a request.
///
/// Reveals must be sorted in tally order and each reveal's proxy keys must be
/// sorted. The returned [FilterResult] carries one of the outcome kinds in
/// `error` unless the committee reached consensus on its data.
pub fn execute(
    reveals: &[Reveal],
    input: &[u8],
    replication_factor: u16,
    costs: &FilterCosts,
    meter: &mut GasMeter,
) -> FilterResult {
    let mut result = FilterResult {
        executors: reveals.iter().map(|reveal| reveal.executor.clone()).collect(),
        errors: vec![false; reveals.len()],
        outliers: None,
        consensus: false,
        proxy_pub_keys: Vec::new(),
        error: None,
    };
    let threshold = replication_factor as usize * 2;

    // The first tuple to reach a new maximum decides the agreed proxies
    let mut frequencies: BTreeMap<(bool, &[String]), usize> = BTreeMap::new();
    let mut max_frequency = 0;
    for (position, reveal) in reveals.iter().enumerate() {
        let success = reveal.body.exit_code == 0;
        result.errors[position] = !success;
        let frequency = frequencies
            .entry((success, reveal.body.proxy_pub_keys.as_slice()))
            .or_default();
        *frequency += 1;
        if *frequency > max_frequency {
            max_frequency = *frequency;
            result.proxy_pub_keys = reveal.body.proxy_pub_keys.clone();
        }
    }
    if max_frequency * 3 < threshold {
        debug!(max_frequency, replication_factor, "no basic consensus");
        result.error = Some(Error::NoBasicConsensus);
        return result;
    }

    let filter = match Filter::build(input, replication_factor, costs, meter) {
        Ok(filter) => filter,
        Err(err) => {
            debug!(?err, "invalid filter input");
            result.error = Some(Error::InvalidFilterInput(Box::new(err)));
            return result;
        }
    };
    let (outliers, consensus) = filter.apply(reveals, &mut result.errors);

    let errors = result.errors.iter().filter(|error| **error).count();
    if errors * 3 >= threshold {
        result.consensus = true;
        result.outliers = Some(result.errors.iter().map(|error| !error).collect());
        result.error = Some(Error::ConsensusInError);
    } else if !consensus {
        result.error = Some(Error::NoConsensus);
    } else {
        result.consensus = true;
        result.outliers = Some(outliers);
    }
    result
}
