//! Tally program invocations.

use crate::{TallyVm, VmResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use commonware_utils::hex;
use oracle_primitives::{DataRequest, Reveal};
use rayon::{prelude::*, ThreadPool};
use serde::Serialize;
use std::collections::BTreeMap;

/// A reveal as seen by tally programs.
#[derive(Serialize)]
struct RevealArg<'a> {
    executor: String,
    dr_id: String,
    dr_block_height: u64,
    exit_code: u8,
    gas_used: u64,
    reveal: &'a [u8],
    proxy_public_keys: &'a [String],
}

/// A tally program ready to be executed.
#[derive(Clone, Debug)]
pub(crate) struct Job {
    pub program: Vec<u8>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub gas_limit: u64,
}

impl Job {
    /// Prepare the tally program of `request` over its sorted `reveals`.
    ///
    /// Arguments are the hex-encoded tally inputs, the reveals as JSON (with
    /// reveal payloads as byte arrays), and the outlier mask as a JSON array
    /// of 0 and 1.
    pub fn new(
        request: &DataRequest,
        program: Vec<u8>,
        reveals: &[Reveal],
        outliers: &[bool],
        consensus: bool,
        gas_limit: u64,
        height: u64,
    ) -> Result<Self, serde_json::Error> {
        let body = &request.body;
        let reveals: Vec<RevealArg<'_>> = reveals
            .iter()
            .map(|reveal| RevealArg {
                executor: reveal.executor.to_hex(),
                dr_id: reveal.body.dr_id.to_string(),
                dr_block_height: reveal.body.dr_block_height,
                exit_code: reveal.body.exit_code,
                gas_used: reveal.body.gas_used,
                reveal: &reveal.body.reveal,
                proxy_public_keys: &reveal.body.proxy_pub_keys,
            })
            .collect();
        let outliers: Vec<u8> = outliers.iter().map(|outlier| *outlier as u8).collect();
        let args = vec![
            hex(&body.tally_inputs),
            serde_json::to_string(&reveals)?,
            serde_json::to_string(&outliers)?,
        ];

        let env = [
            ("VM_MODE", "tally".to_string()),
            ("CONSENSUS", consensus.to_string()),
            ("BLOCK_HEIGHT", height.to_string()),
            ("DR_ID", request.id.to_string()),
            ("DR_REPLICATION_FACTOR", body.replication_factor.to_string()),
            ("EXEC_PROGRAM_ID", body.exec_program_id.to_string()),
            ("EXEC_INPUTS", STANDARD.encode(&body.exec_inputs)),
            ("EXEC_GAS_LIMIT", body.exec_gas_limit.to_string()),
            ("TALLY_INPUTS", STANDARD.encode(&body.tally_inputs)),
            ("TALLY_PROGRAM_ID", body.tally_program_id.to_string()),
            ("DR_TALLY_GAS_LIMIT", gas_limit.to_string()),
            ("DR_GAS_PRICE", request.posted_gas_price.to_string()),
            ("DR_MEMO", STANDARD.encode(&body.memo)),
            ("DR_PAYBACK_ADDRESS", hex(&body.payback_address)),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();

        Ok(Self {
            program,
            args,
            env,
            gas_limit,
        })
    }
}

/// Execute `jobs`, on `pool` if provided, returning results in job order.
pub(crate) fn run<M: TallyVm>(vm: &M, pool: Option<&ThreadPool>, jobs: &[Job]) -> Vec<VmResult> {
    let execute = |job: &Job| vm.execute(&job.program, &job.args, &job.env, job.gas_limit);
    match pool {
        Some(pool) => pool.install(|| jobs.par_iter().map(execute).collect()),
        None => jobs.iter().map(execute).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use oracle_primitives::{Identity, RevealBody};
    use rayon::ThreadPoolBuilder;

    fn reveals(request: &DataRequest) -> Vec<Reveal> {
        vec![
            Reveal {
                executor: Identity::new(vec![0xaa]),
                body: RevealBody {
                    dr_id: request.id,
                    dr_block_height: request.height,
                    exit_code: 0,
                    gas_used: 12,
                    reveal: b"10".to_vec(),
                    proxy_pub_keys: vec!["ab".into()],
                },
            },
            Reveal {
                executor: Identity::new(vec![0xbb]),
                body: RevealBody {
                    dr_id: request.id,
                    dr_block_height: request.height,
                    exit_code: 1,
                    reveal: vec![],
                    ..Default::default()
                },
            },
        ]
    }

    #[test]
    fn test_job() {
        let (engine, id) = mocks::posted(1, 1, 10);
        let mut request = engine.get_request(&id).unwrap();
        request.body.tally_inputs = vec![0x01, 0xff];
        request.body.memo = b"memo".to_vec();
        request.body.payback_address = vec![0xca, 0xfe];
        let reveals = reveals(&request);

        let job = Job::new(&request, vec![1, 2], &reveals, &[false, true], true, 777, 42).unwrap();
        assert_eq!(job.gas_limit, 777);
        assert_eq!(job.args[0], "01ff");
        assert_eq!(job.args[2], "[0,1]");

        let parsed: serde_json::Value = serde_json::from_str(&job.args[1]).unwrap();
        assert_eq!(parsed[0]["executor"], "aa");
        assert_eq!(parsed[0]["reveal"], serde_json::json!([49, 48]));
        assert_eq!(parsed[0]["proxy_public_keys"], serde_json::json!(["ab"]));
        assert_eq!(parsed[1]["exit_code"], 1);
        assert_eq!(parsed[1]["dr_id"], id.to_string());

        assert_eq!(job.env["VM_MODE"], "tally");
        assert_eq!(job.env["CONSENSUS"], "true");
        assert_eq!(job.env["BLOCK_HEIGHT"], "42");
        assert_eq!(job.env["DR_ID"], id.to_string());
        assert_eq!(job.env["DR_REPLICATION_FACTOR"], "1");
        assert_eq!(job.env["DR_TALLY_GAS_LIMIT"], "777");
        assert_eq!(job.env["DR_GAS_PRICE"], request.posted_gas_price.to_string());
        assert_eq!(job.env["TALLY_INPUTS"], "Af8=");
        assert_eq!(job.env["DR_MEMO"], "bWVtbw==");
        assert_eq!(job.env["DR_PAYBACK_ADDRESS"], "cafe");
        assert_eq!(job.env.len(), 14);
    }

    #[test]
    fn test_run_preserves_order() {
        let (engine, id) = mocks::posted(1, 1, 10);
        let request = engine.get_request(&id).unwrap();
        let reveals = reveals(&request);
        let jobs: Vec<Job> = (0..16u64)
            .map(|gas_limit| {
                // Alternate which reveal is the only non-outlier
                let outliers = [gas_limit % 2 == 1, gas_limit % 2 == 0];
                Job::new(&request, vec![], &reveals, &outliers, true, gas_limit, 1).unwrap()
            })
            .collect();
        let vm = mocks::Vm::default();

        let sequential = run(&vm, None, &jobs);
        let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let parallel = run(&vm, Some(&pool), &jobs);
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.len(), 16);
        assert_eq!(sequential[0].result, b"10".to_vec());
        assert_eq!(sequential[1].result, Vec::<u8>::new());
        assert_eq!(vm.calls(), 32);
    }
}
