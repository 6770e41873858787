//! CSV-backed replay of pre-measured orderings.
//!
//! Row format: `pct01,pct10,pct50,pct90,pct99,stddev,op1,op2,…` with
//! operation identifiers as produced by `BoundOp::ident` (`name` for
//! host ops, `name@stream` for bound accelerator ops). A header line is
//! permitted and skipped.

use std::path::Path;

use tracing::info;

use cadence_core::bench::{BenchResult, Benchmarker};
use cadence_core::error::{CoreError, Result};
use cadence_core::graph::Graph;
use cadence_core::ops::BoundOp;
use cadence_core::platform::Platform;
use cadence_core::serdes::op_from_ident;

#[derive(Debug)]
struct DataRow {
    result: BenchResult,
    seq: Vec<BoundOp>,
}

/// Looks orderings up in a file of previously measured results instead
/// of running anything.
#[derive(Debug)]
pub struct CsvBenchmarker {
    rows: Vec<DataRow>,
}

impl CsvBenchmarker {
    /// Load `path`, resolving operation identities against `g`.
    pub fn new(path: impl AsRef<Path>, g: &Graph) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;

        let mut rows = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || (lineno == 0 && line.starts_with("pct01")) {
                continue;
            }

            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 7 {
                return Err(CoreError::Parse(format!(
                    "{}:{}: expected 6 numeric fields plus an ordering",
                    path.display(),
                    lineno + 1
                )));
            }

            let mut nums = [0f64; 6];
            for (i, raw) in fields[..6].iter().enumerate() {
                nums[i] = raw.parse().map_err(|_| {
                    CoreError::Parse(format!(
                        "{}:{}: bad numeric field {raw:?}",
                        path.display(),
                        lineno + 1
                    ))
                })?;
            }

            let seq = fields[6..]
                .iter()
                .map(|ident| op_from_ident(ident, g))
                .collect::<Result<Vec<_>>>()?;

            rows.push(DataRow {
                result: BenchResult {
                    pct01: nums[0],
                    pct10: nums[1],
                    pct50: nums[2],
                    pct90: nums[3],
                    pct99: nums[4],
                    stddev: nums[5],
                },
                seq,
            });
        }

        info!("loaded {} replay rows from {}", rows.len(), path.display());
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Benchmarker for CsvBenchmarker {
    fn benchmark(&mut self, order: &[BoundOp], _plat: &mut Platform) -> Result<BenchResult> {
        self.rows
            .iter()
            .find(|row| row.seq.as_slice() == order)
            .map(|row| row.result)
            .ok_or_else(|| {
                let idents: Vec<String> = order.iter().map(|op| op.ident()).collect();
                CoreError::ReplayMiss(idents.join(","))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use cadence_comm::local::LocalComm;
    use cadence_core::device::NullDevice;
    use cadence_core::error::Result as CoreResult;
    use cadence_core::ops::{GpuTask, NoOp, OpRef};
    use cadence_core::types::Stream;

    struct FakeGpu(&'static str);

    impl GpuTask for FakeGpu {
        fn name(&self) -> &str {
            self.0
        }
        fn run(&self, _plat: &mut Platform, _stream: Stream) -> CoreResult<()> {
            Ok(())
        }
    }

    fn demo_graph() -> Graph {
        let start = OpRef::cpu(NoOp::new("start"));
        let k = OpRef::gpu(FakeGpu("k"));
        let done = OpRef::cpu(NoOp::new("done"));
        let mut g = Graph::new(start.clone());
        g.add_edge(&start, &k);
        g.add_edge(&k, &done);
        g
    }

    fn platform() -> Platform {
        Platform::with_streams(2, Box::new(NullDevice::new()), Arc::new(LocalComm::solo()))
            .unwrap()
    }

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_replay_returns_recorded_result() {
        let g = demo_graph();
        let csv = write_csv(
            "pct01,pct10,pct50,pct90,pct99,stddev,op1\n\
             0.1,0.2,0.3,0.4,0.5,0.01,start,k@1,done\n\
             0.2,0.3,0.4,0.5,0.6,0.02,start,k@2,done\n",
        );

        let mut bench = CsvBenchmarker::new(csv.path(), &g).unwrap();
        assert_eq!(bench.len(), 2);

        let order = vec![
            op_from_ident("start", &g).unwrap(),
            op_from_ident("k@2", &g).unwrap(),
            op_from_ident("done", &g).unwrap(),
        ];
        let r = bench.benchmark(&order, &mut platform()).unwrap();
        assert_eq!(r.pct50, 0.4);
        assert_eq!(r.stddev, 0.02);
    }

    #[test]
    fn test_unmatched_ordering_is_a_miss() {
        let g = demo_graph();
        let csv = write_csv("0.1,0.2,0.3,0.4,0.5,0.01,start,k@1,done\n");

        let mut bench = CsvBenchmarker::new(csv.path(), &g).unwrap();
        let order = vec![
            op_from_ident("start", &g).unwrap(),
            op_from_ident("k@3", &g).unwrap(),
            op_from_ident("done", &g).unwrap(),
        ];
        let err = bench.benchmark(&order, &mut platform()).unwrap_err();
        assert!(matches!(err, CoreError::ReplayMiss(_)));
    }

    #[test]
    fn test_bad_numeric_field_is_a_parse_error() {
        let g = demo_graph();
        let csv = write_csv("0.1,zzz,0.3,0.4,0.5,0.01,start\n");
        let err = CsvBenchmarker::new(csv.path(), &g).unwrap_err();
        assert!(matches!(err, CoreError::Parse(_)));
    }

    #[test]
    fn test_unknown_operation_name_is_fatal() {
        let g = demo_graph();
        let csv = write_csv("0.1,0.2,0.3,0.4,0.5,0.01,start,ghost\n");
        let err = CsvBenchmarker::new(csv.path(), &g).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
