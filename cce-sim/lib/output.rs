//! Export of completed runs.

use std::{
    fs::File,
    path::{ Path, PathBuf },
};
use ndarray as nd;
use ndarray_npy::NpzWriter;
use crate::{
    cce::CceOutput,
    error::CceResult,
    mkdir,
};

/// Destination for the results of a run.
pub trait ResultSink {
    fn export(&mut self, output: &CceOutput) -> CceResult<()>;
}

/// Writes every result matrix to a single `.npz` archive:
/// - `CCE{k}`: raw coherence of order `k`, `n_time × count`
/// - `CCE{k}_tilde`: tilde values of order `k`
/// - `final_result_each_order`: per-order contribution, `n_time × max_order`
/// - `final_result`: cumulative coherence, `n_time × max_order`
/// - `time_list`: sample times
/// - `cluster_counts`: number of clusters at each order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NpzSink {
    path: PathBuf,
}

impl NpzSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl ResultSink for NpzSink {
    fn export(&mut self, output: &CceOutput) -> CceResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            mkdir!(dir)?;
        }
        let mut npz = NpzWriter::new(File::create(&self.path)?);
        for (k, (raw, tilde)) in output.raw.iter().zip(&output.tilde).enumerate() {
            npz.add_array(format!("CCE{}", k + 1), raw)?;
            npz.add_array(format!("CCE{}_tilde", k + 1), tilde)?;
        }
        npz.add_array("final_result_each_order", &output.coherence.each_order)?;
        npz.add_array("final_result", &output.coherence.cumulative)?;
        npz.add_array("time_list", &output.time)?;
        let counts: nd::Array1<u64>
            = output.counts.iter().map(|c| *c as u64).collect();
        npz.add_array("cluster_counts", &counts)?;
        npz.finish()?;
        tracing::info!(path = %self.path.display(), "wrote results");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::FinalCoherence;

    #[test]
    fn archive_contains_every_order() {
        let output = CceOutput {
            time: nd::array![0.0, 1.0],
            counts: vec![2, 1],
            raw: vec![nd::Array2::ones((2, 2)), nd::Array2::ones((2, 1))],
            tilde: vec![nd::Array2::ones((2, 2)), nd::Array2::ones((2, 1))],
            coherence: FinalCoherence {
                each_order: nd::Array2::ones((2, 2)),
                cumulative: nd::Array2::ones((2, 2)),
            },
            instabilities: Vec::new(),
        };
        let dir = std::env::temp_dir().join(format!("cce-output-{}", std::process::id()));
        let mut sink = NpzSink::new(dir.join("out.npz"));
        sink.export(&output).unwrap();
        let mut npz
            = ndarray_npy::NpzReader::new(File::open(sink.path()).unwrap()).unwrap();
        let mut names = npz.names().unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![
                "CCE1.npy", "CCE1_tilde.npy", "CCE2.npy", "CCE2_tilde.npy",
                "cluster_counts.npy", "final_result.npy",
                "final_result_each_order.npy", "time_list.npy",
            ],
        );
        let cce2: nd::Array2<f64> = npz.by_name("CCE2.npy").unwrap();
        assert_eq!(cce2.dim(), (2, 1));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
