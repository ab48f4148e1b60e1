//! Explicit parallel context handed to every component that talks to other ranks.
//!
//! The context bundles a [`Communicator`] with its [`ParallelConfig`]; it is
//! created once at the top of the pipeline and torn down after the last
//! collective.

use crate::algs::communicator::{tags, CommTag, Communicator};
use crate::config::ParallelConfig;
use crate::mesh_error::MeshError;
use std::time::Duration;

pub struct ParallelContext<C: Communicator> {
    comm: C,
    config: ParallelConfig,
}

impl<C: Communicator> ParallelContext<C> {
    /// Validate the configuration and wrap `comm`.
    pub fn init(comm: C, config: ParallelConfig) -> Result<Self, MeshError> {
        config.validate()?;
        log::debug!(
            "parallel context up: rank {} of {}",
            comm.rank(),
            comm.size()
        );
        Ok(Self { comm, config })
    }

    /// Release the communicator.
    pub fn teardown(self) -> C {
        log::debug!("parallel context down: rank {}", self.comm.rank());
        self.comm
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn config(&self) -> &ParallelConfig {
        &self.config
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config.recv_timeout
    }

    pub fn all_gather(&self, tag: CommTag, buf: &[u8]) -> Result<Vec<Vec<u8>>, MeshError> {
        self.comm.all_gather(tag, buf, self.timeout())
    }

    pub fn all_to_all(&self, tag: CommTag, bufs: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, MeshError> {
        self.comm.all_to_all(tag, bufs, self.timeout())
    }

    pub fn gather_to_root(
        &self,
        tag: CommTag,
        buf: &[u8],
    ) -> Result<Option<Vec<Vec<u8>>>, MeshError> {
        self.comm.gather_to_root(tag, buf, self.timeout())
    }

    /// Global maximum of a `u64`.
    pub fn max_u64(&self, tag: CommTag, value: u64) -> Result<u64, MeshError> {
        let parts = self.all_gather(tag, &value.to_le_bytes())?;
        parts
            .iter()
            .enumerate()
            .map(|(rank, bytes)| decode_u64(rank, bytes))
            .try_fold(0u64, |acc, v| Ok(acc.max(v?)))
    }

    /// Global sum of `f64` vectors of equal length.
    pub fn sum_f64(&self, values: &[f64]) -> Result<Vec<f64>, MeshError> {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let parts = self.all_gather(tags::REDUCE, &bytes)?;
        let mut out = vec![0.0; values.len()];
        for (rank, part) in parts.iter().enumerate() {
            if part.len() != bytes.len() {
                return Err(MeshError::BufferSizeMismatch {
                    neighbor: rank,
                    expected: bytes.len(),
                    got: part.len(),
                });
            }
            for (acc, chunk) in out.iter_mut().zip(part.chunks_exact(8)) {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                *acc += f64::from_le_bytes(raw);
            }
        }
        Ok(out)
    }

    /// Exclusive prefix sum of `count` over ranks, plus the global total.
    pub fn exclusive_prefix_sum(&self, tag: CommTag, count: u64) -> Result<(u64, u64), MeshError> {
        let parts = self.all_gather(tag, &count.to_le_bytes())?;
        let mut offset = 0;
        let mut total = 0;
        for (rank, bytes) in parts.iter().enumerate() {
            let v = decode_u64(rank, bytes)?;
            if rank < self.rank() {
                offset += v;
            }
            total += v;
        }
        Ok((offset, total))
    }
}

fn decode_u64(rank: usize, bytes: &[u8]) -> Result<u64, MeshError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| MeshError::BufferSizeMismatch {
        neighbor: rank,
        expected: 8,
        got: bytes.len(),
    })?;
    Ok(u64::from_le_bytes(raw))
}
