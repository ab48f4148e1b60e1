//! Globally consistent ids for vertices created by the decomposition.
//!
//! Each rank contributes the keys of its created vertices, flagged when one of
//! its owned cells uses the vertex. The union is sorted by key on every rank,
//! so position `i` in it names the same vertex everywhere; its id is
//! `max background node id + 1 + i` and its owner the smallest flagging rank.
//!
//! Every rank holds the whole union while ids are assigned, so memory per rank
//! grows with the number of vertices created on all ranks, not with the local
//! part. That is fine for the cut counts this crate targets; past that, the
//! all-gather should shrink to the keys used by aura cells, with the owned
//! vertices numbered from an exclusive prefix sum of per-rank counts.

use std::collections::BTreeMap;

use crate::algs::communicator::{Communicator, tags};
use crate::algs::context::ParallelContext;
use crate::cut::vertex::{VertexKey, VertexTable};
use crate::mesh_error::MeshError;
use crate::topology::point::PointId;

/// Outcome of the id exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdSummary {
    /// Id given to the first created vertex in key order.
    pub first_id: u64,
    /// Created vertices across all ranks.
    pub num_global: usize,
    /// Created vertices known to this rank.
    pub num_local: usize,
}

/// Assign ids and owners to every created vertex of `vertices`.
///
/// `used_by_owned_cell[h]` tells whether handle `h` belongs to a child mesh
/// of a cell this rank owns. Blocking collective: every rank must call it.
pub fn assign_global_ids<C: Communicator>(
    vertices: &mut VertexTable,
    used_by_owned_cell: &[bool],
    max_local_node_id: u64,
    ctx: &ParallelContext<C>,
) -> Result<IdSummary, MeshError> {
    let local: Vec<(VertexKey, bool)> = vertices
        .created()
        .map(|(h, v)| (v.key.clone(), used_by_owned_cell.get(h).copied().unwrap_or(false)))
        .collect();
    let payload = bincode::serialize(&local)?;
    let parts = ctx.all_gather(tags::VERTEX_KEYS, &payload)?;

    // key -> (smallest flagging rank, smallest reporting rank)
    let mut union: BTreeMap<VertexKey, (Option<usize>, usize)> = BTreeMap::new();
    for (rank, part) in parts.iter().enumerate() {
        let keys: Vec<(VertexKey, bool)> = bincode::deserialize(part)?;
        for (key, owned) in keys {
            let entry = union.entry(key).or_insert((None, rank));
            if owned && entry.0.is_none_or(|r| rank < r) {
                entry.0 = Some(rank);
            }
            entry.1 = entry.1.min(rank);
        }
    }

    let max_id = ctx.max_u64(tags::MAX_NODE_ID, max_local_node_id)?;
    let first_id = max_id + 1;
    let mut num_local = 0;
    for (position, (key, (owner, reporter))) in union.iter().enumerate() {
        let Some(handle) = vertices.find(key) else {
            continue;
        };
        let owner = owner.unwrap_or_else(|| {
            log::warn!("vertex {key:?} is not used by any owned cell; assigning rank {reporter}");
            *reporter
        });
        vertices.set_global_id(handle, PointId::new(first_id + position as u64)?, owner)?;
        num_local += 1;
    }
    log::debug!(
        "rank {}: {} created vertices identified ({} global), ids from {}",
        ctx.rank(),
        num_local,
        union.len(),
        first_id
    );
    Ok(IdSummary {
        first_id,
        num_global: union.len(),
        num_local,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{LocalComm, NoComm};
    use crate::config::ParallelConfig;
    use crate::cut::vertex::{CutVertex, VertexOrigin};
    use std::thread;

    fn table_with(keys: &[VertexKey]) -> VertexTable {
        let p = |id| PointId::new(id).unwrap();
        let mut t = VertexTable::with_background([(p(1), [0.0; 3], 0), (p(2), [1.0, 0.0, 0.0], 0)]);
        for key in keys {
            let k = key.clone();
            let row = t.len();
            t.get_or_insert_with(key.clone(), || {
                Ok(CutVertex {
                    key: k,
                    coords: [0.5, 0.0, 0.0],
                    row,
                    origin: VertexOrigin::Template,
                    id: None,
                    owner: None,
                })
            })
            .unwrap();
        }
        t
    }

    #[test]
    fn serial_ids_follow_key_order() {
        let ctx = ParallelContext::init(NoComm, ParallelConfig::default()).unwrap();
        let mut t = table_with(&[VertexKey::CellCenter(9), VertexKey::CellCenter(4)]);
        let summary = assign_global_ids(&mut t, &[true; 4], 2, &ctx).unwrap();
        assert_eq!(summary.first_id, 3);
        assert_eq!(t.global_id(3).unwrap().get(), 3); // CellCenter(4)
        assert_eq!(t.global_id(2).unwrap().get(), 4); // CellCenter(9)
        assert_eq!(t.get(2).unwrap().owner, Some(0));
    }

    #[test]
    fn ranks_agree_on_shared_vertices() {
        let comms = LocalComm::world(2);
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let rank = comm.rank();
                    let ctx = ParallelContext::init(comm, ParallelConfig::default()).unwrap();
                    let shared = VertexKey::FaceCenter(vec![1, 2]);
                    let own = VertexKey::CellCenter(10 + rank as u64);
                    let mut t = table_with(&[own, shared.clone()]);
                    // only rank 1 owns a cell using the shared vertex
                    let flags = [false, false, true, rank == 1];
                    let summary = assign_global_ids(&mut t, &flags, 2, &ctx).unwrap();
                    let h = t.find(&shared).unwrap();
                    (summary, t.global_id(h).unwrap(), t.get(h).unwrap().owner)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0].0.num_global, 3);
        assert_eq!(results[0].1, results[1].1);
        assert_eq!(results[0].2, Some(1));
        assert_eq!(results[1].2, Some(1));
    }
}
