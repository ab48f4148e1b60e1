//! Global coefficient ids of enriched basis functions.
//!
//! Every (basis, level) pair is one coefficient. The owner of a basis numbers
//! its pairs, contiguous per rank through an exclusive prefix sum, in
//! ascending basis id then level order. Other ranks identify a level by its
//! smallest-key unit and ask the owner:
//!
//! 1. requester → owner: [`WireCoefficientRequest`] `(basis id, unit key, local level)`
//! 2. owner → requester: [`WireCoefficientResponse`] `(local level, coefficient, owner level)`,
//!    in request order.
//!
//! Both legs are a single `all_to_all`, so every rank takes part even with
//! nothing to ask.

use crate::algs::communicator::{tags, Communicator};
use crate::algs::context::ParallelContext;
use crate::algs::wire::{
    decode_records, encode_records, WireCoefficientRequest, WireCoefficientResponse, WireHdr,
};
use crate::background::basis::InterpolationBasis;
use crate::enrich::engine::{EnrichmentUnits, UnitKey};
use crate::enrich::flood_fill::BasisLevels;
use crate::mesh_error::MeshError;

const UNASSIGNED: u64 = u64::MAX;

/// Coefficient id of every (basis, level) pair known to this rank.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoefficientTable {
    ids: Vec<Vec<u64>>,
    num_owned: usize,
    first_owned: u64,
    total: u64,
}

impl CoefficientTable {
    pub fn id(&self, basis: usize, level: usize) -> Result<u64, MeshError> {
        let levels = self.ids.get(basis).ok_or(MeshError::IndexOutOfBounds {
            what: "basis",
            index: basis,
            len: self.ids.len(),
        })?;
        levels.get(level).copied().ok_or(MeshError::IndexOutOfBounds {
            what: "enrichment level",
            index: level,
            len: levels.len(),
        })
    }

    /// Coefficient ids of every level of `basis`.
    pub fn levels(&self, basis: usize) -> &[u64] {
        self.ids.get(basis).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Coefficients numbered by this rank.
    pub fn num_owned(&self) -> usize {
        self.num_owned
    }

    /// Owned ids are `first_owned() .. first_owned() + num_owned()`.
    pub fn first_owned(&self) -> u64 {
        self.first_owned
    }

    /// Coefficients over all ranks.
    pub fn total(&self) -> u64 {
        self.total
    }
}

struct Pending {
    basis: usize,
    level: usize,
}

/// Number owned pairs and fetch the ids of the others. Collective.
pub fn assign_coefficient_ids<B, C>(
    levels: &[BasisLevels],
    units: &EnrichmentUnits,
    basis: &B,
    ctx: &ParallelContext<C>,
) -> Result<CoefficientTable, MeshError>
where
    B: InterpolationBasis + ?Sized,
    C: Communicator,
{
    let me = ctx.rank();
    let size = ctx.size();
    let mut ids: Vec<Vec<u64>> = levels
        .iter()
        .map(|l| vec![UNASSIGNED; l.num_levels])
        .collect();

    // owned pairs, ascending basis id
    let mut owned: Vec<(u64, usize)> = Vec::new();
    let mut remote: Vec<(u64, usize, usize)> = Vec::new();
    for l in levels {
        if l.num_levels == 0 {
            continue;
        }
        let id = basis.basis_id(l.basis)?;
        let owner = basis.basis_owner(l.basis)?;
        if owner == me {
            owned.push((id, l.basis));
        } else if owner < size {
            remote.push((id, l.basis, owner));
        } else {
            return Err(MeshError::InvalidConfig(format!(
                "basis {id} is owned by rank {owner}, but the communicator has {size} ranks"
            )));
        }
    }
    owned.sort_unstable();
    remote.sort_unstable();

    let count: usize = owned.iter().map(|&(_, b)| ids[b].len()).sum();
    let (first_owned, total) = ctx.exclusive_prefix_sum(tags::COEFFICIENT_COUNTS, count as u64)?;
    let mut next = first_owned;
    for &(_, b) in &owned {
        for slot in ids[b].iter_mut() {
            *slot = next;
            next += 1;
        }
    }

    let mut requests: Vec<Vec<WireCoefficientRequest>> = vec![Vec::new(); size];
    let mut pending: Vec<Vec<Pending>> = (0..size).map(|_| Vec::new()).collect();
    for &(id, b, owner) in &remote {
        for (level, &rep) in levels[b].representatives.iter().enumerate() {
            let key = units.key(rep);
            requests[owner].push(WireCoefficientRequest::new(
                id,
                key.cell,
                key.ordinal,
                level as u64,
            ));
            pending[owner].push(Pending { basis: b, level });
        }
    }
    let outgoing: Vec<Vec<u8>> = requests
        .iter()
        .map(|r| encode_records(WireHdr::COEFFICIENT_REQUEST, r))
        .collect();
    let incoming = ctx.all_to_all(tags::COEFFICIENT_REQUEST, &outgoing)?;

    let mut replies: Vec<Vec<u8>> = Vec::with_capacity(size);
    for (peer, buf) in incoming.iter().enumerate() {
        let reqs: Vec<WireCoefficientRequest> = if peer == me {
            Vec::new()
        } else {
            decode_records(peer, WireHdr::COEFFICIENT_REQUEST, buf)?
        };
        let mut out = Vec::with_capacity(reqs.len());
        for req in &reqs {
            out.push(answer(req, peer, me, levels, units, basis, &ids)?);
        }
        replies.push(encode_records(WireHdr::COEFFICIENT_RESPONSE, &out));
    }
    let answers = ctx.all_to_all(tags::COEFFICIENT_RESPONSE, &replies)?;

    for (peer, buf) in answers.iter().enumerate() {
        if pending[peer].is_empty() {
            continue;
        }
        let resp: Vec<WireCoefficientResponse> =
            decode_records(peer, WireHdr::COEFFICIENT_RESPONSE, buf)?;
        if resp.len() != pending[peer].len() {
            return Err(MeshError::CommError {
                neighbor: peer,
                reason: format!(
                    "asked for {} coefficients, got {}",
                    pending[peer].len(),
                    resp.len()
                ),
            });
        }
        for (p, r) in pending[peer].iter().zip(&resp) {
            if r.proposed() != p.level as u64 {
                return Err(MeshError::CommError {
                    neighbor: peer,
                    reason: format!(
                        "response for level {} answers level {}",
                        p.level,
                        r.proposed()
                    ),
                });
            }
            if r.level() as usize != p.level {
                log::trace!(
                    "basis {}: local level {} is level {} on rank {peer}",
                    p.basis,
                    p.level,
                    r.level()
                );
            }
            ids[p.basis][p.level] = r.coefficient();
        }
    }

    if let Some((b, _)) = ids
        .iter()
        .enumerate()
        .find(|(_, l)| l.contains(&UNASSIGNED))
    {
        return Err(MeshError::VerificationFailed(format!(
            "basis {b} has an enrichment level without a coefficient"
        )));
    }
    log::debug!(
        "rank {me}: {count} owned coefficients from {first_owned}, {total} in total"
    );
    Ok(CoefficientTable {
        ids,
        num_owned: count,
        first_owned,
        total,
    })
}

fn answer<B: InterpolationBasis + ?Sized>(
    req: &WireCoefficientRequest,
    peer: usize,
    me: usize,
    levels: &[BasisLevels],
    units: &EnrichmentUnits,
    basis: &B,
    ids: &[Vec<u64>],
) -> Result<WireCoefficientResponse, MeshError> {
    let b = basis.basis_index(req.basis_id())?;
    let (cell, ordinal) = req.unit();
    let unit = units.index_of(&UnitKey { cell, ordinal })?;
    let level = levels[b]
        .level_of(unit)
        .ok_or(MeshError::MissingEnrichmentLevel { basis: b, unit })?;
    let coefficient = ids[b][level];
    if coefficient == UNASSIGNED {
        return Err(MeshError::CommError {
            neighbor: peer,
            reason: format!("basis {} is not owned by rank {me}", req.basis_id()),
        });
    }
    Ok(WireCoefficientResponse::new(
        req.proposed(),
        coefficient,
        level as u32,
    ))
}
