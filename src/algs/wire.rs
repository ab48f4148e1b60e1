//! Fixed, versioned, little-endian wire records for the cross-rank protocols.
//!
//! Variable-length payloads (vertex keys) travel as bincode; fixed-size records
//! (coefficient requests and responses, diagnostic vertex samples) are `Pod`
//! structs cast to bytes.

use crate::mesh_error::MeshError;
use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 2;

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub count_le: u32,
}

impl WireHdr {
    pub const COEFFICIENT_REQUEST: u16 = 1;
    pub const COEFFICIENT_RESPONSE: u16 = 2;
    pub const VERTEX_SAMPLE: u16 = 3;

    pub fn new(kind: u16, count: usize) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            count_le: (count as u32).to_le(),
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn count(&self) -> usize {
        u32::from_le(self.count_le) as usize
    }
}

/// Request for the authoritative coefficient of `(basis, level)` where the
/// level is identified by one enrichment unit in its component.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCoefficientRequest {
    pub basis_id_le: u64,
    pub unit_cell_le: u64,
    pub unit_ordinal_le: u64,
    /// The requester's local level.
    pub proposed_le: u64,
}

impl WireCoefficientRequest {
    pub fn new(basis_id: u64, unit_cell: u64, unit_ordinal: u64, proposed: u64) -> Self {
        Self {
            basis_id_le: basis_id.to_le(),
            unit_cell_le: unit_cell.to_le(),
            unit_ordinal_le: unit_ordinal.to_le(),
            proposed_le: proposed.to_le(),
        }
    }
    pub fn basis_id(&self) -> u64 {
        u64::from_le(self.basis_id_le)
    }
    pub fn unit(&self) -> (u64, u64) {
        (
            u64::from_le(self.unit_cell_le),
            u64::from_le(self.unit_ordinal_le),
        )
    }
    pub fn proposed(&self) -> u64 {
        u64::from_le(self.proposed_le)
    }
}

/// Owner's answer to a [`WireCoefficientRequest`], sent back in request order.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCoefficientResponse {
    pub proposed_le: u64,
    pub coefficient_le: u64,
    pub level_le: u32,
    pub _pad: u32,
}

impl WireCoefficientResponse {
    pub const SIZE: usize = 24;

    pub fn new(proposed: u64, coefficient: u64, level: u32) -> Self {
        Self {
            proposed_le: proposed.to_le(),
            coefficient_le: coefficient.to_le(),
            level_le: level.to_le(),
            _pad: 0,
        }
    }
    pub fn proposed(&self) -> u64 {
        u64::from_le(self.proposed_le)
    }
    pub fn coefficient(&self) -> u64 {
        u64::from_le(self.coefficient_le)
    }
    pub fn level(&self) -> u32 {
        u32::from_le(self.level_le)
    }
}

/// A vertex id with its coordinates, gathered for diagnostics.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireVertexSample {
    pub id_le: u64,
    pub coords_le: [u64; 3],
}

impl WireVertexSample {
    pub fn new(id: u64, coords: [f64; 3]) -> Self {
        Self {
            id_le: id.to_le(),
            coords_le: coords.map(|c| c.to_bits().to_le()),
        }
    }
    pub fn id(&self) -> u64 {
        u64::from_le(self.id_le)
    }
    pub fn coords(&self) -> [f64; 3] {
        self.coords_le.map(|c| f64::from_bits(u64::from_le(c)))
    }
}

const _: () = {
    assert!(size_of::<WireHdr>() == 8);
    assert!(size_of::<WireCoefficientRequest>() == 32);
    assert!(size_of::<WireCoefficientResponse>() == WireCoefficientResponse::SIZE);
    assert!(align_of::<WireCoefficientResponse>() == 8);
    assert!(size_of::<WireVertexSample>() == 32);
};

/// Header followed by the records.
pub fn encode_records<T: Pod>(kind: u16, records: &[T]) -> Vec<u8> {
    let hdr = WireHdr::new(kind, records.len());
    let mut out = Vec::with_capacity(size_of::<WireHdr>() + records.len() * size_of::<T>());
    out.extend_from_slice(bytemuck::bytes_of(&hdr));
    out.extend_from_slice(bytemuck::cast_slice(records));
    out
}

/// Decode a buffer produced by [`encode_records`] on rank `from`.
///
/// Received buffers carry no alignment guarantee, so records are read
/// unaligned.
pub fn decode_records<T: Pod>(from: usize, kind: u16, buf: &[u8]) -> Result<Vec<T>, MeshError> {
    let hsz = size_of::<WireHdr>();
    if buf.len() < hsz {
        return Err(MeshError::BufferSizeMismatch {
            neighbor: from,
            expected: hsz,
            got: buf.len(),
        });
    }
    let hdr: WireHdr = bytemuck::pod_read_unaligned(&buf[..hsz]);
    if hdr.version() != WIRE_VERSION || hdr.kind() != kind {
        return Err(MeshError::Wire(format!(
            "rank {from}: unexpected header (version {}, kind {}), wanted kind {kind}",
            hdr.version(),
            hdr.kind()
        )));
    }
    let body = &buf[hsz..];
    let rsz = size_of::<T>();
    if body.len() != hdr.count() * rsz {
        return Err(MeshError::BufferSizeMismatch {
            neighbor: from,
            expected: rsz,
            got: body.len(),
        });
    }
    Ok(body
        .chunks_exact(rsz)
        .map(bytemuck::pod_read_unaligned::<T>)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficient_request_survives_unaligned_buffer() {
        let reqs = vec![
            WireCoefficientRequest::new(7, 3, 1, 0),
            WireCoefficientRequest::new(9, 4, 0, 2),
        ];
        let bytes = encode_records(WireHdr::COEFFICIENT_REQUEST, &reqs);
        // shift by one byte to break alignment
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(&bytes);
        let out: Vec<WireCoefficientRequest> =
            decode_records(1, WireHdr::COEFFICIENT_REQUEST, &shifted[1..]).unwrap();
        assert_eq!(out[1].basis_id(), 9);
        assert_eq!(out[1].unit(), (4, 0));
        assert_eq!(out[1].proposed(), 2);
    }

    #[test]
    fn wrong_kind_and_truncation_are_rejected() {
        let bytes = encode_records(
            WireHdr::COEFFICIENT_RESPONSE,
            &[WireCoefficientResponse::new(0, 11, 1)],
        );
        assert!(matches!(
            decode_records::<WireCoefficientResponse>(0, WireHdr::COEFFICIENT_REQUEST, &bytes),
            Err(MeshError::Wire(_))
        ));
        assert!(matches!(
            decode_records::<WireCoefficientResponse>(
                2,
                WireHdr::COEFFICIENT_RESPONSE,
                &bytes[..bytes.len() - 1]
            ),
            Err(MeshError::BufferSizeMismatch { neighbor: 2, .. })
        ));
    }

    #[test]
    fn vertex_sample_keeps_bits() {
        let s = WireVertexSample::new(42, [0.1, -2.5, 1e-300]);
        assert_eq!(s.id(), 42);
        assert_eq!(s.coords(), [0.1, -2.5, 1e-300]);
    }
}
