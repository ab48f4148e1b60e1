//! Geometry engine: nodal phase values, edge intersections, and dx/dp.
//!
//! Every node known to the decomposition (background nodes first, then the
//! nodes created by subdivision) owns one row of the shared [`PhaseTable`];
//! columns are geometries. Rows are assigned once and never move or vanish.
//!
//! Values exactly equal to the threshold are shifted outward when they enter
//! the table (by `DecompositionConfig::tie_perturbation` times
//! `max(|threshold|, 1)`), so a node is never ambiguous with respect to a
//! geometry unless it was created on that geometry's interface.

use std::collections::BTreeMap;

use crate::background::mesh::BackgroundMesh;
use crate::config::DecompositionConfig;
use crate::geometry::level_set::{Geometry, NodeSample};
use crate::geometry::shape;
use crate::mesh_error::MeshError;
use crate::topology::cell_type::CellTopology;

/// Dense node × geometry matrix of level-set values.
#[derive(Clone, Debug, Default)]
pub struct PhaseTable {
    num_geometries: usize,
    values: Vec<f64>,
}

impl PhaseTable {
    pub fn new(num_geometries: usize) -> Self {
        Self {
            num_geometries,
            values: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        if self.num_geometries == 0 {
            0
        } else {
            self.values.len() / self.num_geometries
        }
    }

    pub fn num_geometries(&self) -> usize {
        self.num_geometries
    }

    fn push_row(&mut self, row: &[f64]) -> usize {
        debug_assert_eq!(row.len(), self.num_geometries);
        let idx = self.num_rows();
        self.values.extend_from_slice(row);
        idx
    }

    pub fn value(&self, row: usize, geometry: usize) -> Option<f64> {
        if geometry >= self.num_geometries {
            return None;
        }
        self.values.get(row * self.num_geometries + geometry).copied()
    }

    pub fn row(&self, row: usize) -> Option<&[f64]> {
        let start = row * self.num_geometries;
        self.values.get(start..start + self.num_geometries)
    }
}

/// dx/dp of an interface point, one column per design variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Sensitivity {
    pub adv_indices: Vec<usize>,
    pub dx_dp: Vec<[f64; 3]>,
}

impl Sensitivity {
    /// Column for `adv`, if the point depends on it.
    pub fn column(&self, adv: usize) -> Option<[f64; 3]> {
        self.adv_indices
            .iter()
            .position(|&a| a == adv)
            .map(|i| self.dx_dp[i])
    }
}

/// Result of an edge/geometry query.
#[derive(Clone, Debug, PartialEq)]
pub struct IntersectionRecord {
    pub intersected: bool,
    /// Edge-local coordinate in `[-1, 1]`, measured from the first node.
    pub local_coordinate: f64,
    pub global_coordinate: [f64; 3],
    pub sensitivity: Option<Sensitivity>,
}

impl IntersectionRecord {
    fn miss() -> Self {
        Self {
            intersected: false,
            local_coordinate: 0.0,
            global_coordinate: [0.0; 3],
            sensitivity: None,
        }
    }

    /// Position along the edge in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        0.5 * (self.local_coordinate + 1.0)
    }
}

/// Interface data attached to a node created on an interface.
#[derive(Clone, Debug, PartialEq)]
pub struct InterfaceRecord {
    pub geometry: usize,
    /// Rows of the edge endpoints the node was placed on.
    pub edge: [usize; 2],
    pub local_coordinate: f64,
    pub global_coordinate: [f64; 3],
    pub sensitivity: Option<Sensitivity>,
}

/// Per-node geometry bookkeeping.
#[derive(Clone, Debug)]
pub struct GeometryObject {
    pub row: usize,
    pub interface: Option<InterfaceRecord>,
}

/// Result of classifying an entity against every geometry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PhaseClassification {
    pub phase: usize,
    /// At least one geometry had no non-interface node to decide from.
    pub anomalous: bool,
}

pub struct GeometryEngine {
    geometries: Vec<Box<dyn Geometry>>,
    config: DecompositionConfig,
    table: PhaseTable,
    objects: Vec<GeometryObject>,
    /// Weights over background rows reproducing each row's values.
    origins: Vec<Vec<(usize, f64)>>,
    coords: Vec<[f64; 3]>,
    background_ids: Vec<u64>,
    active: usize,
}

impl GeometryEngine {
    pub fn new(
        geometries: Vec<Box<dyn Geometry>>,
        config: DecompositionConfig,
    ) -> Result<Self, MeshError> {
        config.validate()?;
        if geometries.is_empty() {
            return Err(MeshError::InvalidConfig(
                "at least one geometry is required".into(),
            ));
        }
        if geometries.len() > usize::BITS as usize - 1 {
            return Err(MeshError::InvalidConfig(format!(
                "{} geometries exceed the phase-index encoding",
                geometries.len()
            )));
        }
        let n = geometries.len();
        Ok(Self {
            geometries,
            config,
            table: PhaseTable::new(n),
            objects: Vec::new(),
            origins: Vec::new(),
            coords: Vec::new(),
            background_ids: Vec::new(),
            active: 0,
        })
    }

    pub fn config(&self) -> &DecompositionConfig {
        &self.config
    }

    pub fn num_geometries(&self) -> usize {
        self.geometries.len()
    }

    pub fn geometry(&self, g: usize) -> Result<&dyn Geometry, MeshError> {
        self.geometries
            .get(g)
            .map(|b| b.as_ref())
            .ok_or(MeshError::IndexOutOfBounds {
                what: "geometry",
                index: g,
                len: self.geometries.len(),
            })
    }

    pub fn num_rows(&self) -> usize {
        self.objects.len()
    }

    pub fn num_background_rows(&self) -> usize {
        self.background_ids.len()
    }

    pub fn phase_table(&self) -> &PhaseTable {
        &self.table
    }

    /// Geometry consulted by intersection queries.
    pub fn active_geometry(&self) -> usize {
        self.active
    }

    pub fn set_active_geometry(&mut self, g: usize) -> Result<(), MeshError> {
        self.geometry(g)?;
        self.active = g;
        Ok(())
    }

    /// Move to the next geometry; returns false once all were visited.
    pub fn advance_geometry(&mut self) -> bool {
        if self.active + 1 < self.geometries.len() {
            self.active += 1;
            true
        } else {
            false
        }
    }

    /// Evaluate every geometry at every background node. Row `i` is node `i`.
    pub fn ingest_background(&mut self, mesh: &BackgroundMesh) -> Result<(), MeshError> {
        if !self.objects.is_empty() {
            return Err(MeshError::AlreadyFinalized("geometry engine background rows"));
        }
        let mut row = vec![0.0; self.geometries.len()];
        for n in 0..mesh.num_nodes() {
            let coords = mesh.node_coords(n)?;
            let sample = NodeSample {
                index: n,
                id: mesh.node_id(n)?.get(),
                coords: &coords,
            };
            for (g, geometry) in self.geometries.iter().enumerate() {
                let v = geometry.evaluate_field_value(sample)?;
                if !v.is_finite() {
                    return Err(MeshError::InvalidGeometry(format!(
                        "geometry `{}` returned {v} at node {}",
                        geometry.name(),
                        sample.id
                    )));
                }
                row[g] = self.break_tie(v);
            }
            self.push(&row, vec![(n, 1.0)], coords, None);
            self.background_ids.push(sample.id);
        }
        log::debug!(
            "geometry engine: {} background rows, {} geometries",
            self.num_background_rows(),
            self.geometries.len()
        );
        Ok(())
    }

    /// Cached level-set value of `row` for geometry `g`.
    pub fn evaluate_node_phase(&self, row: usize, g: usize) -> Result<f64, MeshError> {
        self.geometry(g)?;
        self.table.value(row, g).ok_or(MeshError::IndexOutOfBounds {
            what: "phase table row",
            index: row,
            len: self.table.num_rows(),
        })
    }

    pub fn node_coords(&self, row: usize) -> Result<[f64; 3], MeshError> {
        self.coords
            .get(row)
            .copied()
            .ok_or(MeshError::IndexOutOfBounds {
                what: "geometry object",
                index: row,
                len: self.coords.len(),
            })
    }

    pub fn object(&self, row: usize) -> Result<&GeometryObject, MeshError> {
        self.objects.get(row).ok_or(MeshError::IndexOutOfBounds {
            what: "geometry object",
            index: row,
            len: self.objects.len(),
        })
    }

    /// Whether `row` was created on the interface of geometry `g`.
    pub fn is_interface_node(&self, row: usize, g: usize) -> bool {
        self.objects
            .get(row)
            .and_then(|o| o.interface.as_ref())
            .is_some_and(|rec| rec.geometry == g)
    }

    /// Strict sign change of the active geometry across the entity's nodes.
    ///
    /// # Errors
    /// [`MeshError::DegenerateEntity`] when every node lies on the threshold.
    pub fn is_intersected(&self, rows: &[usize]) -> Result<bool, MeshError> {
        let thr = self.config.threshold;
        let mut below = false;
        let mut above = false;
        let mut all_on = true;
        for &r in rows {
            let v = self.evaluate_node_phase(r, self.active)? - thr;
            below |= v < 0.0;
            above |= v > 0.0;
            all_on &= v == 0.0;
        }
        if all_on && !rows.is_empty() {
            return Err(MeshError::DegenerateEntity {
                nodes: rows.to_vec(),
                geometry: self.active,
            });
        }
        Ok(below && above)
    }

    /// Intersect the edge `(a, b)` with the active geometry.
    pub fn intersect_edge(&self, a: usize, b: usize) -> Result<IntersectionRecord, MeshError> {
        if !self.is_intersected(&[a, b])? {
            return Ok(IntersectionRecord::miss());
        }
        let va = self.evaluate_node_phase(a, self.active)?;
        let vb = self.evaluate_node_phase(b, self.active)?;
        let zeta = Self::locate_intersection(
            [va, vb],
            self.config.threshold,
            self.config.edge_perturbation,
        );
        let mut record = IntersectionRecord {
            intersected: true,
            local_coordinate: zeta,
            global_coordinate: shape::lerp(
                &self.node_coords(a)?,
                &self.node_coords(b)?,
                0.5 * (zeta + 1.0),
            ),
            sensitivity: None,
        };
        record.sensitivity = self.compute_sensitivity(a, b, &record)?;
        Ok(record)
    }

    /// Linear zero of the edge values in the edge-local frame `[-1, 1]`,
    /// kept `perturbation` away from both endpoints.
    pub fn locate_intersection(values: [f64; 2], threshold: f64, perturbation: f64) -> f64 {
        let [va, vb] = values;
        let zeta = 2.0 * (threshold - va) / (vb - va) - 1.0;
        zeta.clamp(-1.0 + perturbation, 1.0 - perturbation)
    }

    /// Refine an edge intersection against the parent cell's interpolant.
    ///
    /// The edge runs from `xi_a` to `xi_b` in the parent's parametric frame.
    /// Returns the fraction along the edge, or `None` when the interpolant
    /// does not bracket the threshold on the edge.
    pub fn refine_on_parent(
        &self,
        topology: CellTopology,
        parent_rows: &[usize],
        xi_a: &[f64; 3],
        xi_b: &[f64; 3],
        t0: f64,
    ) -> Result<Option<f64>, MeshError> {
        let values = self.parent_values(parent_rows)?;
        self.solve_on_edge(topology, &values, xi_a, xi_b, t0)
    }

    fn parent_values(&self, parent_rows: &[usize]) -> Result<Vec<f64>, MeshError> {
        parent_rows
            .iter()
            .map(|&r| self.evaluate_node_phase(r, self.active))
            .collect()
    }

    fn solve_on_edge(
        &self,
        topology: CellTopology,
        values: &[f64],
        xi_a: &[f64; 3],
        xi_b: &[f64; 3],
        t0: f64,
    ) -> Result<Option<f64>, MeshError> {
        let thr = self.config.threshold;
        let f = |t: f64| -> Result<f64, MeshError> {
            Ok(shape::interpolate(topology, values, &shape::lerp(xi_a, xi_b, t))? - thr)
        };
        let half = 0.5 * self.config.edge_perturbation;
        let (mut lo, mut hi) = (0.0, 1.0);
        let (mut flo, mut fhi) = (f(lo)?, f(hi)?);
        if flo * fhi >= 0.0 {
            return Ok(None);
        }
        let mut t = t0.clamp(half, 1.0 - half);
        let mut ft = f(t)?;
        let mut side = 0i8;
        for _ in 0..self.config.root_max_iterations {
            if ft.abs() <= self.config.root_tolerance {
                break;
            }
            // Illinois variant of regula falsi
            if ft * fhi > 0.0 {
                hi = t;
                fhi = ft;
                if side == 1 {
                    flo *= 0.5;
                }
                side = 1;
            } else {
                lo = t;
                flo = ft;
                if side == -1 {
                    fhi *= 0.5;
                }
                side = -1;
            }
            t = (lo * fhi - hi * flo) / (fhi - flo);
            ft = f(t)?;
        }
        Ok(Some(t.clamp(half, 1.0 - half)))
    }

    /// dx/dp of a refined intersection at fraction `t` of the parametric edge
    /// `xi_a → xi_b` inside a parent with nodes `parent_rows` at
    /// `parent_coords`, for the active geometry.
    ///
    /// The root depends on every parent value through the parent interpolant:
    /// analytic geometries differentiate the root condition implicitly,
    /// discrete ones re-solve it with each parent value shifted by `fd_step`.
    /// Returns `None` unless sensitivities are enabled in the configuration.
    pub fn compute_refined_sensitivity(
        &self,
        topology: CellTopology,
        parent_rows: &[usize],
        parent_coords: &[[f64; 3]],
        xi_a: &[f64; 3],
        xi_b: &[f64; 3],
        t: f64,
    ) -> Result<Option<Sensitivity>, MeshError> {
        if !self.config.compute_sensitivities {
            return Ok(None);
        }
        let g = self.active;
        let values = self.parent_values(parent_rows)?;
        let dx_dphi: Vec<[f64; 3]> = if self.geometry(g)?.is_analytic() {
            let xi = shape::lerp(xi_a, xi_b, t);
            let dir = [xi_b[0] - xi_a[0], xi_b[1] - xi_a[1], xi_b[2] - xi_a[2]];
            let n = shape::shape_values(topology, &xi);
            let dn = shape::shape_derivatives_along(topology, &xi, &dir);
            let slope: f64 = dn.iter().zip(&values).map(|(d, v)| d * v).sum();
            if slope == 0.0 {
                return Err(MeshError::InvalidGeometry(format!(
                    "level set of geometry {g} is stationary along the cut edge"
                )));
            }
            let mut dx_dt = [0.0; 3];
            for (d, x) in dn.iter().zip(parent_coords) {
                for k in 0..3 {
                    dx_dt[k] += d * x[k];
                }
            }
            n.iter().map(|ni| scale(dx_dt, -ni / slope)).collect()
        } else {
            let h = self.config.fd_step;
            let position = |i: usize, dv: f64| -> Result<[f64; 3], MeshError> {
                let mut shifted = values.clone();
                shifted[i] += dv;
                let ts = self
                    .solve_on_edge(topology, &shifted, xi_a, xi_b, t)?
                    .ok_or_else(|| {
                        MeshError::InvalidGeometry(format!(
                            "cut of geometry {g} leaves its edge under a shift of {dv:e}"
                        ))
                    })?;
                shape::map_to_physical(topology, parent_coords, &shape::lerp(xi_a, xi_b, ts))
            };
            (0..values.len())
                .map(|i| {
                    let (plus, minus) = (position(i, h)?, position(i, -h)?);
                    Ok([
                        (plus[0] - minus[0]) / (2.0 * h),
                        (plus[1] - minus[1]) / (2.0 * h),
                        (plus[2] - minus[2]) / (2.0 * h),
                    ])
                })
                .collect::<Result<_, MeshError>>()?
        };
        self.accumulate_columns(parent_rows.iter().copied().zip(dx_dphi), g)
            .map(Some)
    }

    fn accumulate_columns(
        &self,
        per_row: impl IntoIterator<Item = (usize, [f64; 3])>,
        g: usize,
    ) -> Result<Sensitivity, MeshError> {
        let mut columns: BTreeMap<usize, [f64; 3]> = BTreeMap::new();
        for (row, dx_dphi) in per_row {
            for (adv, dphi) in self.node_phase_sensitivity(row, g)? {
                let col = columns.entry(adv).or_insert([0.0; 3]);
                for d in 0..3 {
                    col[d] += dx_dphi[d] * dphi;
                }
            }
        }
        Ok(Sensitivity {
            adv_indices: columns.keys().copied().collect(),
            dx_dp: columns.values().copied().collect(),
        })
    }

    /// dx/dp of an intersection on edge `(a, b)` for the active geometry.
    ///
    /// Returns `None` unless sensitivities are enabled in the configuration.
    pub fn compute_sensitivity(
        &self,
        a: usize,
        b: usize,
        record: &IntersectionRecord,
    ) -> Result<Option<Sensitivity>, MeshError> {
        if !self.config.compute_sensitivities || !record.intersected {
            return Ok(None);
        }
        let g = self.active;
        let va = self.evaluate_node_phase(a, g)?;
        let vb = self.evaluate_node_phase(b, g)?;
        let xa = self.node_coords(a)?;
        let xb = self.node_coords(b)?;
        let edge = [xb[0] - xa[0], xb[1] - xa[1], xb[2] - xa[2]];

        let (dx_dphi_a, dx_dphi_b) = if self.geometry(g)?.is_analytic() {
            let t = record.fraction();
            let denom = vb - va;
            let dta = (t - 1.0) / denom;
            let dtb = -t / denom;
            (scale(edge, dta), scale(edge, dtb))
        } else {
            let h = self.config.fd_step;
            let thr = self.config.threshold;
            let p = self.config.edge_perturbation;
            let position = |ua: f64, ub: f64| {
                let zeta = Self::locate_intersection([ua, ub], thr, p);
                shape::lerp(&xa, &xb, 0.5 * (zeta + 1.0))
            };
            let central = |plus: [f64; 3], minus: [f64; 3]| {
                [
                    (plus[0] - minus[0]) / (2.0 * h),
                    (plus[1] - minus[1]) / (2.0 * h),
                    (plus[2] - minus[2]) / (2.0 * h),
                ]
            };
            (
                central(position(va + h, vb), position(va - h, vb)),
                central(position(va, vb + h), position(va, vb - h)),
            )
        };

        self.accumulate_columns([(a, dx_dphi_a), (b, dx_dphi_b)], g)
            .map(Some)
    }

    /// Sparse d(phi)/d(ADV) of a row for geometry `g`.
    pub fn node_phase_sensitivity(
        &self,
        row: usize,
        g: usize,
    ) -> Result<BTreeMap<usize, f64>, MeshError> {
        let geometry = self.geometry(g)?;
        let origin = self.origins.get(row).ok_or(MeshError::IndexOutOfBounds {
            what: "geometry object",
            index: row,
            len: self.origins.len(),
        })?;
        let mut out = BTreeMap::new();
        for &(bg, w) in origin {
            if geometry.is_analytic() {
                let coords = self.coords[bg];
                let sample = NodeSample {
                    index: bg,
                    id: self.background_ids[bg],
                    coords: &coords,
                };
                for (adv, d) in geometry.evaluate_sensitivity(sample)?.into_iter().enumerate() {
                    if d != 0.0 {
                        *out.entry(adv).or_insert(0.0) += w * d;
                    }
                }
            } else {
                for adv in geometry.get_node_adv_indices(&[bg]) {
                    *out.entry(adv).or_insert(0.0) += w;
                }
            }
        }
        Ok(out)
    }

    /// Register a node placed inside a parent (template node).
    ///
    /// `origin` holds the parent's shape-function weights over background rows.
    pub fn admit_node(
        &mut self,
        origin: Vec<(usize, f64)>,
        coords: [f64; 3],
    ) -> Result<usize, MeshError> {
        let row = self.interpolate_row(&origin)?;
        Ok(self.push(&row, origin, coords, None))
    }

    /// Register a node on the active geometry's interface along `edge`.
    ///
    /// `t` is the fraction along the edge and `origin` the parent weights at
    /// the node's parametric location. The active geometry's value is set to
    /// the threshold; other geometries interpolate through `origin`.
    pub fn admit_interface_node(
        &mut self,
        edge: [usize; 2],
        t: f64,
        coords: [f64; 3],
        origin: Vec<(usize, f64)>,
        sensitivity: Option<Sensitivity>,
    ) -> Result<usize, MeshError> {
        for &r in &edge {
            self.object(r)?;
        }
        let mut row = self.interpolate_row(&origin)?;
        row[self.active] = self.config.threshold;
        let interface = InterfaceRecord {
            geometry: self.active,
            edge,
            local_coordinate: 2.0 * t - 1.0,
            global_coordinate: coords,
            sensitivity,
        };
        Ok(self.push(&row, origin, coords, Some(interface)))
    }

    /// Background weights of `row`.
    pub fn origin(&self, row: usize) -> Result<&[(usize, f64)], MeshError> {
        self.origins
            .get(row)
            .map(Vec::as_slice)
            .ok_or(MeshError::IndexOutOfBounds {
                what: "geometry object",
                index: row,
                len: self.origins.len(),
            })
    }

    fn interpolate_row(&self, origin: &[(usize, f64)]) -> Result<Vec<f64>, MeshError> {
        let mut row = vec![0.0; self.geometries.len()];
        for &(bg, w) in origin {
            if bg >= self.num_background_rows() {
                return Err(MeshError::IndexOutOfBounds {
                    what: "background row",
                    index: bg,
                    len: self.num_background_rows(),
                });
            }
            let values = self.table.row(bg).ok_or(MeshError::IndexOutOfBounds {
                what: "phase table row",
                index: bg,
                len: self.table.num_rows(),
            })?;
            for (acc, v) in row.iter_mut().zip(values) {
                *acc += w * v;
            }
        }
        for v in row.iter_mut() {
            *v = self.break_tie(*v);
        }
        Ok(row)
    }

    /// Bit-subset encoding of per-geometry inside/outside flags.
    ///
    /// Bit `g` is set when the entity is outside geometry `g`.
    pub fn get_phase_index(on_off: &[bool]) -> usize {
        on_off
            .iter()
            .enumerate()
            .filter(|(_, outside)| **outside)
            .fold(0, |acc, (g, _)| acc | (1 << g))
    }

    /// Number of distinct phase indices the geometries can produce.
    pub fn num_phases(&self) -> usize {
        1 << self.geometries.len()
    }

    /// Phase index of an entity from its non-interface nodes.
    ///
    /// An entity with only interface nodes for some geometry is logged and
    /// classified as inside that geometry.
    pub fn classify_entity(&self, rows: &[usize]) -> Result<PhaseClassification, MeshError> {
        let thr = self.config.threshold;
        let mut on_off = vec![false; self.geometries.len()];
        let mut anomalous = false;
        for (g, flag) in on_off.iter_mut().enumerate() {
            let mut decided = None;
            for &r in rows {
                if self.is_interface_node(r, g) {
                    continue;
                }
                decided = Some(self.evaluate_node_phase(r, g)? > thr);
                break;
            }
            match decided {
                Some(outside) => *flag = outside,
                None => {
                    log::warn!(
                        "no non-interface node among rows {rows:?} for geometry {g}; defaulting to inside"
                    );
                    anomalous = true;
                }
            }
        }
        Ok(PhaseClassification {
            phase: Self::get_phase_index(&on_off),
            anomalous,
        })
    }

    /// Shift a value sitting exactly on the threshold outward. The step scales
    /// with the threshold's magnitude and never drops below two ulps of it.
    fn break_tie(&self, v: f64) -> f64 {
        let thr = self.config.threshold;
        if v != thr {
            return v;
        }
        let step = (self.config.tie_perturbation * thr.abs().max(1.0))
            .max(2.0 * f64::EPSILON * thr.abs());
        v + step
    }

    fn push(
        &mut self,
        row: &[f64],
        origin: Vec<(usize, f64)>,
        coords: [f64; 3],
        interface: Option<InterfaceRecord>,
    ) -> usize {
        let idx = self.table.push_row(row);
        self.objects.push(GeometryObject {
            row: idx,
            interface,
        });
        self.origins.push(origin);
        self.coords.push(coords);
        idx
    }
}

fn scale(v: [f64; 3], s: f64) -> [f64; 3] {
    [v[0] * s, v[1] * s, v[2] * s]
}
