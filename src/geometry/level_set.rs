//! Level-set geometry providers.
//!
//! A [`Geometry`] supplies one scalar field value per background node and,
//! when available, the derivative of that value with respect to its abstract
//! design variables (ADVs). Analytic geometries evaluate a closed form at the
//! node coordinate; discrete geometries carry sampled values, one ADV per
//! sampled node.

use crate::mesh_error::MeshError;

/// A background node handed to a geometry for evaluation.
#[derive(Clone, Copy, Debug)]
pub struct NodeSample<'a> {
    /// Background node index on this rank.
    pub index: usize,
    /// Global node id.
    pub id: u64,
    /// Physical coordinates (zero padded in 2D).
    pub coords: &'a [f64; 3],
}

/// Scalar implicit-surface provider.
pub trait Geometry: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Field value at a background node.
    fn evaluate_field_value(&self, node: NodeSample<'_>) -> Result<f64, MeshError>;

    /// Whether the field has a closed form.
    fn is_analytic(&self) -> bool;

    /// Number of design variables the field depends on.
    fn num_advs(&self) -> usize;

    /// d(field)/d(ADV) at a node, dense over all ADVs. Analytic geometries only.
    fn evaluate_sensitivity(&self, _node: NodeSample<'_>) -> Result<Vec<f64>, MeshError> {
        Err(MeshError::InvalidGeometry(format!(
            "geometry `{}` has no analytic sensitivity",
            self.name()
        )))
    }

    /// ADV indices controlling the field values at the given background nodes.
    /// Discrete geometries only; analytic geometries return an empty list.
    fn get_node_adv_indices(&self, _entity_nodes: &[usize]) -> Vec<usize> {
        Vec::new()
    }
}

/// Half-space `n · (x - p)`; inside where negative.
///
/// ADVs: `[p_x, p_y, p_z, n_x, n_y, n_z]`.
#[derive(Clone, Debug)]
pub struct Plane {
    pub point: [f64; 3],
    pub normal: [f64; 3],
}

impl Plane {
    pub fn new(point: [f64; 3], normal: [f64; 3]) -> Result<Self, MeshError> {
        let len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
        if !(len > 0.0) {
            return Err(MeshError::InvalidGeometry("plane normal must be non-zero".into()));
        }
        Ok(Self { point, normal })
    }
}

impl Geometry for Plane {
    fn name(&self) -> &str {
        "plane"
    }

    fn evaluate_field_value(&self, node: NodeSample<'_>) -> Result<f64, MeshError> {
        let x = node.coords;
        Ok((0..3).map(|d| self.normal[d] * (x[d] - self.point[d])).sum())
    }

    fn is_analytic(&self) -> bool {
        true
    }

    fn num_advs(&self) -> usize {
        6
    }

    fn evaluate_sensitivity(&self, node: NodeSample<'_>) -> Result<Vec<f64>, MeshError> {
        let x = node.coords;
        Ok(vec![
            -self.normal[0],
            -self.normal[1],
            -self.normal[2],
            x[0] - self.point[0],
            x[1] - self.point[1],
            x[2] - self.point[2],
        ])
    }
}

/// Signed distance to a sphere (a circle in 2D meshes); inside where negative.
///
/// ADVs: `[c_x, c_y, c_z, r]`.
#[derive(Clone, Debug)]
pub struct Sphere {
    pub center: [f64; 3],
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: [f64; 3], radius: f64) -> Result<Self, MeshError> {
        if !(radius > 0.0) {
            return Err(MeshError::InvalidGeometry("sphere radius must be positive".into()));
        }
        Ok(Self { center, radius })
    }

    fn distance_to_center(&self, x: &[f64; 3]) -> f64 {
        (0..3)
            .map(|d| (x[d] - self.center[d]).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl Geometry for Sphere {
    fn name(&self) -> &str {
        "sphere"
    }

    fn evaluate_field_value(&self, node: NodeSample<'_>) -> Result<f64, MeshError> {
        Ok(self.distance_to_center(node.coords) - self.radius)
    }

    fn is_analytic(&self) -> bool {
        true
    }

    fn num_advs(&self) -> usize {
        4
    }

    fn evaluate_sensitivity(&self, node: NodeSample<'_>) -> Result<Vec<f64>, MeshError> {
        let x = node.coords;
        let r = self.distance_to_center(x);
        if r == 0.0 {
            // the center itself: the gradient w.r.t. the center is undefined, pick zero
            return Ok(vec![0.0, 0.0, 0.0, -1.0]);
        }
        Ok(vec![
            -(x[0] - self.center[0]) / r,
            -(x[1] - self.center[1]) / r,
            -(x[2] - self.center[2]) / r,
            -1.0,
        ])
    }
}

/// Field sampled at background nodes (e.g. imported from a companion mesh).
///
/// Each sampled node value is its own ADV; the ADV index of node `i` is `i`.
#[derive(Clone, Debug)]
pub struct DiscreteField {
    name: String,
    values: Vec<f64>,
}

impl DiscreteField {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Result<Self, MeshError> {
        if let Some(bad) = values.iter().position(|v| !v.is_finite()) {
            return Err(MeshError::InvalidGeometry(format!(
                "discrete field value at node {bad} is not finite"
            )));
        }
        Ok(Self {
            name: name.into(),
            values,
        })
    }

    /// Sample a closure at every node of a background mesh.
    pub fn sample(
        name: impl Into<String>,
        coords: impl IntoIterator<Item = [f64; 3]>,
        f: impl Fn(&[f64; 3]) -> f64,
    ) -> Result<Self, MeshError> {
        let values = coords.into_iter().map(|x| f(&x)).collect();
        Self::new(name, values)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl Geometry for DiscreteField {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate_field_value(&self, node: NodeSample<'_>) -> Result<f64, MeshError> {
        self.values
            .get(node.index)
            .copied()
            .ok_or(MeshError::IndexOutOfBounds {
                what: "discrete field node",
                index: node.index,
                len: self.values.len(),
            })
    }

    fn is_analytic(&self) -> bool {
        false
    }

    fn num_advs(&self) -> usize {
        self.values.len()
    }

    fn get_node_adv_indices(&self, entity_nodes: &[usize]) -> Vec<usize> {
        entity_nodes
            .iter()
            .copied()
            .filter(|&n| n < self.values.len())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(coords: &[f64; 3]) -> NodeSample<'_> {
        NodeSample {
            index: 0,
            id: 1,
            coords,
        }
    }

    #[test]
    fn sphere_sign_and_radius_sensitivity() {
        let s = Sphere::new([0.0; 3], 1.0).unwrap();
        assert!(s.evaluate_field_value(sample(&[0.5, 0.0, 0.0])).unwrap() < 0.0);
        assert!(s.evaluate_field_value(sample(&[2.0, 0.0, 0.0])).unwrap() > 0.0);
        let ds = s.evaluate_sensitivity(sample(&[2.0, 0.0, 0.0])).unwrap();
        assert_eq!(ds, vec![-1.0, 0.0, 0.0, -1.0]);
    }

    #[test]
    fn plane_sensitivity_matches_finite_difference() {
        let x = [0.3, 0.7, 0.0];
        let p = Plane::new([0.5, 0.0, 0.0], [1.0, 0.2, 0.0]).unwrap();
        let ds = p.evaluate_sensitivity(sample(&x)).unwrap();
        let h = 1e-7;
        let shifted = Plane::new([0.5 + h, 0.0, 0.0], [1.0, 0.2, 0.0]).unwrap();
        let fd = (shifted.evaluate_field_value(sample(&x)).unwrap()
            - p.evaluate_field_value(sample(&x)).unwrap())
            / h;
        assert!((fd - ds[0]).abs() < 1e-6);
    }

    #[test]
    fn discrete_field_maps_nodes_to_advs() {
        let f = DiscreteField::new("phi", vec![1.0, -1.0, 2.0]).unwrap();
        assert!(!f.is_analytic());
        assert_eq!(f.get_node_adv_indices(&[2, 0, 7]), vec![2, 0]);
        let node = NodeSample {
            index: 5,
            id: 6,
            coords: &[0.0; 3],
        };
        assert!(f.evaluate_field_value(node).is_err());
    }

    #[test]
    fn zero_normal_is_rejected() {
        assert!(Plane::new([0.0; 3], [0.0; 3]).is_err());
    }
}
