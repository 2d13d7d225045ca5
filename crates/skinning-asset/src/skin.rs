use std::{
    collections::HashSet,
    error::Error,
    fmt::{self, Display, Formatter},
};

use glam::Mat4;

use crate::influence::{InfluenceWeight, VertexInfluences};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkinningDataError {
    CountsOffsetsMismatch {
        counts: usize,
        offsets: usize,
    },
    IndicesWeightsMismatch {
        indices: usize,
        weights: usize,
    },
    BadOffset {
        vertex: usize,
        expected: usize,
        actual: usize,
    },
    TotalCountMismatch {
        expected: usize,
        actual: usize,
    },
    InfluenceOutOfRange {
        vertex: usize,
        index: u32,
        influence_count: usize,
    },
    DuplicateInfluence {
        vertex: usize,
        index: u32,
    },
    PoseMismatch {
        names: usize,
        poses: usize,
    },
    DuplicateName(String),
    Overflow(usize),
}

impl Display for SkinningDataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SkinningDataError::CountsOffsetsMismatch { counts, offsets } => write!(
                f,
                "Got {} influence counts but {} index offsets",
                counts, offsets
            ),
            SkinningDataError::IndicesWeightsMismatch { indices, weights } => write!(
                f,
                "Got {} influence indices but {} influence weights",
                indices, weights
            ),
            SkinningDataError::BadOffset {
                vertex,
                expected,
                actual,
            } => write!(
                f,
                "Bad index offset for vertex {}: expected {}, got {}",
                vertex, expected, actual
            ),
            SkinningDataError::TotalCountMismatch { expected, actual } => write!(
                f,
                "Influence counts sum to {}, but {} influence entries are stored",
                expected, actual
            ),
            SkinningDataError::InfluenceOutOfRange {
                vertex,
                index,
                influence_count,
            } => write!(
                f,
                "Vertex {} references influence {}, but only {} influences exist",
                vertex, index, influence_count
            ),
            SkinningDataError::DuplicateInfluence { vertex, index } => {
                write!(f, "Vertex {} references influence {} twice", vertex, index)
            }
            SkinningDataError::PoseMismatch { names, poses } => write!(
                f,
                "Got {} influence names but {} influence poses",
                names, poses
            ),
            SkinningDataError::DuplicateName(name) => {
                write!(f, "Influence name {:?} is used more than once", name)
            }
            SkinningDataError::Overflow(length) => {
                write!(f, "Length {} does not fit in 32-bit storage", length)
            }
        }
    }
}

impl Error for SkinningDataError {}

/// Raw, unchecked form of [`SmoothSkinningData`].
///
/// This is what hosts hand over and get back. Converting it into
/// [`SmoothSkinningData`] checks every structural invariant.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "camelCase")
)]
pub struct SmoothSkinningParts {
    pub influence_names: Vec<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub influence_pose: Option<Vec<Mat4>>,
    pub point_influence_counts: Vec<u32>,
    pub point_index_offsets: Vec<u32>,
    pub point_influence_indices: Vec<u32>,
    pub point_influence_weights: Vec<f32>,
}

/// Per-vertex weighted bindings between mesh vertices and skeletal influences.
///
/// Storage is a struct of flat arrays: vertex `v` owns the entries
/// `offsets[v]..offsets[v] + counts[v]` of both the index and weight arrays.
/// Every constructor validates, so an instance always satisfies:
///
/// - `counts` and `offsets` have one entry per vertex,
/// - `offsets` is the exclusive prefix sum of `counts`,
/// - `indices` and `weights` both hold `sum(counts)` entries,
/// - every stored index is a valid influence id,
/// - no influence appears twice within one vertex,
/// - names are unique, and the pose (if any) is parallel to the names.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "SmoothSkinningParts", into = "SmoothSkinningParts")
)]
pub struct SmoothSkinningData {
    influence_names: Vec<String>,
    influence_pose: Option<Vec<Mat4>>,
    point_influence_counts: Vec<u32>,
    point_index_offsets: Vec<u32>,
    point_influence_indices: Vec<u32>,
    point_influence_weights: Vec<f32>,
}

#[inline]
pub(crate) fn to_storage(length: usize) -> Result<u32, SkinningDataError> {
    u32::try_from(length).map_err(|_| SkinningDataError::Overflow(length))
}

/// Exclusive prefix sum of `counts`.
pub(crate) fn offsets_from_counts(counts: &[u32]) -> Result<Vec<u32>, SkinningDataError> {
    let mut offsets = Vec::with_capacity(counts.len());
    let mut running = 0usize;
    for count in counts {
        offsets.push(to_storage(running)?);
        running += *count as usize;
    }
    Ok(offsets)
}

impl SmoothSkinningData {
    pub fn new(
        influence_names: Vec<String>,
        influence_pose: Option<Vec<Mat4>>,
        point_influence_counts: Vec<u32>,
        point_index_offsets: Vec<u32>,
        point_influence_indices: Vec<u32>,
        point_influence_weights: Vec<f32>,
    ) -> Result<Self, SkinningDataError> {
        let data = Self {
            influence_names,
            influence_pose,
            point_influence_counts,
            point_index_offsets,
            point_influence_indices,
            point_influence_weights,
        };
        data.validate()?;
        Ok(data)
    }

    /// Builds the flat storage from one list of bindings per vertex, in
    /// vertex order. Counts and offsets are derived.
    pub fn from_vertex_influences<V, W>(
        influence_names: Vec<String>,
        influence_pose: Option<Vec<Mat4>>,
        vertices: V,
    ) -> Result<Self, SkinningDataError>
    where
        V: IntoIterator,
        V::Item: IntoIterator<Item = W>,
        W: Into<InfluenceWeight>,
    {
        let mut counts = Vec::new();
        let mut indices = Vec::new();
        let mut weights = Vec::new();
        for vertex in vertices {
            let start = indices.len();
            for item in vertex {
                let item: InfluenceWeight = item.into();
                indices.push(item.index);
                weights.push(item.weight);
            }
            counts.push(to_storage(indices.len() - start)?);
        }
        let offsets = offsets_from_counts(&counts)?;
        Self::new(
            influence_names,
            influence_pose,
            counts,
            offsets,
            indices,
            weights,
        )
    }

    /// Wraps arrays that are consistent by construction.
    pub(crate) fn from_parts_unchecked(parts: SmoothSkinningParts) -> Self {
        let data = Self {
            influence_names: parts.influence_names,
            influence_pose: parts.influence_pose,
            point_influence_counts: parts.point_influence_counts,
            point_index_offsets: parts.point_index_offsets,
            point_influence_indices: parts.point_influence_indices,
            point_influence_weights: parts.point_influence_weights,
        };
        debug_assert_eq!(data.validate(), Ok(()));
        data
    }

    pub fn validate(&self) -> Result<(), SkinningDataError> {
        let influence_count = self.influence_names.len();

        if let Some(pose) = &self.influence_pose {
            if pose.len() != influence_count {
                return Err(SkinningDataError::PoseMismatch {
                    names: influence_count,
                    poses: pose.len(),
                });
            }
        }

        let mut names = HashSet::with_capacity(influence_count);
        for name in &self.influence_names {
            if !names.insert(name.as_str()) {
                return Err(SkinningDataError::DuplicateName(name.clone()));
            }
        }

        if self.point_influence_counts.len() != self.point_index_offsets.len() {
            return Err(SkinningDataError::CountsOffsetsMismatch {
                counts: self.point_influence_counts.len(),
                offsets: self.point_index_offsets.len(),
            });
        }
        if self.point_influence_indices.len() != self.point_influence_weights.len() {
            return Err(SkinningDataError::IndicesWeightsMismatch {
                indices: self.point_influence_indices.len(),
                weights: self.point_influence_weights.len(),
            });
        }

        let mut running = 0usize;
        for (vertex, (count, offset)) in self
            .point_influence_counts
            .iter()
            .zip(&self.point_index_offsets)
            .enumerate()
        {
            if *offset as usize != running {
                return Err(SkinningDataError::BadOffset {
                    vertex,
                    expected: running,
                    actual: *offset as usize,
                });
            }
            running += *count as usize;
        }
        if running != self.point_influence_indices.len() {
            return Err(SkinningDataError::TotalCountMismatch {
                expected: running,
                actual: self.point_influence_indices.len(),
            });
        }

        // Stamp each influence with the last vertex (plus one) that used it.
        let mut last_seen = vec![0usize; influence_count];
        for (vertex, influences) in self.vertices().enumerate() {
            for &index in influences.indices() {
                let slot = last_seen.get_mut(index as usize).ok_or(
                    SkinningDataError::InfluenceOutOfRange {
                        vertex,
                        index,
                        influence_count,
                    },
                )?;
                if *slot == vertex + 1 {
                    return Err(SkinningDataError::DuplicateInfluence { vertex, index });
                }
                *slot = vertex + 1;
            }
        }

        Ok(())
    }

    pub fn influence_names(&self) -> &[String] {
        &self.influence_names
    }

    pub fn influence_pose(&self) -> Option<&[Mat4]> {
        self.influence_pose.as_deref()
    }

    pub fn point_influence_counts(&self) -> &[u32] {
        &self.point_influence_counts
    }

    pub fn point_index_offsets(&self) -> &[u32] {
        &self.point_index_offsets
    }

    pub fn point_influence_indices(&self) -> &[u32] {
        &self.point_influence_indices
    }

    pub fn point_influence_weights(&self) -> &[f32] {
        &self.point_influence_weights
    }

    pub fn influence_count(&self) -> usize {
        self.influence_names.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.point_influence_counts.len()
    }

    pub fn influence_index(&self, name: &str) -> Option<usize> {
        self.influence_names.iter().position(|item| item == name)
    }

    pub fn vertex(&self, vertex: usize) -> Option<VertexInfluences<'_>> {
        let count = *self.point_influence_counts.get(vertex)? as usize;
        let start = *self.point_index_offsets.get(vertex)? as usize;
        let range = start..start + count;
        Some(VertexInfluences {
            indices: self.point_influence_indices.get(range.clone())?,
            weights: self.point_influence_weights.get(range)?,
        })
    }

    pub fn vertices(&self) -> impl ExactSizeIterator<Item = VertexInfluences<'_>> + '_ {
        (0..self.vertex_count()).map(|vertex| {
            let count = self.point_influence_counts[vertex] as usize;
            let start = self.point_index_offsets[vertex] as usize;
            VertexInfluences {
                indices: &self.point_influence_indices[start..start + count],
                weights: &self.point_influence_weights[start..start + count],
            }
        })
    }

    /// Sum of every vertex's weight for each influence, indexed by influence id.
    pub fn influence_weight_totals(&self) -> Vec<f32> {
        let mut totals = vec![0.0; self.influence_count()];
        for (index, weight) in self
            .point_influence_indices
            .iter()
            .zip(&self.point_influence_weights)
        {
            totals[*index as usize] += *weight;
        }
        totals
    }

    pub fn into_parts(self) -> SmoothSkinningParts {
        SmoothSkinningParts {
            influence_names: self.influence_names,
            influence_pose: self.influence_pose,
            point_influence_counts: self.point_influence_counts,
            point_index_offsets: self.point_index_offsets,
            point_influence_indices: self.point_influence_indices,
            point_influence_weights: self.point_influence_weights,
        }
    }
}

impl TryFrom<SmoothSkinningParts> for SmoothSkinningData {
    type Error = SkinningDataError;

    fn try_from(value: SmoothSkinningParts) -> Result<Self, Self::Error> {
        Self::new(
            value.influence_names,
            value.influence_pose,
            value.point_influence_counts,
            value.point_index_offsets,
            value.point_influence_indices,
            value.point_influence_weights,
        )
    }
}

impl From<SmoothSkinningData> for SmoothSkinningParts {
    fn from(value: SmoothSkinningData) -> Self {
        value.into_parts()
    }
}

#[cfg(test)]
mod test {
    use glam::Mat4;

    use super::{SkinningDataError, SmoothSkinningData, SmoothSkinningParts};
    use crate::influence::InfluenceWeight;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn leg_parts() -> SmoothSkinningParts {
        SmoothSkinningParts {
            influence_names: names(&["hip", "knee", "ankle"]),
            influence_pose: None,
            point_influence_counts: vec![2, 2],
            point_index_offsets: vec![0, 2],
            point_influence_indices: vec![0, 1, 1, 2],
            point_influence_weights: vec![0.5, 0.5, 0.2, 0.8],
        }
    }

    #[test]
    fn test_build_from_vertex_influences() {
        let data = SmoothSkinningData::from_vertex_influences(
            names(&["hip", "knee", "ankle"]),
            None,
            vec![vec![(0u32, 0.5f32), (1, 0.5)], vec![], vec![(2, 1.0)]],
        )
        .unwrap();

        assert_eq!(data.vertex_count(), 3);
        assert_eq!(data.point_influence_counts(), &[2, 0, 1]);
        assert_eq!(data.point_index_offsets(), &[0, 2, 2]);
        assert_eq!(data.point_influence_indices(), &[0, 1, 2]);
        assert_eq!(data.point_influence_weights(), &[0.5, 0.5, 1.0]);
        assert!(data.vertex(1).unwrap().is_empty());
        assert_eq!(
            data.vertex(2).unwrap().iter().collect::<Vec<_>>(),
            vec![InfluenceWeight::new(2, 1.0)]
        );
        assert!(data.vertex(3).is_none());
    }

    #[test]
    fn test_accessors() {
        let data = SmoothSkinningData::try_from(leg_parts()).unwrap();
        assert_eq!(data.influence_count(), 3);
        assert_eq!(data.influence_index("knee"), Some(1));
        assert_eq!(data.influence_index("toe"), None);
        assert_eq!(data.vertex(1).unwrap().weight_of(2), Some(0.8));
        assert_eq!(data.vertex(1).unwrap().weight_of(0), None);
        assert_eq!(data.influence_weight_totals(), vec![0.5, 0.7, 0.8]);
        assert_eq!(data.into_parts(), leg_parts());
    }

    #[test]
    fn test_reject_counts_offsets_mismatch() {
        let mut parts = leg_parts();
        parts.point_index_offsets.pop();
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::CountsOffsetsMismatch {
                counts: 2,
                offsets: 1
            })
        );
    }

    #[test]
    fn test_reject_indices_weights_mismatch() {
        let mut parts = leg_parts();
        parts.point_influence_weights.push(0.0);
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::IndicesWeightsMismatch {
                indices: 4,
                weights: 5
            })
        );
    }

    #[test]
    fn test_reject_bad_offset() {
        let mut parts = leg_parts();
        parts.point_index_offsets[1] = 1;
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::BadOffset {
                vertex: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_reject_total_count_mismatch() {
        let mut parts = leg_parts();
        parts.point_influence_counts[1] = 1;
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::TotalCountMismatch {
                expected: 3,
                actual: 4
            })
        );
    }

    #[test]
    fn test_reject_out_of_range_influence() {
        let mut parts = leg_parts();
        parts.point_influence_indices[3] = 3;
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::InfluenceOutOfRange {
                vertex: 1,
                index: 3,
                influence_count: 3
            })
        );
    }

    #[test]
    fn test_reject_duplicate_influence_in_vertex() {
        let mut parts = leg_parts();
        parts.point_influence_indices[1] = 0;
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::DuplicateInfluence {
                vertex: 0,
                index: 0
            })
        );
    }

    #[test]
    fn test_same_influence_in_different_vertices() {
        let data = SmoothSkinningData::from_vertex_influences(
            names(&["root"]),
            None,
            vec![vec![(0u32, 1.0f32)], vec![(0, 1.0)]],
        );
        assert!(data.is_ok());
    }

    #[test]
    fn test_reject_pose_mismatch() {
        let mut parts = leg_parts();
        parts.influence_pose = Some(vec![Mat4::IDENTITY; 2]);
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::PoseMismatch { names: 3, poses: 2 })
        );
    }

    #[test]
    fn test_reject_duplicate_name() {
        let mut parts = leg_parts();
        parts.influence_names[2] = String::from("hip");
        assert_eq!(
            SmoothSkinningData::try_from(parts),
            Err(SkinningDataError::DuplicateName(String::from("hip")))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_wire_names() {
        let data = SmoothSkinningData::try_from(leg_parts()).unwrap();
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["influenceNames"][2], "ankle");
        assert_eq!(json["pointIndexOffsets"][1], 2);
        assert!(json.get("influencePose").is_none());

        let back: SmoothSkinningData = serde_json::from_value(json).unwrap();
        assert_eq!(back, data);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_rejects_malformed() {
        let json = serde_json::json!({
            "influenceNames": ["hip"],
            "pointInfluenceCounts": [1],
            "pointIndexOffsets": [0],
            "pointInfluenceIndices": [4],
            "pointInfluenceWeights": [1.0],
        });
        assert!(serde_json::from_value::<SmoothSkinningData>(json).is_err());
    }
}
