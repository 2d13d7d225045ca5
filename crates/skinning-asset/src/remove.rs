use std::{
    collections::BTreeSet,
    error::Error,
    fmt::{self, Display, Formatter},
};

use log::{debug, trace, warn};

use crate::skin::{
    offsets_from_counts, to_storage, SkinningDataError, SmoothSkinningData, SmoothSkinningParts,
};

/// Which influences to strip from a [`SmoothSkinningData`].
///
/// Remaining weights are never renormalized. Callers that need every vertex
/// to sum to one must normalize afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RemovalMode {
    /// Remove the influences with these names.
    Named(Vec<String>),
    /// Remove the influences with these ids.
    Indexed(Vec<usize>),
    /// Remove every influence whose weights sum to zero over the whole mesh.
    ///
    /// The test is an exact `0.0` comparison of the summed weights, so an
    /// influence whose negative and positive weights cancel out is removed
    /// too.
    Weightless,
}

impl RemovalMode {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }

    pub fn indexed<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        Self::Indexed(indices.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    Empty,
    UnknownName(String),
    IndexOutOfRange { index: usize, influence_count: usize },
    AllInfluences { influence_count: usize },
}

impl Display for SelectorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SelectorError::Empty => write!(f, "No influences were given to remove"),
            SelectorError::UnknownName(name) => write!(f, "Unknown influence {:?}", name),
            SelectorError::IndexOutOfRange {
                index,
                influence_count,
            } => write!(
                f,
                "Influence index {} is out of range, only {} influences exist",
                index, influence_count
            ),
            SelectorError::AllInfluences { influence_count } => write!(
                f,
                "Refusing to remove all {} influences, at least one must remain",
                influence_count
            ),
        }
    }
}

impl Error for SelectorError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveInfluencesError {
    InvalidSelector(SelectorError),
    MalformedInput(SkinningDataError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoveInfluencesErrorKind {
    /// The removal request cannot be satisfied.
    InvalidSelector,
    /// The skinning arrays break a structural invariant.
    MalformedInput,
}

impl RemoveInfluencesError {
    pub fn kind(&self) -> RemoveInfluencesErrorKind {
        match self {
            RemoveInfluencesError::InvalidSelector(_) => {
                RemoveInfluencesErrorKind::InvalidSelector
            }
            RemoveInfluencesError::MalformedInput(_) => {
                RemoveInfluencesErrorKind::MalformedInput
            }
        }
    }
}

impl Display for RemoveInfluencesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RemoveInfluencesError::InvalidSelector(err) => {
                write!(f, "Invalid selector: {}", err)
            }
            RemoveInfluencesError::MalformedInput(err) => {
                write!(f, "Malformed skinning data: {}", err)
            }
        }
    }
}

impl Error for RemoveInfluencesError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RemoveInfluencesError::InvalidSelector(err) => Some(err),
            RemoveInfluencesError::MalformedInput(err) => Some(err),
        }
    }
}

impl From<SelectorError> for RemoveInfluencesError {
    fn from(value: SelectorError) -> Self {
        RemoveInfluencesError::InvalidSelector(value)
    }
}

impl From<SkinningDataError> for RemoveInfluencesError {
    fn from(value: SkinningDataError) -> Self {
        RemoveInfluencesError::MalformedInput(value)
    }
}

/// Resolves `mode` into the ids of the influences it would remove.
///
/// An empty set is only returned for [`RemovalMode::Weightless`] when every
/// influence carries weight somewhere.
pub fn resolve_removal_set(
    data: &SmoothSkinningData,
    mode: &RemovalMode,
) -> Result<BTreeSet<usize>, SelectorError> {
    let influence_count = data.influence_count();
    let removal = match mode {
        RemovalMode::Named(names) => {
            if names.is_empty() {
                return Err(SelectorError::Empty);
            }
            names
                .iter()
                .map(|name| {
                    data.influence_index(name)
                        .ok_or_else(|| SelectorError::UnknownName(name.clone()))
                })
                .collect::<Result<BTreeSet<_>, _>>()?
        }
        RemovalMode::Indexed(indices) => {
            if indices.is_empty() {
                return Err(SelectorError::Empty);
            }
            indices
                .iter()
                .map(|&index| {
                    if index < influence_count {
                        Ok(index)
                    } else {
                        Err(SelectorError::IndexOutOfRange {
                            index,
                            influence_count,
                        })
                    }
                })
                .collect::<Result<BTreeSet<_>, _>>()?
        }
        RemovalMode::Weightless => data
            .influence_weight_totals()
            .into_iter()
            .enumerate()
            .filter(|(_, total)| *total == 0.0)
            .map(|(index, _)| index)
            .collect(),
    };

    if removal.len() == influence_count && influence_count > 0 {
        return Err(SelectorError::AllInfluences { influence_count });
    }
    Ok(removal)
}

/// Old influence id to new, densely packed influence id.
struct InfluenceRemap {
    new_ids: Vec<Option<u32>>,
    survivors: Vec<usize>,
}

impl InfluenceRemap {
    fn new(influence_count: usize, removal: &BTreeSet<usize>) -> Result<Self, SkinningDataError> {
        let mut new_ids = Vec::with_capacity(influence_count);
        let mut survivors = Vec::with_capacity(influence_count - removal.len());
        for old in 0..influence_count {
            if removal.contains(&old) {
                new_ids.push(None);
            } else {
                new_ids.push(Some(to_storage(survivors.len())?));
                survivors.push(old);
            }
        }
        Ok(Self { new_ids, survivors })
    }

    fn get(&self, old: u32) -> Option<u32> {
        self.new_ids.get(old as usize).copied().flatten()
    }

    fn select<T: Clone>(&self, items: &[T]) -> Vec<T> {
        self.survivors
            .iter()
            .map(|&old| items[old].clone())
            .collect()
    }

    fn apply(&self, data: &SmoothSkinningData) -> Result<SmoothSkinningData, SkinningDataError> {
        let mut counts = Vec::with_capacity(data.vertex_count());
        let mut indices = Vec::with_capacity(data.point_influence_indices().len());
        let mut weights = Vec::with_capacity(data.point_influence_weights().len());
        let mut emptied = 0usize;

        for vertex in data.vertices() {
            let start = indices.len();
            for item in vertex.iter() {
                if let Some(index) = self.get(item.index) {
                    indices.push(index);
                    weights.push(item.weight);
                }
            }
            let kept = indices.len() - start;
            if kept == 0 && !vertex.is_empty() {
                emptied += 1;
            }
            counts.push(to_storage(kept)?);
        }

        if emptied > 0 {
            warn!(
                "{} vertices lost all of their influences and are no longer skinned",
                emptied
            );
        }

        let offsets = offsets_from_counts(&counts)?;
        Ok(SmoothSkinningData::from_parts_unchecked(
            SmoothSkinningParts {
                influence_names: self.select(data.influence_names()),
                influence_pose: data.influence_pose().map(|pose| self.select(pose)),
                point_influence_counts: counts,
                point_index_offsets: offsets,
                point_influence_indices: indices,
                point_influence_weights: weights,
            },
        ))
    }
}

fn rebuild(
    data: &SmoothSkinningData,
    mode: &RemovalMode,
) -> Result<Option<SmoothSkinningData>, RemoveInfluencesError> {
    data.validate()?;

    let removal = resolve_removal_set(data, mode)?;
    if removal.is_empty() {
        trace!("Nothing to remove for {:?}", mode);
        return Ok(None);
    }
    debug!(
        "Removing {} of {} influences: {:?}",
        removal.len(),
        data.influence_count(),
        removal
    );

    let remap = InfluenceRemap::new(data.influence_count(), &removal)?;
    let rebuilt = remap.apply(data)?;
    debug!(
        "Repacked {} vertices from {} to {} influence entries",
        rebuilt.vertex_count(),
        data.point_influence_indices().len(),
        rebuilt.point_influence_indices().len()
    );
    Ok(Some(rebuilt))
}

/// Removes the influences selected by `mode` and repacks the per-vertex
/// arrays.
///
/// On error the input is dropped without ever being partially modified; use
/// [`SmoothSkinningData::remove_influences_in_place`] to keep it.
pub fn remove_influences(
    data: SmoothSkinningData,
    mode: &RemovalMode,
) -> Result<SmoothSkinningData, RemoveInfluencesError> {
    Ok(rebuild(&data, mode)?.unwrap_or(data))
}

/// Same as [`remove_influences`], for host-owned arrays that have not been
/// validated yet. Structural problems are reported as
/// [`RemoveInfluencesError::MalformedInput`].
pub fn remove_influences_from_parts(
    parts: SmoothSkinningParts,
    mode: &RemovalMode,
) -> Result<SmoothSkinningParts, RemoveInfluencesError> {
    let data = SmoothSkinningData::try_from(parts)?;
    Ok(remove_influences(data, mode)?.into_parts())
}

impl SmoothSkinningData {
    pub fn remove_influences(self, mode: &RemovalMode) -> Result<Self, RemoveInfluencesError> {
        remove_influences(self, mode)
    }

    /// Replaces `self` only if the whole removal succeeds.
    pub fn remove_influences_in_place(
        &mut self,
        mode: &RemovalMode,
    ) -> Result<(), RemoveInfluencesError> {
        if let Some(rebuilt) = rebuild(self, mode)? {
            *self = rebuilt;
        }
        Ok(())
    }
}
