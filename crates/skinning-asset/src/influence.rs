use std::iter::{FusedIterator, Zip};
use std::slice::Iter;

/// A single `(influence, weight)` binding owned by one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfluenceWeight {
    pub index: u32,
    pub weight: f32,
}

impl InfluenceWeight {
    pub fn new(index: u32, weight: f32) -> Self {
        Self { index, weight }
    }
}

impl From<(u32, f32)> for InfluenceWeight {
    fn from((index, weight): (u32, f32)) -> Self {
        Self { index, weight }
    }
}

impl From<InfluenceWeight> for (u32, f32) {
    fn from(value: InfluenceWeight) -> Self {
        (value.index, value.weight)
    }
}

/// Borrowed view of one vertex's contiguous slice inside the flat
/// index / weight arrays.
#[derive(Debug, Clone, Copy)]
pub struct VertexInfluences<'a> {
    pub(crate) indices: &'a [u32],
    pub(crate) weights: &'a [f32],
}

impl<'a> VertexInfluences<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &'a [u32] {
        self.indices
    }

    pub fn weights(&self) -> &'a [f32] {
        self.weights
    }

    pub fn iter(&self) -> VertexInfluencesIter<'a> {
        VertexInfluencesIter {
            inner: self.indices.iter().zip(self.weights.iter()),
        }
    }

    pub fn weight_of(&self, influence: u32) -> Option<f32> {
        self.iter()
            .find(|item| item.index == influence)
            .map(|item| item.weight)
    }
}

impl<'a> IntoIterator for VertexInfluences<'a> {
    type Item = InfluenceWeight;
    type IntoIter = VertexInfluencesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct VertexInfluencesIter<'a> {
    inner: Zip<Iter<'a, u32>, Iter<'a, f32>>,
}

impl Iterator for VertexInfluencesIter<'_> {
    type Item = InfluenceWeight;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(index, weight)| InfluenceWeight::new(*index, *weight))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for VertexInfluencesIter<'_> {}

impl FusedIterator for VertexInfluencesIter<'_> {}
