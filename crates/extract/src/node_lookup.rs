use types::Coordinate;

const UNSET: Coordinate = Coordinate {
    latitude: f64::NAN,
    longitude: f64::NAN,
};

fn is_set(coordinate: &Coordinate) -> bool {
    !coordinate.latitude.is_nan()
}

/// Coordinates for a fixed set of node ids, sorted for binary search.
///
/// Built from the ids referenced by included ways, then filled from the
/// node pass. Ids that never receive a coordinate keep an explicit sentinel
/// and are reported as missing, never as `(0, 0)`.
#[derive(Debug, Clone)]
pub struct NodeLookup {
    ids: Vec<i64>,
    coordinates: Vec<Coordinate>,
}

/// Result of resolving a way's node references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRefs {
    pub coordinates: Vec<Coordinate>,
    pub missing: Vec<i64>,
}

impl NodeLookup {
    pub fn from_ids(mut ids: Vec<i64>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        let coordinates = vec![UNSET; ids.len()];
        NodeLookup { ids, coordinates }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Stores the coordinate of a referenced node. Returns `false` for ids
    /// that no included way references.
    pub fn set(&mut self, id: i64, coordinate: Coordinate) -> bool {
        match self.ids.binary_search(&id) {
            Ok(index) => {
                self.coordinates[index] = coordinate;
                true
            }
            Err(_) => false,
        }
    }

    pub fn find(&self, id: i64) -> Option<Coordinate> {
        let index = self.ids.binary_search(&id).ok()?;
        let coordinate = self.coordinates[index];
        is_set(&coordinate).then_some(coordinate)
    }

    /// Maps `refs` to coordinates in order, skipping and reporting unresolved ids.
    pub fn resolve(&self, refs: &[i64]) -> ResolvedRefs {
        let mut resolved = ResolvedRefs {
            coordinates: Vec::with_capacity(refs.len()),
            missing: Vec::new(),
        };
        for id in refs {
            match self.find(*id) {
                Some(coordinate) => resolved.coordinates.push(coordinate),
                None => resolved.missing.push(*id),
            }
        }
        resolved
    }

    pub fn resolved_count(&self) -> usize {
        self.coordinates.iter().filter(|c| is_set(c)).count()
    }

    pub fn unresolved_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids
            .iter()
            .zip(&self.coordinates)
            .filter(|(_, coordinate)| !is_set(coordinate))
            .map(|(id, _)| *id)
    }
}
