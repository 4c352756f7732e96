use triad_core::backend::BackendId;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("backend registry must contain at least one backend")]
    Empty,
}

/// Ordered, non-empty list of backends in priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendRegistry {
    backends: Vec<BackendId>,
}

impl BackendRegistry {
    pub fn new(backends: Vec<BackendId>) -> Result<Self, RegistryError> {
        if backends.is_empty() {
            return Err(RegistryError::Empty);
        }
        Ok(Self { backends })
    }

    /// Build from raw identifiers, skipping blanks. Duplicates keep their
    /// first position.
    pub fn from_ids<I, S>(ids: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut backends: Vec<BackendId> = Vec::new();
        for raw in ids {
            let id = raw.as_ref().trim();
            if id.is_empty() || backends.iter().any(|b| b.as_str() == id) {
                continue;
            }
            backends.push(BackendId::new(id));
        }
        Self::new(backends)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendId> {
        self.backends.iter()
    }

    pub fn primary(&self) -> &BackendId {
        &self.backends[0]
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
