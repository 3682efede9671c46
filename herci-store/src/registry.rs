//! Spacecraft registry seam.
//!
//! The store only ever needs one question answered about a spacecraft
//! id: is it known to the surrounding configuration? The registry
//! itself, with its layouts, names and directories, lives outside this
//! crate.

use crate::record::SpacecraftId;

pub trait SpacecraftRegistry {
    /// Whether the given spacecraft id is configured.
    fn is_known(&self, id: SpacecraftId) -> bool;
}

impl<F> SpacecraftRegistry for F
where
    F: Fn(SpacecraftId) -> bool,
{
    fn is_known(&self, id: SpacecraftId) -> bool {
        self(id)
    }
}

/// Registry backed by a fixed set of configured ids.
///
/// An empty set accepts every id, which suits tooling that works on
/// logs without a spacecraft directory at hand.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpacecraftSet {
    ids: Vec<SpacecraftId>,
}

impl SpacecraftSet {
    pub fn new(ids: impl IntoIterator<Item = SpacecraftId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl SpacecraftRegistry for SpacecraftSet {
    fn is_known(&self, id: SpacecraftId) -> bool {
        self.ids.is_empty() || self.ids.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_accepts_configured_ids() {
        let registry = SpacecraftSet::new([SpacecraftId::from_u16(1), SpacecraftId::from_u16(6)]);
        assert!(registry.is_known(SpacecraftId::from_u16(6)));
        assert!(!registry.is_known(SpacecraftId::from_u16(2)));
    }

    #[test]
    fn an_empty_set_accepts_everything() {
        assert!(SpacecraftSet::default().is_known(SpacecraftId::from_u16(42)));
    }
}
