//! In-process profile store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{scoped, ProfileRepository};
use crate::calibration::BiasProfile;

#[derive(Debug, Default)]
struct MemoryState {
    profiles: Vec<BiasProfile>,
    generations: HashMap<String, u64>,
}

/// Flat, mutex-guarded profile collection.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    state: Mutex<MemoryState>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored profile, across organizations.
    pub fn all(&self) -> Vec<BiasProfile> {
        self.lock().profiles.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn replace_locked(state: &mut MemoryState, organization_id: &str, profiles: &[BiasProfile]) {
        state.profiles.retain(|p| p.organization_id != organization_id);
        state.profiles.extend(scoped(organization_id, profiles));
        *state.generations.entry(organization_id.to_string()).or_insert(0) += 1;
    }
}

impl ProfileRepository for MemoryProfileStore {
    fn replace_all(&self, organization_id: &str, profiles: &[BiasProfile]) {
        let mut state = self.lock();
        Self::replace_locked(&mut state, organization_id, profiles);
    }

    fn get_for_user(&self, organization_id: &str, user_id: &str) -> Vec<BiasProfile> {
        self.lock()
            .profiles
            .iter()
            .filter(|p| p.organization_id == organization_id && p.user_id == user_id)
            .cloned()
            .collect()
    }

    fn generation(&self, organization_id: &str) -> u64 {
        self.lock()
            .generations
            .get(organization_id)
            .copied()
            .unwrap_or(0)
    }

    fn replace_all_if_generation(
        &self,
        organization_id: &str,
        expected: u64,
        profiles: &[BiasProfile],
    ) -> bool {
        let mut state = self.lock();
        let current = state.generations.get(organization_id).copied().unwrap_or(0);
        if current != expected {
            return false;
        }
        Self::replace_locked(&mut state, organization_id, profiles);
        true
    }
}
