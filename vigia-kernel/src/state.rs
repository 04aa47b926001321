use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Ensemble partagé des clés "en cours" (un job par id à la fois)
pub type InFlight<K> = Shared<HashSet<K>>;

/// Réserve `key` tant que le guard vit; `None` si déjà réservée
pub fn try_claim<K: Eq + Hash + Clone>(set: &InFlight<K>, key: K) -> Option<ClaimGuard<K>> {
    if set.lock().insert(key.clone()) {
        Some(ClaimGuard { set: set.clone(), key })
    } else {
        None
    }
}

/// Libère la réservation au drop, y compris pendant un panic
pub struct ClaimGuard<K: Eq + Hash> {
    set: InFlight<K>,
    key: K,
}

impl<K: Eq + Hash> Drop for ClaimGuard<K> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}
