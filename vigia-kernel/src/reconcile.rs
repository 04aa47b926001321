/**
 * RÉCONCILIATION DES ALERTES - Fusion du fetch courant dans la table `alerts`
 *
 * RÔLE : Calcule, pour chaque alerte reçue, l'action à appliquer à l'état persisté
 * sans jamais écraser une alerte marquée `completed = YES` par un opérateur.
 *
 * RÈGLES :
 * - id absent de la table        → insertion avec `completed = NO`
 * - id présent, `completed = YES` → ignoré, aucun champ n'est modifié
 * - id présent, `completed = NO`  → écrasement de tous les champs mutables
 * - id persisté absent du fetch   → laissé tel quel (fusion, jamais remplacement)
 */

use crate::models::{IncomingAlert, PersistedAlert};
use serde::Serialize;
use std::collections::HashMap;

/// Résultat du calcul de fusion, prêt à être appliqué au stockage
#[derive(Debug, Default)]
pub struct ReconcilePlan {
    /// Nouvelles lignes (première apparition)
    pub inserted: Vec<PersistedAlert>,
    /// Lignes existantes dont au moins un champ change
    pub updated: Vec<PersistedAlert>,
    /// Ids gelés par `completed = YES`
    pub frozen: Vec<String>,
    /// Lignes existantes identiques au fetch
    pub unchanged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub frozen: usize,
    pub unchanged: usize,
}

impl ReconcilePlan {
    /// Lignes à écrire, dans l'ordre d'arrivée
    pub fn writes(&self) -> Vec<PersistedAlert> {
        self.inserted.iter().chain(self.updated.iter()).cloned().collect()
    }

    pub fn summary(&self, fetched: usize) -> ReconcileSummary {
        ReconcileSummary {
            fetched,
            inserted: self.inserted.len(),
            updated: self.updated.len(),
            frozen: self.frozen.len(),
            unchanged: self.unchanged,
        }
    }
}

enum Origin {
    New,
    Existing(PersistedAlert),
}

/// Calcule la fusion de `incoming` dans `persisted`.
///
/// Un même id reçu plusieurs fois dans le lot: la dernière occurrence gagne.
pub fn plan(incoming: Vec<IncomingAlert>, persisted: &[PersistedAlert]) -> ReconcilePlan {
    let index: HashMap<&str, &PersistedAlert> = persisted
        .iter()
        .map(|alert| (alert.alert_table_id.as_str(), alert))
        .collect();

    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, (Origin, PersistedAlert)> = HashMap::new();
    let mut plan = ReconcilePlan::default();

    for alert in incoming {
        let id = alert.alert_table_id.clone();

        if let Some((_, candidate)) = pending.get_mut(&id) {
            candidate.overwrite_from(alert);
            continue;
        }

        match index.get(id.as_str()) {
            None => {
                order.push(id.clone());
                pending.insert(id, (Origin::New, PersistedAlert::first_sighting(alert)));
            }
            Some(stored) if stored.is_frozen() => {
                if !plan.frozen.contains(&id) {
                    plan.frozen.push(id);
                }
            }
            Some(stored) => {
                let mut candidate = (*stored).clone();
                candidate.overwrite_from(alert);
                order.push(id.clone());
                pending.insert(id, (Origin::Existing((*stored).clone()), candidate));
            }
        }
    }

    for id in order {
        let Some((origin, candidate)) = pending.remove(&id) else { continue };
        match origin {
            Origin::New => plan.inserted.push(candidate),
            Origin::Existing(before) if before == candidate => plan.unchanged += 1,
            Origin::Existing(_) => plan.updated.push(candidate),
        }
    }

    plan
}
