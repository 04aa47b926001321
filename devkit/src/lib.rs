/*!
# Vigia DevKit - Mocks et utilitaires de test

Bibliothèque facilitant les tests du pipeline Vigia avec:
- Source de télémétrie simulée (routes scriptées, pannes injectables)
- Fixtures JSON au format Observium
- Harness câblant un pipeline sur un stockage mémoire
*/

pub mod fixtures;
pub mod mock_source;
pub mod test_utils;

pub use mock_source::{MockSource, RecordedCall};
pub use test_utils::TestHarness;
