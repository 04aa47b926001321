use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Description d'un équipement embarquée dans chaque alerte.
/// Remplacée en bloc à chaque mise à jour (jamais fusionnée champ par champ).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    #[serde(default, deserialize_with = "lenient_string")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location_id: Option<String>,
    #[serde(default, alias = "location_lat", deserialize_with = "lenient_string")]
    pub lat: Option<String>,
    #[serde(default, alias = "location_lon", deserialize_with = "lenient_string")]
    pub lon: Option<String>,
    #[serde(rename = "sysName", default, deserialize_with = "lenient_string")]
    pub sys_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub os: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vendor: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub device_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
}

/// Alerte telle que récupérée sur le service de supervision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingAlert {
    pub alert_table_id: String,
    pub device_id: Option<String>,
    pub last_ok: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub recovered: Option<String>,
    pub device: DeviceSnapshot,
}

impl IncomingAlert {
    /// Construit l'alerte depuis une entrée brute; `None` sans `alert_table_id`
    pub fn from_raw(raw: &Value, device: DeviceSnapshot) -> Option<Self> {
        let alert_table_id = field_string(raw, &["alert_table_id"])?;
        Some(Self {
            alert_table_id,
            device_id: field_string(raw, &["device_id"]),
            last_ok: field_string(raw, &["last_ok"]),
            severity: field_string(raw, &["severity"]),
            status: field_string(raw, &["status", "alert_status"]),
            recovered: field_string(raw, &["recovered", "last_recovered"]),
            device,
        })
    }
}

/// Drapeau opérateur; YES gèle l'alerte contre toute écriture du pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Completed {
    Yes,
    #[default]
    No,
}

impl From<bool> for Completed {
    fn from(done: bool) -> Self {
        if done {
            Completed::Yes
        } else {
            Completed::No
        }
    }
}

/// Ligne de la table `alerts`, clé primaire `alert_table_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAlert {
    pub alert_table_id: String,
    pub device_id: Option<String>,
    pub last_ok: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub recovered: Option<String>,
    pub device: DeviceSnapshot,
    pub completed: Completed,
}

impl PersistedAlert {
    /// Première apparition d'un id: toujours `completed = NO`
    pub fn first_sighting(incoming: IncomingAlert) -> Self {
        Self {
            alert_table_id: incoming.alert_table_id,
            device_id: incoming.device_id,
            last_ok: incoming.last_ok,
            severity: incoming.severity,
            status: incoming.status,
            recovered: incoming.recovered,
            device: incoming.device,
            completed: Completed::No,
        }
    }

    /// Écrase tous les champs mutables; `completed` n'est pas touché
    pub fn overwrite_from(&mut self, incoming: IncomingAlert) {
        self.device_id = incoming.device_id;
        self.last_ok = incoming.last_ok;
        self.severity = incoming.severity;
        self.status = incoming.status;
        self.recovered = incoming.recovered;
        self.device = incoming.device;
    }

    pub fn is_frozen(&self) -> bool {
        self.completed == Completed::Yes
    }
}

/// Port réseau; les compteurs restent bruts, leur parsing est fait à l'agrégation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub port_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    #[serde(rename = "ifDescr", default, deserialize_with = "lenient_string")]
    pub if_descr: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub port_descr_type: Option<String>,
    #[serde(rename = "ifOperStatus", default, deserialize_with = "lenient_string")]
    pub if_oper_status: Option<String>,
    #[serde(rename = "ifInOctets", default, deserialize_with = "lenient_string")]
    pub if_in_octets: Option<String>,
    #[serde(rename = "ifOutOctets", default, deserialize_with = "lenient_string")]
    pub if_out_octets: Option<String>,
    #[serde(rename = "ifInErrors", default, deserialize_with = "lenient_string")]
    pub if_in_errors: Option<String>,
    #[serde(rename = "ifOutErrors", default, deserialize_with = "lenient_string")]
    pub if_out_errors: Option<String>,
}

/// Le service renvoie indifféremment chaînes, nombres ou booléens
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Première clé présente et scalaire parmi `keys`
pub(crate) fn field_string(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| raw.get(*key).and_then(scalar_to_string))
}
