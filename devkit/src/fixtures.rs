/*!
Builders de réponses JSON au format de l'API Observium v0

Les collections sont renvoyées comme objets indexés par id, comme le fait
le service ; les compteurs sont des chaînes.
*/

use serde_json::{json, Map, Value};

/// Entrée de `/alerts`
pub fn alert(alert_table_id: u64, device_id: u64, status: &str) -> Value {
    json!({
        "alert_table_id": alert_table_id.to_string(),
        "device_id": device_id.to_string(),
        "severity": "crit",
        "status": status,
        "last_ok": "1700000000",
        "recovered": null,
    })
}

fn keyed(entries: &[Value], id_field: &str) -> Value {
    let map: Map<String, Value> = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let key = entry
                .get(id_field)
                .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_u64().map(|n| n.to_string())))
                .unwrap_or_else(|| i.to_string());
            (key, entry.clone())
        })
        .collect();
    Value::Object(map)
}

/// Page de `/alerts`
pub fn alerts_page(entries: &[Value]) -> Value {
    json!({"status": "ok", "count": entries.len(), "alerts": keyed(entries, "alert_table_id")})
}

/// Corps de `/devices/{id}`
pub fn device(device_id: u64, hostname: &str) -> Value {
    json!({"status": "ok", "device": device_entry(device_id, hostname)})
}

pub fn device_entry(device_id: u64, hostname: &str) -> Value {
    json!({
        "device_id": device_id.to_string(),
        "hostname": hostname,
        "sysName": format!("{hostname}.lan"),
        "ip": format!("10.0.0.{device_id}"),
        "location": "Site A",
        "location_id": "1",
        "location_lat": "19.43",
        "location_lon": "-99.13",
        "os": "ios",
        "vendor": "Cisco",
        "type": "network",
        "status": "1",
    })
}

/// Corps de `/devices`
pub fn devices(entries: &[Value]) -> Value {
    json!({"status": "ok", "count": entries.len(), "devices": keyed(entries, "device_id")})
}

pub struct PortFixture<'a> {
    pub port_id: u64,
    pub device_id: u64,
    pub descr_type: Option<&'a str>,
    pub in_octets: &'a str,
    pub out_octets: &'a str,
    pub in_errors: &'a str,
    pub out_errors: &'a str,
}

impl Default for PortFixture<'_> {
    fn default() -> Self {
        Self {
            port_id: 1,
            device_id: 1,
            descr_type: None,
            in_octets: "0",
            out_octets: "0",
            in_errors: "0",
            out_errors: "0",
        }
    }
}

pub fn port(p: PortFixture<'_>) -> Value {
    json!({
        "port_id": p.port_id.to_string(),
        "device_id": p.device_id.to_string(),
        "ifDescr": format!("GigabitEthernet0/{}", p.port_id),
        "port_descr_type": p.descr_type,
        "ifOperStatus": "up",
        "ifInOctets": p.in_octets,
        "ifOutOctets": p.out_octets,
        "ifInErrors": p.in_errors,
        "ifOutErrors": p.out_errors,
    })
}

/// Corps de `/ports`
pub fn ports(entries: &[Value]) -> Value {
    json!({"status": "ok", "count": entries.len(), "ports": keyed(entries, "port_id")})
}

/// Corps de graph.php?format=json
pub fn graph(start: i64, step: i64, legend: &[&str], data: Value) -> Value {
    let len = data.as_array().map(Vec::len).unwrap_or(0) as i64;
    json!({
        "meta": {
            "start": start,
            "end": start + step * (len - 1).max(0),
            "step": step,
            "legend": legend,
        },
        "data": data,
    })
}
