//! Aggregation helpers over fetched port and device records.
//!
//! Counters arrive as strings; anything that does not parse as an unsigned
//! 64-bit integer (negatives included) contributes zero instead of failing
//! the job. Sums saturate at `u64::MAX`.

use crate::models::{field_string, PortRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Octets par GB (binaire, 1024³)
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

pub fn parse_counter(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
}

/// Somme d'un champ entier sur une collection, les valeurs illisibles comptent 0
pub fn sum_counter<T, F>(records: &[T], field: F) -> u64
where
    F: Fn(&T) -> Option<&str>,
{
    records
        .iter()
        .filter_map(|record| parse_counter(field(record)))
        .fold(0u64, u64::saturating_add)
}

/// Conversion octets → GB, arrondi au centième (demi vers le haut) en virgule fixe
pub fn octets_to_gb(octets: u64) -> f64 {
    let gb = u128::from(BYTES_PER_GB);
    let hundredths = (u128::from(octets) * 100 + gb / 2) / gb;
    hundredths as f64 / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionTotals {
    pub port_count: usize,
    pub total_in_octets: u64,
    pub total_out_octets: u64,
    pub total_in_gb: f64,
    pub total_out_gb: f64,
    pub total_combined_gb: f64,
}

pub fn consumption_totals(ports: &[PortRecord]) -> ConsumptionTotals {
    let total_in_octets = sum_counter(ports, |p| p.if_in_octets.as_deref());
    let total_out_octets = sum_counter(ports, |p| p.if_out_octets.as_deref());
    ConsumptionTotals {
        port_count: ports.len(),
        total_in_octets,
        total_out_octets,
        total_in_gb: octets_to_gb(total_in_octets),
        total_out_gb: octets_to_gb(total_out_octets),
        total_combined_gb: octets_to_gb(total_in_octets.saturating_add(total_out_octets)),
    }
}

/// Sépare les ports hors du type de description "internet"
pub fn exclude_descr_type(ports: Vec<PortRecord>, descr_type: &str) -> Vec<PortRecord> {
    ports
        .into_iter()
        .filter(|p| {
            !p.port_descr_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(descr_type))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceName {
    pub hostname: Option<String>,
    #[serde(rename = "sysName")]
    pub sys_name: Option<String>,
    pub ip: Option<String>,
}

/// device_id → noms connus de l'équipement
pub type DeviceNameMap = BTreeMap<String, DeviceName>;

pub fn device_name_map(devices: &[Value]) -> DeviceNameMap {
    devices
        .iter()
        .filter_map(|device| {
            let id = field_string(device, &["device_id"])?;
            Some((
                id,
                DeviceName {
                    hostname: field_string(device, &["hostname"]),
                    sys_name: field_string(device, &["sysName"]),
                    ip: field_string(device, &["ip"]),
                },
            ))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortFailure {
    pub port_id: Option<String>,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    #[serde(rename = "ifDescr")]
    pub if_descr: Option<String>,
    pub in_errors: u64,
    pub out_errors: u64,
    pub total_errors: u64,
}

/// Classement des ports par erreurs d'interface, décroissant, limité à `top_n`
pub fn rank_port_failures(ports: &[PortRecord], names: &DeviceNameMap, top_n: usize) -> Vec<PortFailure> {
    let mut ranked: Vec<PortFailure> = ports
        .iter()
        .filter_map(|port| {
            let in_errors = parse_counter(port.if_in_errors.as_deref()).unwrap_or(0);
            let out_errors = parse_counter(port.if_out_errors.as_deref()).unwrap_or(0);
            let total_errors = in_errors.saturating_add(out_errors);
            if total_errors == 0 {
                return None;
            }
            let device_name = port
                .device_id
                .as_ref()
                .and_then(|id| names.get(id))
                .and_then(|name| name.sys_name.clone().or_else(|| name.hostname.clone()));
            Some(PortFailure {
                port_id: port.port_id.clone(),
                device_id: port.device_id.clone(),
                device_name,
                if_descr: port.if_descr.clone(),
                in_errors,
                out_errors,
                total_errors,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_errors
            .cmp(&a.total_errors)
            .then_with(|| port_key(a).cmp(&port_key(b)))
    });
    ranked.truncate(top_n);
    ranked
}

/// Tri numérique des ids quand c'est possible
fn port_key(failure: &PortFailure) -> (u64, String) {
    let raw = failure.port_id.clone().unwrap_or_default();
    (raw.parse().unwrap_or(u64::MAX), raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn port(id: &str, in_octets: &str, out_octets: &str) -> PortRecord {
        PortRecord {
            port_id: Some(id.into()),
            device_id: Some("1".into()),
            if_in_octets: Some(in_octets.into()),
            if_out_octets: Some(out_octets.into()),
            ..Default::default()
        }
    }

    #[test]
    fn unparseable_counters_count_as_zero() {
        let ports: Vec<PortRecord> =
            serde_json::from_value(json!([{"ifInOctets": "1073741824", "ifOutOctets": "x"}])).unwrap();
        let totals = consumption_totals(&ports);
        assert_eq!(totals.total_in_octets, 1_073_741_824);
        assert_eq!(totals.total_out_octets, 0);
        assert_eq!(totals.total_in_gb, 1.0);
        assert_eq!(totals.total_combined_gb, 1.0);
    }

    #[test]
    fn gb_conversion_rounds_to_two_decimals() {
        assert_eq!(octets_to_gb(0), 0.0);
        assert_eq!(octets_to_gb(BYTES_PER_GB / 2), 0.5);
        // 1.005 GB arrondi vers le haut
        assert_eq!(octets_to_gb(BYTES_PER_GB + BYTES_PER_GB / 200 + 1), 1.01);
        assert_eq!(octets_to_gb(BYTES_PER_GB / 1000), 0.0);
    }

    #[test]
    fn combined_total_sums_both_directions() {
        let ports = vec![port("1", "536870912", "536870912"), port("2", "-", "1073741824")];
        let totals = consumption_totals(&ports);
        assert_eq!(totals.port_count, 2);
        assert_eq!(totals.total_in_gb, 0.5);
        assert_eq!(totals.total_out_gb, 1.5);
        assert_eq!(totals.total_combined_gb, 2.0);
    }

    #[test]
    fn exclude_descr_type_keeps_untyped_ports() {
        let mut inet = port("1", "1", "1");
        inet.port_descr_type = Some("INET".into());
        let plain = port("2", "1", "1");
        let rest = exclude_descr_type(vec![inet, plain], "inet");
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].port_id.as_deref(), Some("2"));
    }

    #[test]
    fn failures_ranked_by_total_errors() {
        let names = device_name_map(&[json!({"device_id": 1, "hostname": "edge", "sysName": "edge.lan"})]);
        let mut a = port("10", "0", "0");
        a.if_in_errors = Some("5".into());
        let mut b = port("2", "0", "0");
        b.if_in_errors = Some("3".into());
        b.if_out_errors = Some("4".into());
        let mut c = port("3", "0", "0");
        c.if_in_errors = Some("bogus".into());
        let mut d = port("4", "0", "0");
        d.if_out_errors = Some("5".into());

        let ranked = rank_port_failures(&[a, b, c, d], &names, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].port_id.as_deref(), Some("2"));
        assert_eq!(ranked[0].total_errors, 7);
        assert_eq!(ranked[0].device_name.as_deref(), Some("edge.lan"));
        // égalité à 5 erreurs: id 4 avant id 10
        assert_eq!(ranked[1].port_id.as_deref(), Some("4"));
    }

    #[test]
    fn negative_counters_are_ignored() {
        let ports = vec![port("1", "-5", "10"), port("2", "7", "-1")];
        let totals = consumption_totals(&ports);
        assert_eq!(totals.total_in_octets, 7);
        assert_eq!(totals.total_out_octets, 10);

        let mut p = port("3", "0", "0");
        p.if_in_errors = Some("-4".into());
        assert!(rank_port_failures(&[p], &DeviceNameMap::new(), 5).is_empty());
    }

    #[test]
    fn full_width_counters_are_summed() {
        let big = (u64::MAX - 10).to_string();
        let ports = vec![port("1", &big, "0"), port("2", "5", "0")];
        assert_eq!(consumption_totals(&ports).total_in_octets, u64::MAX - 5);

        // saturation plutôt que débordement
        let ports = vec![port("1", &big, "0"), port("2", &big, "0")];
        let totals = consumption_totals(&ports);
        assert_eq!(totals.total_in_octets, u64::MAX);
        assert!(totals.total_in_gb > 1.7e10);
    }
}
