use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;

use crate::error::Result;
use crate::models::{ConnectedDevice, DeviceStatus};

/// Device discovery is an external collaborator; the collector only needs
/// the current list for the snapshot's device block.
#[async_trait]
pub trait DeviceDiscovery: Send + Sync {
    async fn connected_devices(&self) -> Result<Vec<ConnectedDevice>>;
}

/// Demo discovery backend: a fixed LAN inventory with jittered last-seen
/// times. Stands in for the appliance's real neighbour table.
pub struct SyntheticDeviceDiscovery;

const DEVICE_TABLE: &[(&str, &str, &str)] = &[
    ("192.168.1.1", "a4:2b:b0:c1:00:01", "gateway"),
    ("192.168.1.20", "f0:18:98:3a:5b:21", "workstation-01"),
    ("192.168.1.21", "f0:18:98:3a:5b:44", "workstation-02"),
    ("192.168.1.30", "b8:27:eb:9e:12:7f", "nas"),
    ("192.168.1.41", "dc:a6:32:04:88:03", "printer"),
    ("192.168.1.55", "3c:22:fb:aa:10:9c", "guest-laptop"),
];

#[async_trait]
impl DeviceDiscovery for SyntheticDeviceDiscovery {
    async fn connected_devices(&self) -> Result<Vec<ConnectedDevice>> {
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        Ok(DEVICE_TABLE
            .iter()
            .map(|(ip, mac, hostname)| {
                let idle_mins = rng.gen_range(0..120);
                ConnectedDevice {
                    ip: ip.to_string(),
                    mac: mac.to_string(),
                    hostname: hostname.to_string(),
                    last_seen: now - Duration::minutes(idle_mins),
                    status: if idle_mins < 30 {
                        DeviceStatus::Active
                    } else {
                        DeviceStatus::Inactive
                    },
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthetic_discovery_reports_the_inventory() {
        let devices = SyntheticDeviceDiscovery.connected_devices().await.unwrap();
        assert_eq!(devices.len(), DEVICE_TABLE.len());
        assert!(devices.iter().any(|d| d.hostname == "gateway"));
    }
}
