use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use la_vak_types::PeerRecord;
use tokio::sync::Mutex;

pub enum Upsert {
    New,
    Updated,
}

/// The live peer set. Owned exclusively by `Discovery`.
pub struct PeerTable {
    inner: Mutex<HashMap<String, PeerRecord>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, record: PeerRecord) -> Upsert {
        let mut table = self.inner.lock().await;
        match table.insert(record.peer_id.clone(), record) {
            Some(_) => Upsert::Updated,
            None => Upsert::New,
        }
    }

    pub async fn snapshot(&self) -> Vec<PeerRecord> {
        self.inner.lock().await.values().cloned().collect()
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }

    /// Remove entries not heard from in longer than `timeout`, returning
    /// the evicted records so callers can emit `peer-left` for each.
    pub async fn evict_stale(&self, timeout: Duration) -> Vec<PeerRecord> {
        let now = Utc::now();
        let mut table = self.inner.lock().await;
        let stale_ids: Vec<String> = table
            .iter()
            .filter(|(_, peer)| {
                now.signed_duration_since(peer.last_seen)
                    .to_std()
                    .map(|age| age > timeout)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        stale_ids
            .into_iter()
            .filter_map(|id| table.remove(&id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn make_peer(id: &str, last_seen: chrono::DateTime<Utc>) -> PeerRecord {
        PeerRecord {
            peer_id: id.to_string(),
            device_name: "peer".into(),
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            http_port: 0,
            transport_port: 0,
            platform: "linux".into(),
            last_seen,
        }
    }

    #[tokio::test]
    async fn upsert_reports_new_then_updated() {
        let table = PeerTable::new();
        assert!(matches!(
            table.upsert(make_peer("a", Utc::now())).await,
            Upsert::New
        ));
        assert!(matches!(
            table.upsert(make_peer("a", Utc::now())).await,
            Upsert::Updated
        ));
    }

    #[tokio::test]
    async fn evict_stale_removes_only_expired() {
        let table = PeerTable::new();
        table.upsert(make_peer("fresh", Utc::now())).await;
        table
            .upsert(make_peer("stale", Utc::now() - chrono::Duration::seconds(20)))
            .await;

        let evicted = table.evict_stale(Duration::from_secs(10)).await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].peer_id, "stale");

        let remaining = table.snapshot().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].peer_id, "fresh");
    }

    #[tokio::test]
    async fn clear_empties_the_table() {
        let table = PeerTable::new();
        table.upsert(make_peer("a", Utc::now())).await;
        table.clear().await;
        assert!(table.snapshot().await.is_empty());
    }
}
