//! Threat-record cache
//!
//! Keys follow `threat:{id}` with a fixed TTL. Redis is the primary tier;
//! when it is unreachable the cache falls back to a bounded-purpose in-memory
//! map with the same expiry semantics, so reads stay cache-consistent either
//! way. The cache is strictly an accelerator: failures are logged and treated
//! as a miss (reads) or a no-op (writes), never surfaced to the caller.
//! Status changes delete the key rather than rewriting it, so the next read
//! re-fetches authoritative state from the database.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::ThreatRecord;

/// Cached entry with its absolute expiry time
struct CachedItem {
    raw: String,
    expires_at: u64,
}

impl CachedItem {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone)]
pub struct ThreatCache {
    conn: Option<ConnectionManager>,
    memory: Arc<RwLock<HashMap<String, CachedItem>>>,
    ttl_secs: u64,
}

impl ThreatCache {
    /// Connect to Redis; on failure the cache falls back to the in-memory tier
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> Self {
        let conn = match redis::Client::open(redis_url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    info!("Redis cache connection established");
                    Some(conn)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to connect to Redis, falling back to memory cache");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "Invalid Redis URL, falling back to memory cache");
                None
            }
        };

        Self {
            conn,
            memory: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    /// In-memory-only cache (Redis never attempted)
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self {
            conn: None,
            memory: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    fn key(id: Uuid) -> String {
        format!("threat:{}", id)
    }

    fn unix_now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }

    pub async fn get(&self, id: Uuid) -> Option<ThreatRecord> {
        let key = Self::key(id);

        let raw = match self.conn.clone() {
            Some(mut conn) => match conn.get::<_, Option<String>>(&key).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(%id, error = %e, "Cache read failed");
                    None
                }
            },
            None => {
                let mut memory = self.memory.write().await;
                match memory.get(&key) {
                    Some(item) if item.is_expired(Self::unix_now()) => {
                        memory.remove(&key);
                        None
                    }
                    Some(item) => Some(item.raw.clone()),
                    None => None,
                }
            }
        };

        match serde_json::from_str(raw.as_deref()?) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%id, error = %e, "Corrupt cache entry, ignoring");
                None
            }
        }
    }

    pub async fn put(&self, record: &ThreatRecord) {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(id = %record.id, error = %e, "Failed to serialize record for cache");
                return;
            }
        };
        let key = Self::key(record.id);

        match self.conn.clone() {
            Some(mut conn) => {
                if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, self.ttl_secs).await {
                    warn!(id = %record.id, error = %e, "Cache write failed");
                }
            }
            None => {
                self.memory.write().await.insert(
                    key,
                    CachedItem {
                        raw,
                        expires_at: Self::unix_now() + self.ttl_secs,
                    },
                );
            }
        }
    }

    /// Delete-on-invalidate, called synchronously after a status change
    pub async fn invalidate(&self, id: Uuid) {
        let key = Self::key(id);
        match self.conn.clone() {
            Some(mut conn) => {
                if let Err(e) = conn.del::<_, ()>(key).await {
                    warn!(%id, error = %e, "Cache invalidation failed");
                }
            }
            None => {
                self.memory.write().await.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn record(id: Uuid, status: &str) -> ThreatRecord {
        ThreatRecord {
            id,
            input_value: "1.2.3.4".to_string(),
            input_type: "ip".to_string(),
            risk_score: 90,
            confidence_score: 55,
            threat_type: "known_malicious_ip".to_string(),
            severity: "critical".to_string(),
            status: status.to_string(),
            country: None,
            city: None,
            latitude: None,
            longitude: None,
            analysis_detail: json!({}),
            device_fingerprint: None,
            session_data: None,
            user_agent: None,
            processing_time_ms: 12,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        tokio_test::block_on(async {
            let cache = ThreatCache::in_memory(3600);
            let id = Uuid::now_v7();
            cache.put(&record(id, "active")).await;

            let cached = cache.get(id).await.unwrap();
            assert_eq!(cached.id, id);
            assert_eq!(cached.risk_score, 90);
            assert_eq!(cached.status, "active");
        });
    }

    #[test]
    fn repeated_reads_are_identical() {
        tokio_test::block_on(async {
            let cache = ThreatCache::in_memory(3600);
            let id = Uuid::now_v7();
            cache.put(&record(id, "active")).await;

            let first = cache.get(id).await.unwrap();
            let second = cache.get(id).await.unwrap();
            assert_eq!(first.risk_score, second.risk_score);
            assert_eq!(first.severity, second.severity);
            assert_eq!(first.status, second.status);
        });
    }

    #[test]
    fn invalidate_deletes_rather_than_updates() {
        tokio_test::block_on(async {
            let cache = ThreatCache::in_memory(3600);
            let id = Uuid::now_v7();
            cache.put(&record(id, "active")).await;

            cache.invalidate(id).await;
            assert!(cache.get(id).await.is_none());
        });
    }

    #[test]
    fn expired_entry_is_a_miss() {
        tokio_test::block_on(async {
            let cache = ThreatCache::in_memory(0);
            let id = Uuid::now_v7();
            cache.put(&record(id, "active")).await;

            assert!(cache.get(id).await.is_none());
        });
    }

    #[test]
    fn unknown_id_is_a_miss() {
        tokio_test::block_on(async {
            let cache = ThreatCache::in_memory(3600);
            assert!(cache.get(Uuid::now_v7()).await.is_none());
        });
    }
}
