//! On-disk weather snapshots with a per-city freshness index.
//!
//! Every successful fetch is written to its own file,
//! `<city>_<YYYY-MM-DDTHH:MM:SS>.json` (suffixed `-<n>` if that name is
//! taken), holding the raw upstream payload. A
//! separate `snapshot_index.json` maps each city to its latest file and the
//! moment it was written, so freshness checks never depend on directory
//! listings or file names.

use chrono::{DateTime, Duration, Local, Utc};
use common::errors::AppError;
use common::models::TIMESTAMP_FORMAT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::PrettyFormatter;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

const INDEX_FILE: &str = "snapshot_index.json";
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Where and when the latest snapshot for a city was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub city: String,
    pub written_at: DateTime<Utc>,
    pub file_path: PathBuf,
}

pub struct SnapshotStore {
    dir: PathBuf,
    ttl: Duration,
    index: RwLock<HashMap<String, SnapshotMeta>>,
}

impl SnapshotStore {
    /// Open the store rooted at `dir`, loading any index left by a previous run.
    pub async fn open(dir: impl Into<PathBuf>, ttl_seconds: u64) -> Self {
        let dir = dir.into();
        let index = load_index(&dir.join(INDEX_FILE)).await;
        info!(dir = %dir.display(), cities = index.len(), "Snapshot store opened");

        Self {
            dir,
            ttl: i64::try_from(ttl_seconds)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            index: RwLock::new(index),
        }
    }

    /// Persist `payload` as the newest snapshot for `city` and return its path.
    ///
    /// Each call creates a new file; an existing snapshot is never overwritten.
    /// The in-memory index only changes once the on-disk index has been
    /// written, so a failed save leaves no trace a later lookup could serve.
    #[instrument(skip(self, payload), fields(city = %city))]
    pub async fn save(
        &self,
        city: &str,
        payload: &Value,
        written_at: DateTime<Utc>,
    ) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir).await?;

        let stem = format!(
            "{}_{}",
            sanitize_city(city),
            written_at.with_timezone(&Local).format(TIMESTAMP_FORMAT)
        );
        let file_path = self
            .create_snapshot_file(&stem, &to_indented_json(payload)?)
            .await?;

        let meta = SnapshotMeta {
            city: city.to_string(),
            written_at,
            file_path: file_path.clone(),
        };

        // Index writes are serialized by the write lock.
        let mut index = self.index.write().await;
        let mut updated = index.clone();
        updated.insert(city.to_string(), meta);

        if let Err(e) = self.persist_index(&updated).await {
            if let Err(remove_err) = fs::remove_file(&file_path).await {
                warn!(
                    path = %file_path.display(),
                    error = %remove_err,
                    "Failed to remove unindexed snapshot"
                );
            }
            return Err(e);
        }
        *index = updated;

        info!(city = %city, path = %file_path.display(), "Snapshot written");
        Ok(file_path)
    }

    /// Write `contents` to `<stem>.json`, or `<stem>-<n>.json` if that name is taken.
    async fn create_snapshot_file(&self, stem: &str, contents: &[u8]) -> Result<PathBuf, AppError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let file_name = match attempt {
                0 => format!("{}.json", stem),
                n => format!("{}-{}.json", stem, n),
            };
            let path = self.dir.join(file_name);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(contents).await?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Snapshot name taken");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::StorageError(format!(
            "no free snapshot name for {} after {} attempts",
            stem, MAX_NAME_ATTEMPTS
        )))
    }

    /// Cached payload for `city` if its latest snapshot is within the TTL.
    #[instrument(skip(self), fields(city = %city))]
    pub async fn lookup_fresh(&self, city: &str, now: DateTime<Utc>) -> Option<Value> {
        let meta = {
            let index = self.index.read().await;
            index.get(city).cloned()?
        };

        let age = now.signed_duration_since(meta.written_at);
        if age > self.ttl {
            debug!(city = %city, age_secs = age.num_seconds(), "Snapshot is stale");
            return None;
        }

        match read_payload(&meta.file_path).await {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(
                    city = %city,
                    path = %meta.file_path.display(),
                    error = %e,
                    "Indexed snapshot could not be read"
                );
                None
            }
        }
    }

    #[cfg(test)]
    async fn latest(&self, city: &str) -> Option<SnapshotMeta> {
        self.index.read().await.get(city).cloned()
    }

    async fn persist_index(&self, index: &HashMap<String, SnapshotMeta>) -> Result<(), AppError> {
        let index_path = self.dir.join(INDEX_FILE);
        let tmp_path = self.dir.join(format!("{}.tmp", INDEX_FILE));

        fs::write(&tmp_path, serde_json::to_vec_pretty(index)?).await?;
        fs::rename(&tmp_path, &index_path).await?;
        Ok(())
    }
}

async fn load_index(path: &Path) -> HashMap<String, SnapshotMeta> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read snapshot index, starting empty");
            return HashMap::new();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt snapshot index, starting empty");
        HashMap::new()
    })
}

async fn read_payload(path: &Path) -> Result<Value, AppError> {
    let bytes = fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn to_indented_json(payload: &Value) -> Result<Vec<u8>, AppError> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    payload.serialize(&mut serializer)?;
    Ok(buf)
}

/// Keep a city name usable as a single path component.
fn sanitize_city(city: &str) -> String {
    let cleaned: String = city
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::open(dir.path().join("data"), 300).await
    }

    #[tokio::test]
    async fn saved_payload_reads_back_while_fresh() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let payload = json!({ "current": { "temperature_2m": 18.2, "rain": 0.0 } });
        let now = Utc::now();

        store.save("Paris", &payload, now).await.unwrap();

        assert_eq!(store.lookup_fresh("Paris", now).await, Some(payload));
    }

    #[tokio::test]
    async fn file_name_and_indentation() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let path = store
            .save("Paris", &json!({ "current": { "rain": 0.0 } }), now)
            .await
            .unwrap();

        let expected_name = format!(
            "Paris_{}.json",
            now.with_timezone(&Local).format(TIMESTAMP_FORMAT)
        );
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected_name);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n    \"current\": {\n        \"rain\": 0.0\n    }"));
    }

    #[tokio::test]
    async fn stale_snapshot_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let written_at = Utc::now() - Duration::minutes(6);

        store
            .save("Paris", &json!({ "current": {} }), written_at)
            .await
            .unwrap();

        assert_eq!(store.lookup_fresh("Paris", Utc::now()).await, None);
    }

    #[tokio::test]
    async fn ttl_boundary_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let written_at = Utc::now();
        store
            .save("Paris", &json!({ "current": {} }), written_at)
            .await
            .unwrap();

        let at_edge = written_at + Duration::seconds(300);
        let past_edge = written_at + Duration::seconds(301);

        assert!(store.lookup_fresh("Paris", at_edge).await.is_some());
        assert!(store.lookup_fresh("Paris", past_edge).await.is_none());
    }

    #[tokio::test]
    async fn other_cities_do_not_shadow_each_other() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();
        let paris = json!({ "current": { "temperature_2m": 18.2 } });
        let oslo = json!({ "current": { "temperature_2m": 4.0 } });

        store.save("Paris", &paris, now).await.unwrap();
        store
            .save("Oslo", &oslo, now + Duration::seconds(1))
            .await
            .unwrap();

        let later = now + Duration::seconds(2);
        assert_eq!(store.lookup_fresh("Paris", later).await, Some(paris));
        assert_eq!(store.lookup_fresh("Oslo", later).await, Some(oslo));
        assert_eq!(store.lookup_fresh("Berlin", later).await, None);
    }

    #[tokio::test]
    async fn city_match_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        store.save("Paris", &json!({ "a": 1 }), now).await.unwrap();

        assert_eq!(store.lookup_fresh("paris", now).await, None);
    }

    #[tokio::test]
    async fn index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let payload = json!({ "current": { "snowfall": 1.5 } });
        let now = Utc::now();

        let path = {
            let store = store_in(&dir).await;
            store.save("Oslo", &payload, now).await.unwrap()
        };

        let reopened = store_in(&dir).await;
        let meta = reopened.latest("Oslo").await.unwrap();
        assert_eq!(meta.file_path, path);
        assert_eq!(meta.written_at, now);
        assert_eq!(reopened.lookup_fresh("Oslo", now).await, Some(payload));
    }

    #[tokio::test]
    async fn corrupt_index_starts_empty() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join(INDEX_FILE), b"{ not json").unwrap();

        let store = SnapshotStore::open(&data, 300).await;

        assert_eq!(store.latest("Paris").await, None);
    }

    #[tokio::test]
    async fn missing_snapshot_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let path = store.save("Paris", &json!({ "a": 1 }), now).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(store.lookup_fresh("Paris", now).await, None);
    }

    #[tokio::test]
    async fn same_second_saves_never_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();
        let first = json!({ "current": { "temperature_2m": 18.2 } });
        let second = json!({ "current": { "temperature_2m": 18.9 } });

        let first_path = store.save("Paris", &first, now).await.unwrap();
        let second_path = store.save("Paris", &second, now).await.unwrap();

        assert_ne!(first_path, second_path);
        let on_disk: Value = serde_json::from_slice(&std::fs::read(&first_path).unwrap()).unwrap();
        assert_eq!(on_disk, first);
        assert_eq!(store.latest("Paris").await.unwrap().file_path, second_path);
        assert_eq!(store.lookup_fresh("Paris", now).await, Some(second));
    }

    #[tokio::test]
    async fn colliding_sanitized_names_get_distinct_files() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        let now = Utc::now();

        let slash = store.save("a/b", &json!({ "from": "slash" }), now).await.unwrap();
        let colon = store.save("a:b", &json!({ "from": "colon" }), now).await.unwrap();

        assert_ne!(slash, colon);
        assert_eq!(
            store.lookup_fresh("a/b", now).await,
            Some(json!({ "from": "slash" }))
        );
        assert_eq!(
            store.lookup_fresh("a:b", now).await,
            Some(json!({ "from": "colon" }))
        );
    }

    #[tokio::test]
    async fn failed_index_write_leaves_nothing_servable() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        // A directory where the temporary index file should go.
        std::fs::create_dir_all(data.join(format!("{}.tmp", INDEX_FILE))).unwrap();
        let store = SnapshotStore::open(&data, 300).await;
        let now = Utc::now();

        let result = store.save("Paris", &json!({ "current": {} }), now).await;

        assert!(matches!(result, Err(AppError::StorageError(_))));
        assert_eq!(store.latest("Paris").await, None);
        assert_eq!(store.lookup_fresh("Paris", now).await, None);
        let leftovers = std::fs::read_dir(&data)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("Paris_"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn sanitizes_path_separators() {
        assert_eq!(sanitize_city("Paris"), "Paris");
        assert_eq!(sanitize_city("New York"), "New York");
        assert_eq!(sanitize_city("../etc/passwd"), "..-etc-passwd");
        assert_eq!(sanitize_city(".."), "_");
    }
}
