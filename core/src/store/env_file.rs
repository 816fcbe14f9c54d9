//! File-backed fault store for the compose substrate.
//!
//! Profiles live in a project-local `KEY=VALUE` env file that the compose
//! project interpolates into container environments. Writes go through a
//! tmp-file-then-rename so a crash mid-write never leaves a torn file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Error;
use crate::profile::FaultProfile;
use crate::service::ServiceName;
use crate::store::FaultStore;

const HEADER: &str = "# Fault parameters for the demo mesh. Managed by meshfault; do not edit by hand.";

pub struct EnvFileStore {
    path: PathBuf,
}

impl EnvFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the env file into a sorted map. A missing file is an empty
    /// map: every service is then at baseline by default.
    async fn load(&self) -> Result<BTreeMap<String, String>, Error> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(Error::Store {
                    cause: format!("reading {}: {e}", self.path.display()),
                });
            }
        };

        let mut map = BTreeMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, value)) => {
                    map.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => {
                    return Err(Error::Store {
                        cause: format!("malformed line in {}: {line:?}", self.path.display()),
                    });
                }
            }
        }
        Ok(map)
    }

    /// Atomically replace the file with `map`, sorted by key.
    async fn save(&self, map: &BTreeMap<String, String>) -> Result<(), Error> {
        let mut body = String::from(HEADER);
        body.push('\n');
        for (key, value) in map {
            body.push_str(key);
            body.push('=');
            body.push_str(value);
            body.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body.as_bytes())
            .await
            .map_err(|e| Error::Store {
                cause: format!("writing {}: {e}", tmp.display()),
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::Store {
                cause: format!("renaming {} into place: {e}", tmp.display()),
            })
    }
}

#[async_trait]
impl FaultStore for EnvFileStore {
    async fn get(&self, service: ServiceName) -> Result<FaultProfile, Error> {
        let map = self.load().await?;
        FaultProfile::from_env_map(service, &map)
    }

    async fn set(&self, service: ServiceName, profile: &FaultProfile) -> Result<(), Error> {
        let mut map = self.load().await?;
        for (key, value) in profile.to_env_pairs(service) {
            map.insert(key, value);
        }
        self.save(&map).await
    }

    async fn reset_all(&self) -> Result<(), Error> {
        // Explicit zeros for every service rather than key removal: the
        // compose project interpolates these variables and warns on
        // absent ones.
        let mut map = BTreeMap::new();
        let baseline = FaultProfile::baseline();
        for service in ServiceName::ALL {
            for (key, value) in baseline.to_env_pairs(service) {
                map.insert(key, value);
            }
        }
        self.save(&map).await
    }
}
