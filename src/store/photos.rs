//! File-backed store for contestant photos.
//!
//! Photo bytes never enter the replicated document; the document carries
//! photo ids and this store maps an id to its bytes. Files live under
//! `<root>/<owner>/<photo>` so everything a player owns can be removed in
//! one pass when the player is deleted.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::game::{PhotoId, PlayerId};
use crate::store::error::{StorageError, StorageResult};

/// A photo read back from disk, with its ownership metadata.
#[derive(Debug, Clone)]
pub struct StoredPhoto {
    /// Identifier the game document references.
    pub id: PhotoId,
    /// Player the photo belongs to.
    pub owner: PlayerId,
    /// Raw image bytes as uploaded.
    pub bytes: Bytes,
    /// When the photo was stored.
    pub created_at: SystemTime,
}

impl StoredPhoto {
    /// Creation time as an RFC 3339 string, for logs and listings.
    pub fn created_at_rfc3339(&self) -> String {
        OffsetDateTime::from(self.created_at)
            .format(&Rfc3339)
            .unwrap_or_else(|_| "invalid-timestamp".into())
    }
}

/// Directory-per-owner photo storage.
#[derive(Debug, Clone)]
pub struct PhotoStore {
    root: PathBuf,
}

impl PhotoStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: root.clone(),
                source,
            })?;
        info!(path = %root.display(), "photo store opened");
        Ok(Self { root })
    }

    /// Store `bytes` for `owner` and return the generated photo id.
    pub async fn save(&self, owner: PlayerId, bytes: Bytes) -> StorageResult<PhotoId> {
        let owner_dir = self.owner_dir(owner);
        fs::create_dir_all(&owner_dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: owner_dir.clone(),
                source,
            })?;

        let id = Uuid::new_v4();
        let path = owner_dir.join(id.to_string());

        // Write to a temp file and rename so a crashed upload never leaves a
        // partial photo under the final name.
        let tmp = owner_dir.join(format!("{id}.tmp"));
        fs::write(&tmp, &bytes)
            .await
            .map_err(|source| StorageError::WritePhoto {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| StorageError::WritePhoto {
                path: path.clone(),
                source,
            })?;

        debug!(photo = %id, owner = %owner, size = bytes.len(), "photo stored");
        Ok(id)
    }

    /// Load one photo by id, scanning owner directories for it.
    pub async fn get(&self, id: PhotoId) -> StorageResult<Option<StoredPhoto>> {
        let name = id.to_string();
        for owner in self.owners().await? {
            let path = self.owner_dir(owner).join(&name);
            if fs::try_exists(&path)
                .await
                .map_err(|source| StorageError::ReadPhoto {
                    path: path.clone(),
                    source,
                })?
            {
                return Ok(Some(self.read_photo(owner, id, &path).await?));
            }
        }
        Ok(None)
    }

    /// All photos belonging to `owner`, oldest first.
    pub async fn owned_by(&self, owner: PlayerId) -> StorageResult<Vec<StoredPhoto>> {
        let dir = self.owner_dir(owner);
        let mut photos = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(photos),
            Err(source) => return Err(StorageError::ListPhotos { path: dir, source }),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::ListPhotos {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| Uuid::parse_str(n).ok())
            else {
                // Temp files and strays are not photos.
                continue;
            };
            photos.push(self.read_photo(owner, id, &path).await?);
        }

        photos.sort_by_key(|p| p.created_at);
        Ok(photos)
    }

    /// Delete one photo. Returns whether it existed.
    pub async fn delete(&self, id: PhotoId) -> StorageResult<bool> {
        let name = id.to_string();
        for owner in self.owners().await? {
            let path = self.owner_dir(owner).join(&name);
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(photo = %id, owner = %owner, "photo deleted");
                    return Ok(true);
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(StorageError::RemovePhoto { path, source }),
            }
        }
        Ok(false)
    }

    /// Delete everything `owner` has stored. Returns the number removed.
    pub async fn delete_owned_by(&self, owner: PlayerId) -> StorageResult<usize> {
        let dir = self.owner_dir(owner);
        let count = self.owned_by(owner).await?.len();
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(owner = %owner, count, "owner photos deleted");
                Ok(count)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(source) => Err(StorageError::RemovePhoto { path: dir, source }),
        }
    }

    /// Remove every stored photo.
    pub async fn clear(&self) -> StorageResult<()> {
        for owner in self.owners().await? {
            self.delete_owned_by(owner).await?;
        }
        info!("photo store cleared");
        Ok(())
    }

    fn owner_dir(&self, owner: PlayerId) -> PathBuf {
        self.root.join(owner.to_string())
    }

    async fn owners(&self) -> StorageResult<Vec<PlayerId>> {
        let mut owners = Vec::new();
        let mut entries =
            fs::read_dir(&self.root)
                .await
                .map_err(|source| StorageError::ListPhotos {
                    path: self.root.clone(),
                    source,
                })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::ListPhotos {
                path: self.root.clone(),
                source,
            })?
        {
            if let Some(owner) = entry
                .file_name()
                .to_str()
                .and_then(|n| Uuid::parse_str(n).ok())
            {
                owners.push(owner);
            }
        }
        Ok(owners)
    }

    async fn read_photo(
        &self,
        owner: PlayerId,
        id: PhotoId,
        path: &Path,
    ) -> StorageResult<StoredPhoto> {
        let bytes = fs::read(path)
            .await
            .map_err(|source| StorageError::ReadPhoto {
                path: path.to_path_buf(),
                source,
            })?;
        let created_at = fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(StoredPhoto {
            id,
            owner,
            bytes: Bytes::from(bytes),
            created_at,
        })
    }
}
