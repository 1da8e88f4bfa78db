use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use crate::audio::track::TrackDescriptor;

/// Elemento guardado en una playlist de usuario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTrack {
    pub webpage_url: String,
    pub title: String,
}

impl SavedTrack {
    pub fn from_track(track: &TrackDescriptor) -> Self {
        Self {
            webpage_url: track.source_locator().to_string(),
            title: track.display_title().to_string(),
        }
    }

    /// Se encola sin volver a resolver; la duración no se guarda
    pub fn to_track(&self) -> TrackDescriptor {
        TrackDescriptor::new(self.webpage_url.clone(), self.title.clone(), 0)
    }
}

/// Playlists de usuario persistidas en un único archivo JSON.
///
/// Las claves tienen la forma `"{user_id}_{nombre}"`.
pub struct PlaylistStore {
    path: PathBuf,
    playlists: BTreeMap<String, Vec<SavedTrack>>,
}

impl PlaylistStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let playlists = match fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(playlists) => playlists,
                Err(e) => {
                    warn!("⚠️ Archivo de playlists corrupto ({}), se inicia vacío", e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("⚠️ No se pudo leer {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        info!(
            "📁 Playlists cargadas desde {} ({} listas)",
            path.display(),
            playlists.len()
        );

        Ok(Self { path, playlists })
    }

    /// Crea una playlist vacía; `false` si ya existía
    pub async fn create(&mut self, user_id: u64, name: &str) -> Result<bool> {
        let key = Self::key(user_id, name);
        if self.playlists.contains_key(&key) {
            return Ok(false);
        }

        self.playlists.insert(key, Vec::new());
        self.save().await?;
        info!("📝 Playlist '{}' creada para {}", name, user_id);
        Ok(true)
    }

    /// Agrega un track al final; `false` si la playlist no existe
    pub async fn add(&mut self, user_id: u64, name: &str, track: SavedTrack) -> Result<bool> {
        let Some(tracks) = self.playlists.get_mut(&Self::key(user_id, name)) else {
            return Ok(false);
        };

        tracks.push(track);
        self.save().await?;
        Ok(true)
    }

    /// Quita el elemento en `index` (base 1); `false` si la lista o el índice no existen
    pub async fn remove(&mut self, user_id: u64, name: &str, index: usize) -> Result<bool> {
        let Some(tracks) = self.playlists.get_mut(&Self::key(user_id, name)) else {
            return Ok(false);
        };

        if index == 0 || index > tracks.len() {
            return Ok(false);
        }

        tracks.remove(index - 1);
        self.save().await?;
        Ok(true)
    }

    pub fn get(&self, user_id: u64, name: &str) -> Option<&[SavedTrack]> {
        self.playlists
            .get(&Self::key(user_id, name))
            .map(Vec::as_slice)
    }

    /// Nombres de las playlists de un usuario
    pub fn user_playlists(&self, user_id: u64) -> Vec<String> {
        let prefix = format!("{}_", user_id);
        self.playlists
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(String::from)
            .collect()
    }

    fn key(user_id: u64, name: &str) -> String {
        format!("{}_{}", user_id, name)
    }

    async fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.playlists)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn saved(n: u32) -> SavedTrack {
        SavedTrack {
            webpage_url: format!("https://youtu.be/{n}"),
            title: format!("Track {n}"),
        }
    }

    #[tokio::test]
    async fn playlist_lifecycle_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlists.json");

        let mut store = PlaylistStore::open(path.clone()).await.unwrap();
        assert!(store.create(42, "gym").await.unwrap());
        assert!(!store.create(42, "gym").await.unwrap());
        assert!(store.add(42, "gym", saved(1)).await.unwrap());
        assert!(store.add(42, "gym", saved(2)).await.unwrap());
        assert!(store.add(42, "gym", saved(3)).await.unwrap());
        assert!(!store.add(42, "otra", saved(9)).await.unwrap());

        assert!(store.remove(42, "gym", 2).await.unwrap());
        assert!(!store.remove(42, "gym", 0).await.unwrap());
        assert!(!store.remove(42, "gym", 3).await.unwrap());

        let reopened = PlaylistStore::open(path).await.unwrap();
        assert_eq!(reopened.get(42, "gym").unwrap(), &[saved(1), saved(3)]);
        assert!(reopened.get(7, "gym").is_none());
    }

    #[tokio::test]
    async fn lists_only_the_users_playlists() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PlaylistStore::open(dir.path().join("p.json")).await.unwrap();

        store.create(1, "rock").await.unwrap();
        store.create(1, "chill_mix").await.unwrap();
        store.create(11, "jazz").await.unwrap();

        assert_eq!(store.user_playlists(1), vec!["chill_mix", "rock"]);
        assert_eq!(store.user_playlists(11), vec!["jazz"]);
        assert!(store.user_playlists(2).is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlists.json");
        std::fs::write(&path, "{ no es json").unwrap();

        let store = PlaylistStore::open(path).await.unwrap();
        assert!(store.user_playlists(1).is_empty());
    }

    #[test]
    fn saved_track_converts_without_duration() {
        let track = TrackDescriptor::new("https://youtu.be/x", "X", 215);
        let saved = SavedTrack::from_track(&track);
        assert_eq!(saved.to_track(), TrackDescriptor::new("https://youtu.be/x", "X", 0));
    }
}
