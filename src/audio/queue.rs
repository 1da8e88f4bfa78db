use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use super::track::TrackDescriptor;
use crate::error::QueueError;

/// Capacidad por defecto de la cola de una guild.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Cola FIFO acotada de tracks pendientes de una guild.
///
/// Las posiciones que ve el usuario empiezan en 1. Cuando la cola está llena
/// se rechaza la inserción nueva; lo ya encolado nunca se descarta.
#[derive(Debug, Clone)]
pub struct TrackQueue {
    items: VecDeque<TrackDescriptor>,
    capacity: usize,
}

impl TrackQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Agrega un track al final de la cola
    pub fn push(&mut self, track: TrackDescriptor) -> Result<(), QueueError> {
        if self.items.len() >= self.capacity {
            return Err(QueueError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        debug!("➕ Agregado a la cola: {}", track.display_title());
        self.items.push_back(track);
        Ok(())
    }

    /// Agrega varios tracks conservando su orden; devuelve cuántos entraron.
    ///
    /// Lo que no cabe se descarta y se registra, igual que al cargar una
    /// playlist más grande que el espacio libre.
    pub fn extend(&mut self, tracks: Vec<TrackDescriptor>) -> usize {
        let available = self.capacity.saturating_sub(self.items.len());
        let offered = tracks.len();
        let to_add = offered.min(available);

        self.items.extend(tracks.into_iter().take(to_add));

        if to_add < offered {
            warn!(
                "🚫 Cola llena: {} de {} canciones descartadas",
                offered - to_add,
                offered
            );
        }
        if to_add > 0 {
            info!("➕ Agregadas {} canciones a la cola", to_add);
        }
        to_add
    }

    /// Extrae el primer track (FIFO)
    pub fn pop_front(&mut self) -> Option<TrackDescriptor> {
        self.items.pop_front()
    }

    /// Copia ordenada del contenido para mostrarla
    pub fn snapshot(&self) -> Vec<TrackDescriptor> {
        self.items.iter().cloned().collect()
    }

    /// Elimina el track en la posición `index` (base 1)
    pub fn remove(&mut self, index: usize) -> Result<TrackDescriptor, QueueError> {
        let position = self.checked_position(index)?;
        let removed = self
            .items
            .remove(position)
            .ok_or(QueueError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })?;

        debug!("❌ Track eliminado en posición {}: {}", index, removed.display_title());
        Ok(removed)
    }

    /// Mueve el track en la posición `index` (base 1) al principio
    pub fn move_to_front(&mut self, index: usize) -> Result<&TrackDescriptor, QueueError> {
        let position = self.checked_position(index)?;
        if position != 0 {
            if let Some(item) = self.items.remove(position) {
                self.items.push_front(item);
            }
            debug!("📍 Track movido de posición {} al inicio", index);
        }

        self.items.front().ok_or(QueueError::IndexOutOfRange { index, len: 0 })
    }

    /// Limpia la cola y devuelve cuántos tracks había
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        }
        cleared
    }

    /// Permutación aleatoria uniforme del contenido actual
    pub fn shuffle(&mut self) -> Result<(), QueueError> {
        if self.items.len() < 2 {
            return Err(QueueError::NotEnoughTracks {
                len: self.items.len(),
            });
        }

        let mut rng = rand::thread_rng();
        self.items.make_contiguous().shuffle(&mut rng);
        info!("🔀 Cola mezclada ({} canciones)", self.items.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn checked_position(&self, index: usize) -> Result<usize, QueueError> {
        if index == 0 || index > self.items.len() {
            return Err(QueueError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        Ok(index - 1)
    }
}

impl Default for TrackQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
