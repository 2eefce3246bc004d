use crate::error::{BioSimError, ClientError};
use crate::types::location::GeoLocation;
use indexmap::IndexMap;
use log::debug;
use ordered_float::OrderedFloat;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identity of a generated weather series on the server: a year range at a
/// location. Built from the coordinates, so two equal locations share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheSignature {
    initial_year: i32,
    final_year: i32,
    latitude: OrderedFloat<f64>,
    longitude: OrderedFloat<f64>,
    elevation: OrderedFloat<f64>,
}

impl CacheSignature {
    pub fn new(initial_year: i32, final_year: i32, location: &GeoLocation) -> Self {
        Self {
            initial_year,
            final_year,
            latitude: OrderedFloat(location.latitude),
            longitude: OrderedFloat(location.longitude),
            elevation: OrderedFloat(location.elevation),
        }
    }
}

/// Handles of weather series already generated on the server.
///
/// In persistent mode a handle is kept until [`ClimateCache::drain`] hands
/// it back for release. In ephemeral mode nothing is kept and every request
/// generates anew.
///
/// A caller still using handles it got from the cache holds a [`lease`];
/// handles are only taken out for release once every lease is gone.
///
/// [`lease`]: ClimateCache::lease
pub struct ClimateCache {
    handles: Mutex<HashMap<CacheSignature, String>>,
    leases: RwLock<()>,
    ephemeral: bool,
    lookups: AtomicUsize,
    hits: AtomicUsize,
}

impl ClimateCache {
    pub fn new(ephemeral: bool) -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            leases: RwLock::new(()),
            ephemeral,
            lookups: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    /// Returns one handle per distinct location, in request order.
    ///
    /// Misses are handed to `generate` in a single call, which must answer
    /// with one handle per location it was given, in the same order. The
    /// cache stays locked until the new handles are stored, so concurrent
    /// callers never generate the same signature twice.
    pub async fn get_or_generate<F, Fut>(
        &self,
        from_year: i32,
        to_year: i32,
        locations: &[GeoLocation],
        generate: F,
    ) -> Result<IndexMap<GeoLocation, String>, BioSimError>
    where
        F: FnOnce(Vec<GeoLocation>) -> Fut,
        Fut: Future<Output = Result<Vec<String>, BioSimError>>,
    {
        let mut distinct: Vec<GeoLocation> = Vec::with_capacity(locations.len());
        for location in locations {
            if !distinct.contains(location) {
                distinct.push(*location);
            }
        }

        if self.ephemeral {
            let handles = Self::generate_checked(distinct.clone(), generate).await?;
            return Ok(distinct.into_iter().zip(handles).collect());
        }

        let mut cache = self.handles.lock().await;
        let mut misses = Vec::new();
        for location in &distinct {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            if cache.contains_key(&CacheSignature::new(from_year, to_year, location)) {
                self.hits.fetch_add(1, Ordering::Relaxed);
            } else {
                misses.push(*location);
            }
        }
        debug!(
            "Climate cache: {} hit(s), {} miss(es)",
            distinct.len() - misses.len(),
            misses.len()
        );

        if !misses.is_empty() {
            let handles = Self::generate_checked(misses.clone(), generate).await?;
            for (location, handle) in misses.iter().zip(handles) {
                cache.insert(CacheSignature::new(from_year, to_year, location), handle);
            }
        }

        let mut result = IndexMap::with_capacity(distinct.len());
        for location in distinct {
            if let Some(handle) = cache.get(&CacheSignature::new(from_year, to_year, &location)) {
                result.insert(location, handle.clone());
            }
        }
        Ok(result)
    }

    async fn generate_checked<F, Fut>(
        locations: Vec<GeoLocation>,
        generate: F,
    ) -> Result<Vec<String>, BioSimError>
    where
        F: FnOnce(Vec<GeoLocation>) -> Fut,
        Fut: Future<Output = Result<Vec<String>, BioSimError>>,
    {
        let expected = locations.len();
        let handles = generate(locations).await?;
        if handles.len() != expected {
            return Err(ClientError::HandleCountMismatch {
                expected,
                found: handles.len(),
            }
            .into());
        }
        Ok(handles)
    }

    /// Keeps the cached handles alive on the server until the guard drops.
    pub async fn lease(&self) -> RwLockReadGuard<'_, ()> {
        self.leases.read().await
    }

    /// Waits until no lease is held and keeps new ones out until the guard
    /// drops.
    pub(crate) async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.leases.write().await
    }

    /// Empties the cache and returns the handles it held. Waits for the
    /// outstanding leases first.
    pub async fn drain(&self) -> Vec<String> {
        let _exclusive = self.exclusive().await;
        self.take_entries()
            .await
            .into_iter()
            .map(|(_, handle)| handle)
            .collect()
    }

    pub(crate) async fn take_entries(&self) -> Vec<(CacheSignature, String)> {
        self.handles.lock().await.drain().collect()
    }

    /// Puts entries back after a failed release.
    pub(crate) async fn restore(&self, entries: Vec<(CacheSignature, String)>) {
        self.handles.lock().await.extend(entries);
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of handles held, or `None` if the cache is busy.
    pub(crate) fn try_len(&self) -> Option<usize> {
        self.handles.try_lock().ok().map(|cache| cache.len())
    }

    /// Number of per-location lookups since creation.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of lookups served from the cache.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}
