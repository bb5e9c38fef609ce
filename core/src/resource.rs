//! Stateful proxy over one server-side resource.

use std::fmt;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::decode::Structured;
use crate::dispatcher::RequestDispatcher;
use crate::error::ApiError;
use crate::http::{Origin, RequestDescriptor};

/// The name a record answers to, compared against the requested name when a
/// mutation is reconciled.
pub trait Identity {
    fn identity(&self) -> &str;
}

/// Result of one structured GET against a handle's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub status: u16,
    pub origin: Origin,
}

/// A path on the server plus the last record fetched from it.
///
/// The snapshot is `None` until a poll returns 200 with a body that decodes;
/// a later poll that fails leaves the previous snapshot in place.
pub struct RemoteResourceHandle<'a, T> {
    dispatcher: &'a RequestDispatcher,
    base_path: String,
    query: Vec<(String, String)>,
    snapshot: Option<T>,
}

impl<'a, T: DeserializeOwned> RemoteResourceHandle<'a, T> {
    pub fn new(dispatcher: &'a RequestDispatcher, base_path: impl Into<String>) -> Self {
        Self {
            dispatcher,
            base_path: base_path.into(),
            query: Vec::new(),
            snapshot: None,
        }
    }

    /// Add a query parameter sent with every poll (e.g. `depth`).
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn dispatcher(&self) -> &'a RequestDispatcher {
        self.dispatcher
    }

    pub fn snapshot(&self) -> Option<&T> {
        self.snapshot.as_ref()
    }

    pub fn into_snapshot(self) -> Option<T> {
        self.snapshot
    }

    /// Refresh the snapshot and return the raw status code. 200 means the
    /// resource exists; anything else means it does not or is not readable.
    pub fn poll(&mut self) -> Result<u16, ApiError> {
        Ok(self.probe()?.status)
    }

    /// Like [`poll`](Self::poll) but also reports whether the status came
    /// from the server or was synthesized after a transport failure.
    pub fn probe(&mut self) -> Result<Probe, ApiError> {
        let response = self.dispatcher.send(&self.request(), &Structured::<T>::new())?;
        let probe = Probe {
            status: response.envelope.status,
            origin: response.envelope.origin,
        };
        if probe.status == 200 {
            match response.decoded {
                Ok(record) => self.snapshot = Some(record),
                Err(err) => self.dispatcher.observe(|| {
                    warn!(path = %self.base_path, error = %err, "poll kept the previous snapshot")
                }),
            }
        }
        Ok(probe)
    }

    /// Poll and require a 200 with a decodable body.
    pub fn fetch(&mut self) -> Result<&T, ApiError> {
        let response = self.dispatcher.send(&self.request(), &Structured::<T>::new())?;
        let record = response.into_value(&self.base_path)?;
        Ok(&*self.snapshot.insert(record))
    }

    fn request(&self) -> RequestDescriptor {
        RequestDescriptor::get(self.base_path.clone())
            .structured()
            .queries(self.query.iter().cloned())
    }
}

impl<T: Identity> RemoteResourceHandle<'_, T> {
    /// Identity of the current snapshot.
    pub fn identity(&self) -> Option<&str> {
        self.snapshot.as_ref().map(Identity::identity)
    }
}

impl<T: fmt::Debug> fmt::Debug for RemoteResourceHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteResourceHandle")
            .field("base_path", &self.base_path)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}
