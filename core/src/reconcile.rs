//! Reconciles mutating calls with what the server actually did.
//!
//! # Design
//! The server can answer a create, copy, rename or delete with an error page
//! after the change was already committed, or the other way round. A call
//! moves through three states:
//!
//! - **Issued**: the mutating request is sent. Any 2xx is final success.
//! - **Verifying**: any other status triggers exactly one structured GET of
//!   the target path on a fresh handle.
//! - **Final**: the verdict below is returned; nothing is retried.
//!
//! Create, copy and rename succeed when the target answers 200 and its
//! identity equals the requested name. Delete succeeds when the target
//! answers 404. Every other verification result (transport failure, a
//! synthesized status, 401, 5xx) leaves the original failure standing.

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::decode::Discard;
use crate::dispatcher::RequestDispatcher;
use crate::error::ApiError;
use crate::http::{Origin, RequestDescriptor};
use crate::resource::{Identity, RemoteResourceHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Copy,
    Rename,
    Delete,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Copy => "copy",
            MutationKind::Rename => "rename",
            MutationKind::Delete => "delete",
        }
    }
}

/// What a mutating call amounted to.
///
/// `final_status` is always the status the mutating request returned.
/// `reconciled` is true when that status was not 2xx and a verification poll
/// gave a definite answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    pub succeeded: bool,
    pub reconciled: bool,
    pub final_status: u16,
}

impl MutationOutcome {
    /// Turn a failed outcome into `ApiError::Status` with the original code.
    pub fn ensure(self, path: &str) -> Result<Self, ApiError> {
        if self.succeeded {
            Ok(self)
        } else {
            Err(ApiError::Status {
                status: self.final_status,
                path: path.to_string(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Confirmed,
    Refuted,
    Inconclusive,
}

pub struct MutationReconciler<'a> {
    dispatcher: &'a RequestDispatcher,
}

impl<'a> MutationReconciler<'a> {
    pub fn new(dispatcher: &'a RequestDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Issue `request` and, if its status is not 2xx, poll `target` once to
    /// find out whether the mutation happened anyway.
    ///
    /// `target` should be a fresh handle on the path the resource has (or
    /// had) after the mutation; on success it holds the polled snapshot.
    /// A transport failure of the mutating request itself is returned as an
    /// error.
    pub fn reconcile<T>(
        &self,
        kind: MutationKind,
        request: &RequestDescriptor,
        target: &mut RemoteResourceHandle<'a, T>,
        expected_name: &str,
    ) -> Result<MutationOutcome, ApiError>
    where
        T: DeserializeOwned + Identity,
    {
        let status = self.dispatcher.send(request, &Discard)?.status();
        if (200..300).contains(&status) {
            return Ok(MutationOutcome {
                succeeded: true,
                reconciled: false,
                final_status: status,
            });
        }

        let verdict = self.verify(kind, target, expected_name);
        self.dispatcher.observe(|| match verdict {
            Verdict::Confirmed => info!(
                kind = kind.as_str(),
                path = target.base_path(),
                status,
                "mutation took effect despite failure status"
            ),
            Verdict::Refuted => warn!(
                kind = kind.as_str(),
                path = target.base_path(),
                status,
                "mutation did not take effect"
            ),
            Verdict::Inconclusive => warn!(
                kind = kind.as_str(),
                path = target.base_path(),
                status,
                "could not verify mutation, reporting original status"
            ),
        });

        Ok(MutationOutcome {
            succeeded: verdict == Verdict::Confirmed,
            reconciled: verdict != Verdict::Inconclusive,
            final_status: status,
        })
    }

    fn verify<T>(
        &self,
        kind: MutationKind,
        target: &mut RemoteResourceHandle<'a, T>,
        expected_name: &str,
    ) -> Verdict
    where
        T: DeserializeOwned + Identity,
    {
        let probe = match target.probe() {
            Ok(probe) if probe.origin == Origin::Remote => probe,
            Ok(_) => return Verdict::Inconclusive,
            Err(err) => {
                self.dispatcher.observe(|| {
                    warn!(path = target.base_path(), error = %err, "verification poll failed")
                });
                return Verdict::Inconclusive;
            }
        };

        match (kind, probe.status) {
            (MutationKind::Delete, 404) => Verdict::Confirmed,
            (MutationKind::Delete, 200) => Verdict::Refuted,
            (_, 200) if target.identity() == Some(expected_name) => Verdict::Confirmed,
            (MutationKind::Create | MutationKind::Copy | MutationKind::Rename, 200 | 404) => {
                Verdict::Refuted
            }
            _ => Verdict::Inconclusive,
        }
    }
}
