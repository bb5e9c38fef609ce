//! Blocking client for a Jenkins-style CI server's remote API.
//!
//! # Overview
//! Every resource on the server (root, job, build, folder, agent, view) is
//! a path that answers a structured GET with JSON. The client describes a
//! call as a plain-data [`RequestDescriptor`], sends it through one
//! [`RequestDispatcher`], and wraps the reply in a [`Response`] whose body
//! is decoded by a caller-chosen [`Decoder`].
//!
//! # Design
//! - [`RemoteResourceHandle`] is the stateful part: a path plus the last
//!   snapshot that decoded. `poll()` refreshes it and returns the raw status.
//! - Mutations (create, copy, rename, delete) go through
//!   [`MutationReconciler`], which polls the target once when the server
//!   answers with a failure status and reports what actually happened.
//! - A request that gets no response surfaces as [`ApiError::Transport`]
//!   unless the config opts into the synthesized-404 behaviour, see
//!   [`TransportFailurePolicy`].
//! - Logging uses `tracing`; a per-client `Dispatch` can be injected with
//!   [`JenkinsClient::with_logger`].

pub mod client;
pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod folder;
pub mod http;
pub mod job;
pub mod multipart;
pub mod node;
pub mod reconcile;
pub mod resource;
pub mod types;
pub mod view;

pub use client::JenkinsClient;
pub use config::{ClientConfig, Credentials, TransportFailurePolicy};
pub use decode::{DecodeError, Decoder, Discard, RawText, Response, Structured};
pub use dispatcher::RequestDispatcher;
pub use error::ApiError;
pub use folder::Folder;
pub use http::{
    escape, path_segment, ContentDialect, HttpMethod, Origin, Payload, RequestDescriptor, ResponseEnvelope,
};
pub use job::{Build, Job};
pub use node::{Node, NodeMode, NodeOptions, SshNodeOptions};
pub use reconcile::{MutationKind, MutationOutcome, MutationReconciler};
pub use resource::{Identity, Probe, RemoteResourceHandle};
pub use types::*;
pub use view::{View, ViewType};
