//! Sends `RequestDescriptor`s to the remote server.
//!
//! # Design
//! The dispatcher is immutable once built: every call returns its own
//! `Response`, so one dispatcher can be shared between threads. Calls are
//! blocking and run on the caller's thread; there is no retry, cache or
//! timeout at this layer.
//!
//! Logging goes through an optional injected `tracing::Dispatch`. Without
//! one, events reach whatever subscriber is current for the caller.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::{debug, warn, Dispatch};
use ureq::config::RedirectAuthHeaders;
use ureq::http;
use ureq::tls::TlsConfig;
use ureq::Agent;

use crate::config::{ClientConfig, Credentials, TransportFailurePolicy};
use crate::decode::{Decoder, Response};
use crate::error::ApiError;
use crate::http::{HttpMethod, Origin, Payload, RequestDescriptor, ResponseEnvelope};
use crate::multipart;

/// Console logs of long builds easily exceed ureq's 10 MiB default.
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

pub struct RequestDispatcher {
    base_url: String,
    agent: Agent,
    authorization: Option<String>,
    transport_failure: TransportFailurePolicy,
    logger: Option<Dispatch>,
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("base_url", &self.base_url)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("transport_failure", &self.transport_failure)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestDispatcher {
    pub fn new(config: &ClientConfig) -> Self {
        let mut agent_config = Agent::config_builder()
            .http_status_as_error(false)
            .redirect_auth_headers(RedirectAuthHeaders::SameHost);
        if !config.ssl_verify {
            agent_config =
                agent_config.tls_config(TlsConfig::builder().disable_verification(true).build());
        }

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            agent: agent_config.build().new_agent(),
            authorization: config.credentials.as_ref().map(basic_authorization),
            transport_failure: config.transport_failure,
            logger: None,
        }
    }

    /// Route this dispatcher's events through `dispatch`.
    #[must_use]
    pub fn with_logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` and decode the body with `decoder`.
    ///
    /// A body that fails to decode still produces `Ok`; the failure is in
    /// `Response::decoded`.
    pub fn send<D: Decoder>(
        &self,
        request: &RequestDescriptor,
        decoder: &D,
    ) -> Result<Response<D::Output>, ApiError> {
        self.observe(|| {
            let envelope = self.transmit(request)?;
            let decoded = decoder.decode(&envelope.body);
            if let Err(err) = &decoded {
                debug!(path = %request.path, error = %err, "response body did not decode");
            }
            Ok(Response { envelope, decoded })
        })
    }

    /// Run `f` with the injected logger as the default subscriber.
    pub(crate) fn observe<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.logger {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    fn transmit(&self, request: &RequestDescriptor) -> Result<ResponseEnvelope, ApiError> {
        let url = request.url(&self.base_url);
        let wire = self.build_wire_request(request, &url)?;
        debug!(method = request.method.as_str(), %url, "dispatching request");

        let sent = match request.method {
            HttpMethod::Get | HttpMethod::Delete => self.agent.run(wire.map(|_| ())),
            HttpMethod::Post | HttpMethod::Put => self.agent.run(wire),
        };
        let envelope = match sent.and_then(read_envelope) {
            Ok(envelope) => envelope,
            Err(source) => match self.transport_failure {
                TransportFailurePolicy::Surface => {
                    warn!(%url, error = %source, "request failed before a response arrived");
                    return Err(ApiError::Transport {
                        url,
                        source: Box::new(source),
                    });
                }
                TransportFailurePolicy::Synthesize => {
                    warn!(%url, error = %source, "request failed, answering with a synthesized 404");
                    ResponseEnvelope::synthesized_not_found()
                }
            },
        };

        if !envelope.is_tolerated() {
            debug!(
                %url,
                status = envelope.status,
                body = %String::from_utf8_lossy(&envelope.body),
                "request returned failure status"
            );
        }
        Ok(envelope)
    }

    fn build_wire_request(
        &self,
        request: &RequestDescriptor,
        url: &str,
    ) -> Result<http::Request<Vec<u8>>, ApiError> {
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(url);
        if let Some(authorization) = &self.authorization {
            builder = builder.header("Authorization", authorization);
        }

        let body = match &request.payload {
            Payload::None => Vec::new(),
            Payload::Raw {
                content_type,
                bytes,
            } => {
                builder = builder.header("Content-Type", content_type);
                bytes.clone()
            }
            Payload::Files { files, fields } => {
                let encoded = multipart::encode(files, fields)?;
                builder = builder.header("Content-Type", encoded.content_type);
                encoded.bytes
            }
        };

        builder
            .body(body)
            .map_err(|e| ApiError::InvalidRequest(format!("{url}: {e}")))
    }
}

fn read_envelope(mut response: http::Response<ureq::Body>) -> Result<ResponseEnvelope, ureq::Error> {
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_vec()?;
    Ok(ResponseEnvelope {
        status,
        headers,
        body,
        origin: Origin::Remote,
    })
}

fn basic_authorization(credentials: &Credentials) -> String {
    let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
    format!("Basic {token}")
}
