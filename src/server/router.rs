use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::protocol::message::{Method, Request, Response, StatusCode};
use crate::protocol::Protocol;
use crate::util::random_alphabetic;

use super::ledger::RequestLedger;

/// Size of the constant long-payload body. Sized so the response frame
/// still fits a single UDP datagram.
pub const LONG_PAYLOAD_SIZE: usize = 60 * 1024;

enum Resource {
    Ledger(Arc<RequestLedger>),
    LongPayload(Bytes),
}

/// Path-keyed resource tree: one ledger per transport variant plus its
/// long-payload sibling. All transports dispatch into the same router.
pub struct Router {
    resources: HashMap<String, Resource>,
}

impl Router {
    pub fn new() -> Self {
        let long_payload = Bytes::from(random_alphabetic(LONG_PAYLOAD_SIZE).into_bytes());
        let mut resources = HashMap::new();
        for protocol in Protocol::ALL {
            let path = protocol.path().to_string();
            resources.insert(
                path.clone(),
                Resource::Ledger(Arc::new(RequestLedger::new(path))),
            );
            resources.insert(
                protocol.long_payload_path(),
                Resource::LongPayload(long_payload.clone()),
            );
        }
        Self { resources }
    }

    pub fn handle(&self, request: &Request) -> Response {
        match self.resources.get(&request.path) {
            Some(Resource::Ledger(ledger)) => match request.method {
                Method::Post => ledger.handle_post(&request.payload),
                Method::Get => ledger.handle_get(),
            },
            Some(Resource::LongPayload(body)) => match request.method {
                Method::Get => Response::new(StatusCode::CONTENT, body.clone()),
                Method::Post => Response::new(StatusCode::METHOD_NOT_ALLOWED, Bytes::new()),
            },
            None => {
                debug!(path = %request.path, "request for unknown resource");
                Response::new(StatusCode::NOT_FOUND, Bytes::new())
            }
        }
    }

    /// The ledger behind a resource path, if that path has one.
    pub fn ledger(&self, path: &str) -> Option<Arc<RequestLedger>> {
        match self.resources.get(path) {
            Some(Resource::Ledger(ledger)) => Some(Arc::clone(ledger)),
            _ => None,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
