use futures::FutureExt;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::SsrError;
use crate::rendering::hydration_script::{escape_json, script_tag};
use crate::resource::SharedLoad;

/// Receives resources that were still loading when a streaming render
/// reached them. A transport forwards them to the client as they settle.
pub trait ResourceSink: Send + Sync {
    fn write_resource(&self, id: &str, pending: PendingResource);
}

/// A resource load handed off to a [`ResourceSink`].
#[derive(Clone)]
pub struct PendingResource {
    load: SharedLoad,
}

impl PendingResource {
    pub(crate) fn new(load: SharedLoad) -> Self {
        Self { load }
    }

    /// The result, if the load already settled.
    pub fn peek(&self) -> Option<&Result<JsonValue, SsrError>> {
        self.load.peek()
    }
}

impl Future for PendingResource {
    type Output = Result<JsonValue, SsrError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.load.poll_unpin(cx)
    }
}

impl std::fmt::Debug for PendingResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResource").field("settled", &self.peek().is_some()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChunk {
    pub id: String,
    pub result: Result<JsonValue, SsrError>,
}

impl ResourceChunk {
    pub fn is_error(&self) -> bool {
        self.result.is_err()
    }

    /// Client script that settles the resource in the hydration store.
    pub fn to_script(&self, nonce: Option<&str>) -> Result<String, SsrError> {
        let id = escape_json(&JsonValue::String(self.id.clone()))?;
        let body = match &self.result {
            Ok(value) => format!("_$HY.set({id}, {});", escape_json(value)?),
            Err(e) => {
                let message = escape_json(&JsonValue::String(e.to_string()))?;
                format!("_$HY.reject({id}, {message});")
            }
        };

        Ok(script_tag(&body, nonce))
    }
}
