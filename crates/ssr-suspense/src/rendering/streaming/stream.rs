use futures::stream::FuturesUnordered;
use futures::{FutureExt, Stream, StreamExt};
use futures::future::BoxFuture;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

use super::types::{PendingResource, ResourceChunk, ResourceSink};

/// Creates a sink and the stream of the resources written to it.
pub fn channel_sink() -> (ChannelSink, ResourceStream) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ChannelSink { sender }, ResourceStream::new(receiver))
}

/// [`ResourceSink`] that forwards every hand-off to a [`ResourceStream`].
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<(String, PendingResource)>,
}

impl ResourceSink for ChannelSink {
    fn write_resource(&self, id: &str, pending: PendingResource) {
        if self.sender.send((id.to_string(), pending)).is_err() {
            debug!(resource = id, "Resource stream dropped, discarding pending resource");
        }
    }
}

/// Yields each handed-off resource as soon as it settles, in completion
/// order. Ends once every sink is gone and every load has settled.
pub struct ResourceStream {
    receiver: mpsc::UnboundedReceiver<(String, PendingResource)>,
    inflight: FuturesUnordered<BoxFuture<'static, ResourceChunk>>,
    receiver_closed: bool,
}

impl ResourceStream {
    pub fn new(receiver: mpsc::UnboundedReceiver<(String, PendingResource)>) -> Self {
        Self { receiver, inflight: FuturesUnordered::new(), receiver_closed: false }
    }

    pub async fn next_chunk(&mut self) -> Option<ResourceChunk> {
        self.next().await
    }

    pub fn pending_count(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_complete(&self) -> bool {
        self.receiver_closed && self.inflight.is_empty()
    }
}

impl Stream for ResourceStream {
    type Item = ResourceChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        while !self.receiver_closed {
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some((id, pending))) => {
                    self.inflight.push(pending.map(|result| ResourceChunk { id, result }).boxed());
                }
                Poll::Ready(None) => self.receiver_closed = true,
                Poll::Pending => break,
            }
        }

        match self.inflight.poll_next_unpin(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk)),
            Poll::Ready(None) if self.receiver_closed => Poll::Ready(None),
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SsrError;
    use serde_json::json;

    fn pending(result: Result<serde_json::Value, SsrError>) -> (futures::channel::oneshot::Sender<()>, PendingResource) {
        let (sender, receiver) = futures::channel::oneshot::channel::<()>();
        let load = async move {
            let _ = receiver.await;
            result
        }
        .boxed()
        .shared();
        (sender, PendingResource::new(load))
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_completion_order() {
        let (sink, mut stream) = channel_sink();
        let (first, a) = pending(Ok(json!("a")));
        let (second, b) = pending(Ok(json!("b")));

        sink.write_resource("0.0", a);
        sink.write_resource("0.1", b);
        drop(sink);

        second.send(()).expect("load alive");
        let chunk = stream.next_chunk().await.expect("chunk");
        assert_eq!(chunk.id, "0.1");
        assert_eq!(chunk.result, Ok(json!("b")));

        first.send(()).expect("load alive");
        let chunk = stream.next_chunk().await.expect("chunk");
        assert_eq!(chunk.id, "0.0");

        assert!(stream.next_chunk().await.is_none());
        assert!(stream.is_complete());
    }

    #[tokio::test]
    async fn test_failed_load_is_yielded_as_error_chunk() {
        let (sink, mut stream) = channel_sink();
        let (trigger, load) = pending(Err(SsrError::producer("0.0", "boom")));
        sink.write_resource("0.0", load);
        drop(sink);
        trigger.send(()).expect("load alive");

        let chunk = stream.next_chunk().await.expect("chunk");
        assert!(chunk.is_error());
        assert_eq!(
            chunk.to_script(None).unwrap(),
            "<script>_$HY.reject(\"0.0\", \"Resource 0.0 failed to load: boom\");</script>"
        );
    }

    #[tokio::test]
    async fn test_stream_ends_when_sink_dropped_without_writes() {
        let (sink, mut stream) = channel_sink();
        drop(sink);

        assert!(stream.next_chunk().await.is_none());
    }
}
