use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::body::{Body, Bytes, Frame, Incoming, SizeHint};

use crate::upstream::transport::HostSlot;

/// Upstream response body that keeps its per-host connection slot until the
/// body is fully read or dropped.
pub struct SlotBody {
    inner: Incoming,
    _slot: HostSlot,
}

impl SlotBody {
    pub fn new(inner: Incoming, slot: HostSlot) -> Self {
        Self { inner, _slot: slot }
    }
}

impl Body for SlotBody {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, hyper::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
