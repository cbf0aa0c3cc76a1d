// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{Fuse, FusedStream};
use futures_util::task::{Context, Poll};
use futures_util::{Stream, StreamExt, ready};
use pin_project::pin_project;
use warden_core::{ChangeEvent, DocId, FeedEvent, VisibilitySet};

/// An extension trait for `Stream`s that provides a convenient
/// [`filter_changes`](FilterChangesExt::filter_changes) method.
pub trait FilterChangesExt: Stream<Item = FeedEvent> {
    /// Rewrite a change feed against a user's visibility.
    ///
    /// Per event: forwarded unchanged when the document is in `visible`;
    /// rewritten to a deletion stub when the document is in `purged` (the
    /// client saw it before and has since lost it, so its replica must drop
    /// it like a delete); suppressed when the document was never visible.
    ///
    /// Ordering is preserved exactly as received and one input event yields
    /// at most one output event. Heartbeats are forwarded in the same poll
    /// they arrive in; the adapter holds no buffered item across polls, so a
    /// keepalive is never delayed behind suppressed events or upstream
    /// suspension.
    fn filter_changes(
        self,
        visible: Arc<VisibilitySet>,
        purged: Arc<HashSet<DocId>>,
    ) -> FilterChanges<Self>
    where
        Self: Sized,
    {
        FilterChanges::new(self, visible, purged)
    }
}

impl<T: ?Sized> FilterChangesExt for T where T: Stream<Item = FeedEvent> {}

/// Stream for the [`filter_changes`](FilterChangesExt::filter_changes) method.
#[derive(Debug)]
#[pin_project]
#[must_use = "streams do nothing unless polled"]
pub struct FilterChanges<St>
where
    St: Stream<Item = FeedEvent>,
{
    #[pin]
    stream: Fuse<St>,
    visible: Arc<VisibilitySet>,
    purged: Arc<HashSet<DocId>>,
}

impl<St> FilterChanges<St>
where
    St: Stream<Item = FeedEvent>,
{
    pub(super) fn new(
        stream: St,
        visible: Arc<VisibilitySet>,
        purged: Arc<HashSet<DocId>>,
    ) -> FilterChanges<St> {
        FilterChanges {
            stream: stream.fuse(),
            visible,
            purged,
        }
    }

    /// Acquires a reference to the underlying stream.
    pub fn get_ref(&self) -> &St {
        self.stream.get_ref()
    }

    /// Acquires a pinned mutable reference to the underlying stream.
    pub fn get_pin_mut(self: Pin<&mut Self>) -> Pin<&mut St> {
        self.project().stream.get_pin_mut()
    }
}

impl<St> Stream for FilterChanges<St>
where
    St: Stream<Item = FeedEvent>,
{
    type Item = FeedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            let Some(event) = ready!(this.stream.as_mut().poll_next(cx)) else {
                return Poll::Ready(None);
            };

            match event {
                FeedEvent::Heartbeat => return Poll::Ready(Some(FeedEvent::Heartbeat)),
                FeedEvent::Change(change) => {
                    if this.visible.contains(&change.id) {
                        return Poll::Ready(Some(FeedEvent::Change(change)));
                    }
                    if this.purged.contains(&change.id) {
                        let stub =
                            ChangeEvent::deletion_stub(change.seq, change.id, change.revision);
                        return Poll::Ready(Some(FeedEvent::Change(stub)));
                    }
                    // Never visible to this user: drop and pull the next
                    // event within the same poll.
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // Suppression can only shrink the stream.
        (0, self.stream.size_hint().1)
    }
}

impl<St> FusedStream for FilterChanges<St>
where
    St: Stream<Item = FeedEvent>,
{
    fn is_terminated(&self) -> bool {
        self.stream.is_terminated()
    }
}
