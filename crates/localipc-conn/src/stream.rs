use std::marker::PhantomData;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;

/// One message of a stream: an item, or the marker that ends the stream.
///
/// The marker is a distinct variant, so no item value can be mistaken for
/// it. On the wire an item is `{"Item": <value>}` and the end marker is
/// `"End"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamItem<T> {
    Item(T),
    End,
}

/// Lazy iterator over the items of one stream, created by
/// [`Connection::xread`].
///
/// Each `next` performs one timed read. The iterator ends after the end
/// marker, and also after yielding its first error.
pub struct XRead<'a, T> {
    conn: &'a mut Connection,
    timeout: Duration,
    done: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Iterator for XRead<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.conn.read_with_timeout::<StreamItem<T>>(self.timeout) {
            Ok(StreamItem::Item(item)) => Some(Ok(item)),
            Ok(StreamItem::End) => {
                debug!(connection = %self.conn.id(), "stream ended");
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<T: DeserializeOwned> std::iter::FusedIterator for XRead<'_, T> {}

impl Connection {
    /// Read a stream of items until its end marker, each item waiting up to
    /// the configured read timeout.
    pub fn xread<T: DeserializeOwned>(&mut self) -> XRead<'_, T> {
        let timeout = self.config().read_timeout;
        self.xread_with_timeout(timeout)
    }

    /// Read a stream of items, each item waiting up to `timeout`.
    pub fn xread_with_timeout<T: DeserializeOwned>(&mut self, timeout: Duration) -> XRead<'_, T> {
        XRead {
            conn: self,
            timeout,
            done: false,
            _item: PhantomData,
        }
    }

    /// Send every item of `items` followed by the end marker.
    ///
    /// An empty sequence sends only the marker. The first failed write
    /// aborts the stream, and the marker is not sent.
    pub fn xwrite<I>(&mut self, items: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: Serialize,
    {
        let mut sent = 0;
        for item in items {
            self.write(&StreamItem::Item(item))?;
            sent += 1;
        }
        self.write(&StreamItem::<()>::End)?;
        debug!(connection = %self.id(), items = sent, "stream sent");
        Ok(sent)
    }
}
