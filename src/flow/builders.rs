//! Flow constructors.

use super::{Emitter, Flow};
use crate::error::Result;
use std::future::Future;

/// Defines a flow from its producer. Same as [`Flow::new`].
pub fn flow<T, F, Fut>(producer: F) -> Flow<T>
where
    T: Send + 'static,
    F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Flow::new(producer)
}

/// A flow that emits the items of `items`, in order, on every collection.
pub fn flow_of<I>(items: I) -> Flow<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    Flow::new(move |emitter| {
        let items = items.clone();
        async move {
            for item in items {
                emitter.emit(item).await?;
            }
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_of_replays_items() {
        let source = flow_of(vec!['x', 'y']);
        for _ in 0..2 {
            let values = futures_lite::future::block_on(source.to_vec()).expect("collected");
            assert_eq!(values, vec!['x', 'y']);
        }
    }
}
