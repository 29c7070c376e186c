//! Terminal operators built on `collect`.

use super::Flow;
use crate::error::{Error, Result};
use std::future::ready;
use std::ops::ControlFlow;

impl<T: Send + 'static> Flow<T> {
    /// Collects with a synchronous consumer.
    ///
    /// # Errors
    ///
    /// The producer's error.
    pub async fn for_each<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(T) + Send,
    {
        self.collect_while(move |value| {
            f(value);
            ready(Ok(ControlFlow::Continue(())))
        })
        .await
    }

    /// Collects every value into a vector.
    ///
    /// # Errors
    ///
    /// The producer's error; values collected so far are discarded.
    pub async fn to_vec(&self) -> Result<Vec<T>> {
        let mut values = Vec::new();
        self.for_each(|value| values.push(value)).await?;
        Ok(values)
    }

    /// Folds every value into an accumulator.
    ///
    /// # Errors
    ///
    /// The producer's error.
    pub async fn fold<A, F>(&self, init: A, mut f: F) -> Result<A>
    where
        A: Send,
        F: FnMut(A, T) -> A + Send,
    {
        let mut acc = Some(init);
        self.for_each(|value| {
            acc = acc.take().map(|current| f(current, value));
        })
        .await?;
        acc.ok_or_else(|| Error::internal("fold lost its accumulator"))
    }

    /// The first value, stopping the producer right after it.
    ///
    /// Returns `None` for a flow that completes without emitting.
    ///
    /// # Errors
    ///
    /// The producer's error, if it fails before emitting.
    pub async fn first(&self) -> Result<Option<T>> {
        let mut first = None;
        self.collect_while(|value| {
            first = Some(value);
            ready(Ok(ControlFlow::Break(())))
        })
        .await?;
        Ok(first)
    }
}
