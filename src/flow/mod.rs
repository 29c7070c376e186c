//! Cold, sequential, asynchronous value streams.
//!
//! A [`Flow`] is a reusable producer definition. Nothing runs until it is
//! collected, and every collection runs the producer again from the start.
//!
//! ```ignore
//! let squares = flow(|emitter| async move {
//!     for i in 1..=3 {
//!         coscope::time::sleep(Duration::from_millis(100)).await;
//!         emitter.emit(i).await?;
//!     }
//!     Ok(())
//! })
//! .map(|i| i * i);
//!
//! squares.collect(|v| async move {
//!     println!("{v}");
//!     Ok(())
//! }).await?;
//! ```
//!
//! # Backpressure
//!
//! There is no buffer between producer and collector: `emit` resumes only
//! after the collector's consumer returned for that value. The producer runs
//! inside the collector's poll, on the collecting task.
//!
//! # Failure
//!
//! A producer error ends the collection with that error. A consumer error
//! stops the producer at its pending `emit` and is returned from `collect`.

mod builders;
mod emitter;
mod ops;
mod terminal;

pub use builders::{flow, flow_of};
pub use emitter::{Emit, Emitter};

use crate::error::Result;
use emitter::Handoff;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

type ProducerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;
type Producer<T> = dyn Fn(Emitter<T>) -> ProducerFuture + Send + Sync;

/// A cold asynchronous stream of `T`.
pub struct Flow<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Flow<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("item", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: Send + 'static> Flow<T> {
    /// Defines a flow from its producer.
    ///
    /// The producer is called once per collection with a fresh [`Emitter`].
    pub fn new<F, Fut>(producer: F) -> Self
    where
        F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move |emitter| Box::pin(producer(emitter)) as ProducerFuture),
        }
    }

    /// A flow that completes without emitting.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|_emitter| async { Ok(()) })
    }

    /// Runs the producer and awaits `consumer` for every value, in order.
    ///
    /// # Errors
    ///
    /// The first error of the producer or of the consumer.
    pub async fn collect<C, CFut>(&self, mut consumer: C) -> Result<()>
    where
        C: FnMut(T) -> CFut + Send,
        CFut: Future<Output = Result<()>> + Send,
    {
        self.collect_while(move |value| {
            let consumed = consumer(value);
            async move { consumed.await.map(ControlFlow::Continue) }
        })
        .await
    }

    /// Like [`collect`](Self::collect), but the consumer can stop the
    /// collection early by returning `ControlFlow::Break`.
    ///
    /// The producer is dropped at its pending `emit` when the consumer
    /// breaks.
    ///
    /// # Errors
    ///
    /// The first error of the producer or of the consumer.
    pub async fn collect_while<C, CFut>(&self, consumer: C) -> Result<()>
    where
        C: FnMut(T) -> CFut + Send,
        CFut: Future<Output = Result<ControlFlow<()>>> + Send,
    {
        let handoff = Arc::new(Handoff::new());
        let producer = (self.producer)(Emitter::new(Arc::clone(&handoff)));
        Collect {
            handoff,
            producer: Some(producer),
            consumer,
            consuming: None,
        }
        .await
    }
}

/// Drives one collection: polls the producer until it offers a value, then
/// the consumer until that value is processed.
struct Collect<T, C, CFut> {
    handoff: Arc<Handoff<T>>,
    producer: Option<ProducerFuture>,
    consumer: C,
    consuming: Option<Pin<Box<CFut>>>,
}

impl<T, C, CFut> Unpin for Collect<T, C, CFut> {}

impl<T, C, CFut> Future for Collect<T, C, CFut>
where
    C: FnMut(T) -> CFut,
    CFut: Future<Output = Result<ControlFlow<()>>>,
{
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = &mut *self;
        loop {
            let consumed = this
                .consuming
                .as_mut()
                .map(|consuming| consuming.as_mut().poll(cx));
            match consumed {
                Some(Poll::Pending) => return Poll::Pending,
                Some(Poll::Ready(Ok(ControlFlow::Continue(())))) => this.consuming = None,
                Some(Poll::Ready(done)) => {
                    this.consuming = None;
                    this.producer = None;
                    return Poll::Ready(done.map(|_| ()));
                }
                None => {}
            }

            let Some(producer) = this.producer.as_mut() else {
                return Poll::Ready(Ok(()));
            };
            let polled = {
                let _driving = this.handoff.drive();
                producer.as_mut().poll(cx)
            };
            match polled {
                Poll::Ready(result) => {
                    this.producer = None;
                    return Poll::Ready(result);
                }
                Poll::Pending => match this.handoff.take() {
                    Some(value) => this.consuming = Some(Box::pin((this.consumer)(value))),
                    None => return Poll::Pending,
                },
            }
        }
    }
}
