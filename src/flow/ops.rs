//! Intermediate operators.
//!
//! Each operator returns a new cold flow that collects its upstream once per
//! downstream collection. Operators do not buffer: a value travels all the
//! way to the terminal consumer before the upstream producer resumes.

use super::{Emitter, Flow};
use crate::error::Result;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

impl<T: Send + 'static> Flow<T> {
    /// Transforms every value with `f`.
    pub fn map<U, F>(&self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Flow::new(move |emitter: Emitter<U>| {
            let upstream = upstream.clone();
            let f = Arc::clone(&f);
            async move {
                upstream
                    .collect(move |value| {
                        let mapped = (*f)(value);
                        let emitter = emitter.clone();
                        async move { emitter.emit(mapped).await }
                    })
                    .await
            }
        })
    }

    /// Transforms every value with the async function `f`.
    ///
    /// An error from `f` ends the flow.
    pub fn then<U, F, Fut>(&self, f: F) -> Flow<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Flow::new(move |emitter: Emitter<U>| {
            let upstream = upstream.clone();
            let f = Arc::clone(&f);
            async move {
                upstream
                    .collect(move |value| {
                        let mapped = (*f)(value);
                        let emitter = emitter.clone();
                        async move { emitter.emit(mapped.await?).await }
                    })
                    .await
            }
        })
    }

    /// Passes on only the values for which `predicate` returns true.
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let predicate = Arc::new(predicate);
        Self::new(move |emitter: Emitter<T>| {
            let upstream = upstream.clone();
            let predicate = Arc::clone(&predicate);
            async move {
                upstream
                    .collect(move |value| {
                        let keep = (*predicate)(&value).then_some(value);
                        let emitter = emitter.clone();
                        async move {
                            match keep {
                                Some(value) => emitter.emit(value).await,
                                None => Ok(()),
                            }
                        }
                    })
                    .await
            }
        })
    }

    /// Passes on the first `n` values, then stops the upstream producer.
    pub fn take(&self, n: usize) -> Self {
        let upstream = self.clone();
        Self::new(move |emitter: Emitter<T>| {
            let upstream = upstream.clone();
            async move {
                if n == 0 {
                    return Ok(());
                }
                let mut remaining = n;
                upstream
                    .collect_while(move |value| {
                        remaining -= 1;
                        let last = remaining == 0;
                        let emitter = emitter.clone();
                        async move {
                            emitter.emit(value).await?;
                            Ok(if last {
                                ControlFlow::Break(())
                            } else {
                                ControlFlow::Continue(())
                            })
                        }
                    })
                    .await
            }
        })
    }

    /// Calls `f` on every value before passing it on.
    pub fn on_each<F>(&self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Self::new(move |emitter: Emitter<T>| {
            let upstream = upstream.clone();
            let f = Arc::clone(&f);
            async move {
                upstream
                    .collect(move |value| {
                        (*f)(&value);
                        let emitter = emitter.clone();
                        async move { emitter.emit(value).await }
                    })
                    .await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::flow::{flow, flow_of, Flow};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures_lite::future::block_on(f)
    }

    #[test]
    fn map_filter_chain() {
        let values = block_on(
            flow_of(1..=10)
                .filter(|v| v % 2 == 0)
                .map(|v| v * 10)
                .to_vec(),
        )
        .expect("collected");
        assert_eq!(values, vec![20, 40, 60, 80, 100]);
    }

    #[test]
    fn then_awaits_each_value() {
        let values = block_on(
            flow_of(vec![3_u64, 1, 2])
                .then(|v| async move {
                    crate::time::sleep(Duration::from_millis(v)).await;
                    Ok(v.to_string())
                })
                .to_vec(),
        )
        .expect("collected");
        assert_eq!(values, vec!["3", "1", "2"]);
    }

    #[test]
    fn then_error_ends_flow() {
        let err = block_on(
            flow_of(0..5)
                .then(|v| async move {
                    if v == 3 {
                        Err(Error::user("three"))
                    } else {
                        Ok(v)
                    }
                })
                .to_vec(),
        )
        .expect_err("failed");
        assert_eq!(err.message(), Some("three"));
    }

    #[test]
    fn take_stops_the_producer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let endless: Flow<usize> = flow(move |emitter| {
            let counter = Arc::clone(&counter);
            async move {
                let mut i = 0;
                loop {
                    counter.fetch_add(1, Ordering::SeqCst);
                    emitter.emit(i).await?;
                    i += 1;
                }
            }
        });
        let values = block_on(endless.take(3).to_vec()).expect("collected");
        assert_eq!(values, vec![0, 1, 2]);
        assert_eq!(produced.load(Ordering::SeqCst), 3);
        assert!(block_on(endless.take(0).to_vec()).expect("empty").is_empty());
        assert_eq!(produced.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn on_each_sees_values_before_downstream() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let total = block_on(
            flow_of(vec![1, 2, 3])
                .on_each(move |v| sink.lock().push(*v))
                .fold(0, |acc, v| acc + v),
        )
        .expect("folded");
        assert_eq!(total, 6);
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }
}
