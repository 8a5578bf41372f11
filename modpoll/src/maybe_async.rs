enum Value<T> {
    Ready(T),
    Async(core::pin::Pin<Box<dyn core::future::Future<Output = T> + Send + 'static>>),
}

/// Represents a result that may be computed synchronously or asynchronously by user code.
///
/// Listeners that only record or print an event return a ready value and avoid the heap
/// allocation of a boxed future. Listeners that need to await something, such as forwarding
/// the event over a channel, return an asynchronous one.
#[must_use]
pub struct MaybeAsync<T> {
    inner: Value<T>,
}

impl<T> MaybeAsync<T> {
    /// Retrieve the value, which might be available immediately or require awaiting
    pub async fn get(self) -> T {
        match self.inner {
            Value::Ready(x) => x,
            Value::Async(x) => x.await,
        }
    }

    /// Construct a new `MaybeAsync` from an already available result
    pub fn ready(result: T) -> Self {
        MaybeAsync {
            inner: Value::Ready(result),
        }
    }

    /// Construct a new `MaybeAsync` from a future which yields the value eventually
    pub fn asynchronous<F>(result: F) -> Self
    where
        F: core::future::Future<Output = T> + Send + 'static,
    {
        MaybeAsync {
            inner: Value::Async(Box::pin(result)),
        }
    }
}
