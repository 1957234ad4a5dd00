use std::future::Future;
use std::pin::Pin;

use crate::envelope::{EventEnvelope, ResponseEnvelope};
use crate::error::InvokeError;

/// The single operation front ends call to run the function once.
///
/// Implementations suspend the calling task until the function has reported
/// a result for this particular request.
pub trait Invoker: Send + Sync {
    fn invoke<'a>(
        &'a self,
        event: EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<ResponseEnvelope, InvokeError>> + Send + 'a>>;
}
