//! Source implementations and factories

mod backend_source;

pub use backend_source::BackendSource;

use crate::Result;
use crate::backend::{BackendCallback, PositionBackend};
use crate::source::{PositionSource, SourceFactory, SourceListener};
use crate::types::SourceRole;

/// Factory building a [`BackendSource`] from a backend constructor.
///
/// The constructor runs once per `create`; a failing constructor makes the
/// slot unavailable.
pub struct BackendFactory<F> {
    make: F,
}

/// Wrap a backend constructor as a [`SourceFactory`].
///
/// ```
/// use locus::sources::from_backend;
/// # use locus::backend::{BackendCallback, BackendFailure, PositionBackend};
/// # use locus::types::ConnectionState;
/// # struct Gps;
/// # impl PositionBackend for Gps {
/// #     fn name(&self) -> &str { "gps" }
/// #     fn start(&mut self, _: BackendCallback) -> ConnectionState { ConnectionState::Connected }
/// #     fn request_continuous_low_power_updates(&mut self) -> Result<(), BackendFailure> { Ok(()) }
/// #     fn request_one_update(&mut self) -> Result<(), BackendFailure> { Ok(()) }
/// #     fn stop(&mut self) -> Result<(), BackendFailure> { Ok(()) }
/// # }
/// let factory = from_backend(|| Ok(Gps));
/// # let _ = factory;
/// ```
pub fn from_backend<B, F>(make: F) -> BackendFactory<F>
where
    B: PositionBackend,
    F: FnMut() -> Result<B> + Send,
{
    BackendFactory { make }
}

impl<B, F> SourceFactory for BackendFactory<F>
where
    B: PositionBackend,
    F: FnMut() -> Result<B> + Send,
{
    fn create(
        &mut self,
        role: SourceRole,
        listener: Box<dyn SourceListener>,
        callback: BackendCallback,
    ) -> Result<Box<dyn PositionSource>> {
        let backend = (self.make)()?;
        Ok(Box::new(BackendSource::new(role, backend, Some(listener), callback)))
    }
}
