use crate::{Error, Result, TRACING_TARGET};

use std::future::Future;
use tokio::runtime::Runtime;
use tokio::task::LocalSet;

/// Drives `future` to completion on a fresh current-thread runtime.
///
/// The future runs inside a [`LocalSet`], so programs may spawn `!Send`
/// tasks with `tokio::task::spawn_local`.
pub(crate) fn block_on<F>(future: F) -> Result
where
    F: Future<Output = Result>,
{
    let (tokio, local) = init()?;
    with(&tokio, &local, future)
}

fn init() -> Result<(Runtime, LocalSet)> {
    let mut builder = tokio::runtime::Builder::new_current_thread();

    #[cfg(tokio_unstable)]
    builder.unhandled_panic(tokio::runtime::UnhandledPanic::ShutdownRuntime);

    let tokio = builder.enable_time().build().map_err(|error| {
        tracing::error!(target: TRACING_TARGET, %error, "failed to build runtime");
        Error::Io
    })?;

    Ok((tokio, LocalSet::new()))
}

fn with<F: Future>(tokio: &Runtime, local: &LocalSet, future: F) -> F::Output {
    tokio.block_on(local.run_until(future))
}
