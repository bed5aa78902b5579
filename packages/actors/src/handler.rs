//! The seam between the queue and whatever turns an input file into output.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use executor::ToolExecutor;
use unmark_core::ProcessOutcome;

/// Future type for processors.
pub type ProcessFuture<'a> = Pin<Box<dyn Future<Output = ProcessOutcome> + Send + 'a>>;

/// Processes one image from `input` into `output`.
///
/// Implementations report every failure through the returned outcome.
pub trait ImageProcessor: Send + Sync + 'static {
    fn process<'a>(&'a self, input: &'a Path, output: &'a Path) -> ProcessFuture<'a>;
}

impl ImageProcessor for ToolExecutor {
    fn process<'a>(&'a self, input: &'a Path, output: &'a Path) -> ProcessFuture<'a> {
        Box::pin(self.run(input, output))
    }
}

/// Future returned by the closure behind a [`FnProcessor`].
pub type OwnedProcessFuture = Pin<Box<dyn Future<Output = ProcessOutcome> + Send>>;

/// A processor backed by a closure.
pub struct FnProcessor<F>
where
    F: Fn(PathBuf, PathBuf) -> OwnedProcessFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(PathBuf, PathBuf) -> OwnedProcessFuture + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> ImageProcessor for FnProcessor<F>
where
    F: Fn(PathBuf, PathBuf) -> OwnedProcessFuture + Send + Sync + 'static,
{
    fn process<'a>(&'a self, input: &'a Path, output: &'a Path) -> ProcessFuture<'a> {
        (self.handler)(input.to_path_buf(), output.to_path_buf())
    }
}
