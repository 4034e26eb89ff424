//! Streaming batch API: emit pipeline runs as each source completes.
//!
//! Unlike [`crate::recognize::preprocess_batch`], which returns only after
//! every source finishes, [`preprocess_stream`] yields each source's result
//! as soon as its last stage is stored. Results arrive in completion order;
//! match on `PipelineRun::source` / `SourceError::source_path` if order
//! matters.

use crate::config::PrepConfig;
use crate::error::SourceError;
use crate::output::PipelineRun;
use crate::pipeline::input::ResolvedSource;
use crate::pipeline::PipelineDefinition;
use crate::recognize::run_one;
use crate::transform::StageParams;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-source results.
pub type RunStream = Pin<Box<dyn Stream<Item = Result<PipelineRun, SourceError>> + Send>>;

/// Run `pipeline` over `sources`, `config.concurrency` at a time, streaming
/// each source's outcome.
///
/// Per-source failures are yielded as `Err(SourceError)` items and do not
/// end the stream.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocrprep::{preprocess_stream, PipelineDefinition, PrepConfig, StageParams};
/// use edgequake_ocrprep::pipeline::input::ResolvedSource;
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PrepConfig::builder().image_root("./images").build()?;
/// let sources = vec![ResolvedSource::from_path("./images/a.png")?];
/// let pipeline = PipelineDefinition::builtin("preprocess-for-ocr")?;
/// let mut runs = preprocess_stream(sources, &pipeline, &StageParams::default(), &config);
/// while let Some(run) = runs.next().await {
///     match run {
///         Ok(r) => println!("{}", r.final_path.display()),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn preprocess_stream(
    sources: Vec<ResolvedSource>,
    pipeline: &PipelineDefinition,
    params: &StageParams,
    config: &PrepConfig,
) -> RunStream {
    let definition = pipeline.with_params(params);
    info!(
        "Streaming {} over {} sources",
        definition,
        sources.len()
    );

    let concurrency = config.concurrency.max(1);
    let config = config.clone();

    let s = stream::iter(sources.into_iter().map(move |src| {
        let definition = definition.clone();
        let cfg = config.clone();
        async move {
            let item = run_one(&definition, &src, &cfg).await;
            match (item.run, item.error) {
                (Some(run), _) => Ok(run),
                (None, Some(err)) => Err(err),
                (None, None) => Err(SourceError {
                    source_path: item.source,
                    kind: crate::error::ErrorKind::UpstreamFailure,
                    stage: None,
                    detail: "run produced neither a result nor an error".into(),
                }),
            }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
