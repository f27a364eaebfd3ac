//! Using a [`CommandRunner`] as a step in a file pipeline.

use std::future::Future;
use std::pin::Pin;

use futures::stream::{Stream, StreamExt};

use crate::file::File;
use crate::runner::{CommandRunner, FileStream};
use crate::Result;

/// Boxed future type alias used by [`Transform`] to keep the trait dyn-compatible.
pub type TransformFuture<'a> = Pin<Box<dyn Future<Output = Result<File>> + Send + 'a>>;

/// A pipeline stage turning one file into another.
pub trait Transform: Send + Sync {
    fn transform(&self, file: File) -> TransformFuture<'_>;
}

/// Runs the command once per file, with the file in template scope and its
/// contents on stdin. The output file replaces the input.
#[derive(Debug, Clone)]
pub struct PipelineStep {
    runner: CommandRunner,
}

impl PipelineStep {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Transform every file of `input`, in order.
    ///
    /// A failed item shows up as an `Err` in its position and the remaining
    /// files are still processed; stopping early is up to the consumer.
    pub fn pipe<S>(self, input: S) -> FileStream
    where
        S: Stream<Item = File> + Send + 'static,
    {
        input
            .then(move |file| {
                let step = self.clone();
                async move { step.transform(file).await }
            })
            .boxed()
    }
}

impl Transform for PipelineStep {
    fn transform(&self, file: File) -> TransformFuture<'_> {
        let path = file.path.clone();
        Box::pin(async move {
            let result = self.runner.run(Some(file)).await;
            if let Err(err) = &result {
                tracing::debug!(path = %path.display(), error = %err, "pipeline item failed");
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Contents, Error, Options, TemplateError, Verbosity};
    use futures::stream;

    fn step(template: &str) -> PipelineStep {
        CommandRunner::new(template, Options::default().with_verbosity(Verbosity::Quiet))
            .unwrap()
            .as_pipeline_step()
    }

    #[tokio::test]
    async fn transform_keeps_path_and_replaces_contents() {
        let file = File::new("/a/b.txt", "ignored");
        let out = step("echo <%= file.path %>").transform(file).await.unwrap();
        assert_eq!(out.path, std::path::PathBuf::from("/a/b.txt"));
        assert_eq!(out.contents.into_bytes().await.unwrap(), b"/a/b.txt\n");
    }

    #[tokio::test]
    async fn contents_are_fed_to_stdin() {
        let file = File::new("/x/upper.txt", "shout\n");
        let out = step("tr a-z A-Z").transform(file).await.unwrap();
        assert_eq!(out.contents.into_bytes().await.unwrap(), b"SHOUT\n");
    }

    #[tokio::test]
    async fn streamed_input_gives_streamed_output() {
        let file = File::new("/x/s.txt", Contents::stream(std::io::Cursor::new(b"abc".to_vec())));
        let out = step("cat").transform(file).await.unwrap();
        assert!(out.contents.is_streamed());
        assert_eq!(out.contents.into_bytes().await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn errors_fail_only_their_item() {
        let files = vec![
            File::new("/ok/one.txt", ""),
            File::new("/fail/two.txt", ""),
            File::new("/ok/three.txt", ""),
        ];
        let results: Vec<_> = step("case <%= file.dirname %> in /fail) exit 1;; esac; echo <%= file.basename %>")
            .pipe(stream::iter(files))
            .collect()
            .await;

        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.basename(), "one.txt");
        assert!(matches!(results[1], Err(Error::CommandFailed { code: Some(1), .. })));
        assert_eq!(results[2].as_ref().unwrap().basename(), "three.txt");
    }

    #[tokio::test]
    async fn undefined_field_is_a_template_error_for_that_item() {
        let results: Vec<_> = step("echo <%= data.missing %>")
            .pipe(stream::iter(vec![File::new("/a", ""), File::new("/b", "")]))
            .collect()
            .await;
        assert_eq!(results.len(), 2);
        for result in results {
            assert!(matches!(
                result,
                Err(Error::Template(TemplateError::MissingData(ref key))) if key == "missing"
            ));
        }
    }
}
