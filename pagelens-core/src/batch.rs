use std::sync::Arc;

use anyhow::anyhow;
use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use crate::entities::{Artifact, Iri};
use crate::provider::{parse_url, TreeProvider};
use crate::rdf::repository::ArtifactRepository;

/// Number of pages rendered concurrently.
pub const NUM_WORKERS: usize = 8;

/// Result of one batch item, reported back over the outcome stream. A failed
/// item carries its error; it never aborts the rest of the batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub url: String,
    pub result: anyhow::Result<Iri>,
}

/// Renders a list of URLs concurrently and stores every successfully rendered
/// page in the artifact repository.
pub struct BatchRenderer {
    provider: Arc<dyn TreeProvider>,
    repository: ArtifactRepository,
    workers: usize,
}

impl BatchRenderer {
    pub fn new(provider: Arc<dyn TreeProvider>, repository: ArtifactRepository) -> Self {
        Self {
            provider,
            repository,
            workers: NUM_WORKERS,
        }
    }

    #[cfg(test)]
    fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Runs the whole batch. Rendering happens on the blocking pool with at
    /// most `workers` pages in flight; outcomes arrive in completion order.
    /// The repository is disconnected exactly once, after the last outcome.
    pub async fn run(&self, urls: Vec<String>) -> anyhow::Result<Vec<BatchOutcome>> {
        self.run_with_progress(urls, |_| {}).await
    }

    /// Like [`run`](Self::run), but invokes `on_outcome` as each item
    /// finishes.
    #[instrument(skip_all, fields(urls = urls.len(), workers = self.workers))]
    pub async fn run_with_progress<F>(
        &self,
        urls: Vec<String>,
        mut on_outcome: F,
    ) -> anyhow::Result<Vec<BatchOutcome>>
    where
        F: FnMut(&BatchOutcome),
    {
        let mut tasks = stream::iter(urls)
            .map(|url| {
                let provider = Arc::clone(&self.provider);
                let repository = self.repository.clone();
                async move {
                    let task_url = url.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        render_and_store(provider.as_ref(), &repository, &task_url)
                    })
                    .await
                    .unwrap_or_else(|e| Err(anyhow!("render task panicked: {e}")));
                    match &result {
                        Ok(iri) => info!(%url, %iri, "page stored"),
                        Err(e) => warn!(%url, error = %e, "page failed"),
                    }
                    BatchOutcome { url, result }
                }
            })
            .buffer_unordered(self.workers);

        let mut outcomes = Vec::new();
        while let Some(outcome) = tasks.next().await {
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        self.repository.disconnect()?;
        Ok(outcomes)
    }
}

fn render_and_store(
    provider: &dyn TreeProvider,
    repository: &ArtifactRepository,
    url: &str,
) -> anyhow::Result<Iri> {
    let url = parse_url(url)?;
    let page = provider.render(&url)?;
    let mut artifact = Artifact::Page(page);
    repository.add_artifact(&mut artifact)
}

/// Parses a URL-list file: one URL per line, blank lines ignored.
pub fn parse_url_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BBox, BoxNode, Page};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    struct StubProvider {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay_ms: u64,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay_ms: 0,
            }
        }

        fn with_delay(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                ..Self::new()
            }
        }
    }

    impl TreeProvider for StubProvider {
        fn id(&self) -> &'static str {
            "test.stub"
        }

        fn render(&self, url: &Url) -> anyhow::Result<Page> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            if self.delay_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(self.delay_ms));
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if url.as_str().contains("broken") {
                anyhow::bail!("render failed for {url}");
            }
            let mut root = BoxNode::new_element(0, "body", BBox::new(0.0, 0.0, 100.0, 50.0));
            root.children.push(BoxNode::new_text(
                1,
                BBox::new(0.0, 0.0, 40.0, 12.0),
                "content",
                12.0,
                0.0,
            ));
            Ok(Page {
                source_url: url.to_string(),
                title: "stub".into(),
                width: 100.0,
                height: 50.0,
                screenshot: None,
                root,
                iri: None,
                parent_iri: None,
                creator: Some(self.id().into()),
                creator_params: None,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_stores_every_renderable_page() {
        let repo = ArtifactRepository::create_memory().unwrap();
        let renderer = BatchRenderer::new(Arc::new(StubProvider::new()), repo.clone());
        let urls: Vec<String> = (0..5).map(|i| format!("http://example.com/p{i}")).collect();

        let outcomes = renderer.run(urls).await.unwrap();
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(repo.artifact_iris().unwrap().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_items_do_not_abort_the_batch() {
        let repo = ArtifactRepository::create_memory().unwrap();
        let renderer = BatchRenderer::new(Arc::new(StubProvider::new()), repo.clone());
        let urls = vec![
            "http://example.com/ok1".to_owned(),
            "http://example.com/broken".to_owned(),
            "not a url at all".to_owned(),
            "http://example.com/ok2".to_owned(),
        ];

        let outcomes = renderer.run(urls).await.unwrap();
        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 2);
        assert_eq!(repo.artifact_iris().unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_pages_stay_within_worker_bound() {
        let provider = Arc::new(StubProvider::with_delay(20));
        let repo = ArtifactRepository::create_memory().unwrap();
        let renderer = BatchRenderer::new(provider.clone(), repo).with_workers(3);
        let urls: Vec<String> = (0..12).map(|i| format!("http://example.com/p{i}")).collect();

        renderer.run(urls).await.unwrap();
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_parse_url_list_skips_blank_lines() {
        let list = "http://a.example/\n\n  \nhttp://b.example/\n";
        assert_eq!(
            parse_url_list(list),
            vec!["http://a.example/".to_owned(), "http://b.example/".to_owned()]
        );
    }
}
