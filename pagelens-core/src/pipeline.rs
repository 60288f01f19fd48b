use tracing::instrument;
use url::Url;

use crate::entities::{AreaTree, Page};
use crate::provider::TreeProvider;
use crate::segm::ops::AreaTreeOperator;
use crate::segm::SegmProvider;

/// Result of one pipeline run. The area tree is present only when a
/// segmenter was configured.
pub struct PipelineOutput {
    pub page: Page,
    pub area_tree: Option<AreaTree>,
}

/// Final pipeline stage: serializes, prints or persists the run result.
pub trait OutputWriter {
    fn write(&self, output: &PipelineOutput) -> anyhow::Result<()>;
}

/// A rendering pipeline assembled from interchangeable stages: one rendering
/// backend, an optional segmenter, area-tree operators applied in
/// registration order, and any number of output writers.
pub struct Pipeline {
    provider: Box<dyn TreeProvider>,
    segmenter: Option<Box<dyn SegmProvider>>,
    operators: Vec<Box<dyn AreaTreeOperator>>,
    writers: Vec<Box<dyn OutputWriter>>,
}

impl Pipeline {
    pub fn new(provider: Box<dyn TreeProvider>) -> Self {
        Self {
            provider,
            segmenter: None,
            operators: Vec::new(),
            writers: Vec::new(),
        }
    }

    pub fn with_segmenter(mut self, segmenter: Box<dyn SegmProvider>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_operator(mut self, operator: Box<dyn AreaTreeOperator>) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn with_writer(mut self, writer: Box<dyn OutputWriter>) -> Self {
        self.writers.push(writer);
        self
    }

    /// Runs the configured stages against one URL.
    #[instrument(skip(self), fields(provider = self.provider.id()))]
    pub fn run(&self, url: &Url) -> anyhow::Result<PipelineOutput> {
        let page = self.provider.render(url)?;
        let area_tree = match &self.segmenter {
            Some(segmenter) => {
                let mut tree = segmenter.create_area_tree(&page)?;
                for operator in &self.operators {
                    operator.apply(&mut tree);
                }
                Some(tree)
            }
            None => None,
        };
        let output = PipelineOutput { page, area_tree };
        for writer in &self.writers {
            writer.write(&output)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BBox, BoxNode};
    use crate::segm::ops::SortByPositionOperator;
    use crate::segm::BasicSegmProvider;

    struct StubProvider;

    impl TreeProvider for StubProvider {
        fn id(&self) -> &'static str {
            "test.stub"
        }

        fn render(&self, url: &Url) -> anyhow::Result<Page> {
            let mut root = BoxNode::new_element(0, "body", BBox::new(0.0, 0.0, 100.0, 100.0));
            // out of position order on purpose
            root.children.push(BoxNode::new_text(
                1,
                BBox::new(0.0, 50.0, 40.0, 62.0),
                "second",
                12.0,
                0.0,
            ));
            root.children.push(BoxNode::new_text(
                2,
                BBox::new(0.0, 0.0, 40.0, 12.0),
                "first",
                12.0,
                0.0,
            ));
            Ok(Page {
                source_url: url.to_string(),
                title: "stub".into(),
                width: 100.0,
                height: 100.0,
                screenshot: None,
                root,
                iri: None,
                parent_iri: None,
                creator: Some(self.id().into()),
                creator_params: None,
            })
        }
    }

    fn url() -> Url {
        Url::parse("http://example.com/").unwrap()
    }

    #[test]
    fn test_render_only_pipeline_has_no_tree() {
        let output = Pipeline::new(Box::new(StubProvider)).run(&url()).unwrap();
        assert_eq!(output.page.content_boxes().len(), 2);
        assert!(output.area_tree.is_none());
    }

    #[test]
    fn test_writers_see_the_finished_output() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct CountingWriter(Arc<AtomicUsize>);

        impl OutputWriter for CountingWriter {
            fn write(&self, output: &PipelineOutput) -> anyhow::Result<()> {
                assert!(output.area_tree.is_some());
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let writes = Arc::new(AtomicUsize::new(0));
        Pipeline::new(Box::new(StubProvider))
            .with_segmenter(Box::new(BasicSegmProvider::new(true)))
            .with_writer(Box::new(CountingWriter(writes.clone())))
            .with_writer(Box::new(CountingWriter(writes.clone())))
            .run(&url())
            .unwrap();
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_operators_run_after_segmentation() {
        let output = Pipeline::new(Box::new(StubProvider))
            .with_segmenter(Box::new(BasicSegmProvider::new(true)))
            .with_operator(Box::new(SortByPositionOperator))
            .run(&url())
            .unwrap();

        let tree = output.area_tree.unwrap();
        let names: Vec<_> = tree.root.children.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
