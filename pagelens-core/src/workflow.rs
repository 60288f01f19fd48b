use std::collections::HashMap;

use anyhow::{bail, Context};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::entities::Artifact;
use crate::provider::chrome::ChromeTreeProvider;
use crate::provider::pdf::PdfTreeProvider;
use crate::provider::{
    coerce_to_url, parse_url, TreeProvider, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
};
use crate::rdf::repository::ArtifactRepository;
use crate::segm::{BasicSegmProvider, GroupingSegmProvider, SegmProvider};

/// A registered processing step: takes a parameter map and an optional input
/// artifact, produces a new artifact.
pub trait ArtifactService: Send + Sync {
    fn id(&self) -> &'static str;

    fn produce(&self, params: &Map<String, Value>, input: Option<&Artifact>)
        -> anyhow::Result<Artifact>;
}

/// Registry of artifact services. When a repository is attached, every
/// produced artifact is stored and gets its IRI assigned before it is
/// returned to the caller.
#[derive(Default)]
pub struct ServiceManager {
    services: HashMap<&'static str, Box<dyn ArtifactService>>,
    repository: Option<ArtifactRepository>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with the built-in renderers and segmenters registered.
    pub fn with_default_services() -> Self {
        let mut manager = Self::new();
        manager.register(Box::new(ChromeRenderService));
        manager.register(Box::new(PdfRenderService));
        manager.register(Box::new(BasicSegmService));
        manager.register(Box::new(GroupingSegmService));
        manager
    }

    pub fn register(&mut self, service: Box<dyn ArtifactService>) {
        self.services.insert(service.id(), service);
    }

    pub fn set_artifact_repository(&mut self, repository: ArtifactRepository) {
        self.repository = Some(repository);
    }

    pub fn repository(&self) -> Option<&ArtifactRepository> {
        self.repository.as_ref()
    }

    pub fn find_service(&self, id: &str) -> Option<&dyn ArtifactService> {
        self.services.get(id).map(Box::as_ref)
    }

    pub fn service_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.services.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Invokes a service by ID and stores the result when a repository is
    /// attached.
    #[instrument(skip(self, params, input))]
    pub fn apply_artifact_service(
        &self,
        id: &str,
        params: &Map<String, Value>,
        input: Option<&Artifact>,
    ) -> anyhow::Result<Artifact> {
        let Some(service) = self.find_service(id) else {
            bail!("no such artifact service: {id}");
        };
        let mut artifact = service.produce(params, input)?;
        if let Some(repository) = &self.repository {
            let iri = repository.add_artifact(&mut artifact)?;
            debug!(%iri, "service output stored");
        }
        Ok(artifact)
    }
}

fn str_param<'a>(params: &'a Map<String, Value>, name: &str) -> anyhow::Result<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .with_context(|| format!("missing required string parameter '{name}'"))
}

fn u32_param(params: &Map<String, Value>, name: &str, default: u32) -> u32 {
    params
        .get(name)
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(default)
}

fn f32_param(params: &Map<String, Value>, name: &str, default: f32) -> f32 {
    params
        .get(name)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

fn bool_param(params: &Map<String, Value>, name: &str, default: bool) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn input_page<'a>(input: Option<&'a Artifact>) -> anyhow::Result<&'a crate::entities::Page> {
    input
        .and_then(Artifact::as_page)
        .context("this service requires a page artifact as its input")
}

/// Browser rendering behind the service interface. Parameters: `url`
/// (required), `width`, `height`, `screenshot`.
pub struct ChromeRenderService;

impl ArtifactService for ChromeRenderService {
    fn id(&self) -> &'static str {
        "pagelens.chrome-render"
    }

    fn produce(
        &self,
        params: &Map<String, Value>,
        _input: Option<&Artifact>,
    ) -> anyhow::Result<Artifact> {
        let url = parse_url(str_param(params, "url")?)?;
        let width = u32_param(params, "width", DEFAULT_VIEWPORT_WIDTH);
        let height = u32_param(params, "height", DEFAULT_VIEWPORT_HEIGHT);
        let screenshot = bool_param(params, "screenshot", true);
        let provider = ChromeTreeProvider::new(width, height).with_screenshot(screenshot);
        Ok(Artifact::Page(provider.render(&url)?))
    }
}

/// PDF rendering behind the service interface. Parameters: `url` (required,
/// bare paths are coerced to `file://`), `zoom`, `screenshot`.
pub struct PdfRenderService;

impl ArtifactService for PdfRenderService {
    fn id(&self) -> &'static str {
        "pagelens.pdf-render"
    }

    fn produce(
        &self,
        params: &Map<String, Value>,
        _input: Option<&Artifact>,
    ) -> anyhow::Result<Artifact> {
        let url = parse_url(&coerce_to_url(str_param(params, "url")?))?;
        let zoom = f32_param(params, "zoom", 1.0);
        let screenshot = bool_param(params, "screenshot", true);
        let provider = PdfTreeProvider::new(zoom).with_screenshot(screenshot);
        Ok(Artifact::Page(provider.render(&url)?))
    }
}

/// Basic segmentation behind the service interface. Parameter:
/// `preserveAuxAreas`.
pub struct BasicSegmService;

impl ArtifactService for BasicSegmService {
    fn id(&self) -> &'static str {
        "pagelens.basic-areas"
    }

    fn produce(
        &self,
        params: &Map<String, Value>,
        input: Option<&Artifact>,
    ) -> anyhow::Result<Artifact> {
        let page = input_page(input)?;
        let provider = BasicSegmProvider::new(bool_param(params, "preserveAuxAreas", true));
        Ok(Artifact::AreaTree(provider.create_area_tree(page)?))
    }
}

/// Proximity grouping behind the service interface. Parameter: `proximity`.
pub struct GroupingSegmService;

impl ArtifactService for GroupingSegmService {
    fn id(&self) -> &'static str {
        "pagelens.grouping"
    }

    fn produce(
        &self,
        params: &Map<String, Value>,
        input: Option<&Artifact>,
    ) -> anyhow::Result<Artifact> {
        let page = input_page(input)?;
        let provider = GroupingSegmProvider::new(f32_param(params, "proximity", 1.0));
        Ok(Artifact::AreaTree(provider.create_area_tree(page)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{BBox, BoxNode, Page};

    struct StubRenderService;

    impl ArtifactService for StubRenderService {
        fn id(&self) -> &'static str {
            "test.render"
        }

        fn produce(
            &self,
            params: &Map<String, Value>,
            _input: Option<&Artifact>,
        ) -> anyhow::Result<Artifact> {
            let url = str_param(params, "url")?;
            let mut root = BoxNode::new_element(0, "body", BBox::new(0.0, 0.0, 100.0, 50.0));
            root.children.push(BoxNode::new_text(
                1,
                BBox::new(0.0, 0.0, 40.0, 12.0),
                "stub",
                12.0,
                0.0,
            ));
            Ok(Artifact::Page(Page {
                source_url: url.into(),
                title: "stub".into(),
                width: 100.0,
                height: 50.0,
                screenshot: None,
                root,
                iri: None,
                parent_iri: None,
                creator: Some(self.id().into()),
                creator_params: None,
            }))
        }
    }

    fn params(json: Value) -> Map<String, Value> {
        json.as_object().unwrap().clone()
    }

    #[test]
    fn test_unknown_service_is_an_error() {
        let manager = ServiceManager::new();
        let err = manager
            .apply_artifact_service("nope", &Map::new(), None)
            .unwrap_err();
        assert!(err.to_string().contains("no such artifact service"));
    }

    #[test]
    fn test_apply_stores_result_when_repository_attached() {
        let repo = ArtifactRepository::create_memory().unwrap();
        let mut manager = ServiceManager::new();
        manager.register(Box::new(StubRenderService));
        manager.set_artifact_repository(repo.clone());

        let artifact = manager
            .apply_artifact_service(
                "test.render",
                &params(serde_json::json!({ "url": "http://example.com/" })),
                None,
            )
            .unwrap();

        let iri = artifact.iri().expect("IRI assigned on store");
        assert_eq!(repo.get_artifact_info(iri).unwrap().artifact_type, "Page");
    }

    #[test]
    fn test_segmentation_chains_on_render_output() {
        let mut manager = ServiceManager::with_default_services();
        manager.register(Box::new(StubRenderService));

        let page = manager
            .apply_artifact_service(
                "test.render",
                &params(serde_json::json!({ "url": "http://example.com/" })),
                None,
            )
            .unwrap();
        let tree = manager
            .apply_artifact_service(
                "pagelens.basic-areas",
                &params(serde_json::json!({ "preserveAuxAreas": false })),
                Some(&page),
            )
            .unwrap();

        let tree = tree.as_area_tree().unwrap();
        assert_eq!(tree.root.leaves().len(), 1);
        assert_eq!(tree.creator.as_deref(), Some("pagelens.basic-areas"));
    }

    #[test]
    fn test_segmentation_rejects_non_page_input() {
        let manager = ServiceManager::with_default_services();
        let err = manager
            .apply_artifact_service("pagelens.grouping", &Map::new(), None)
            .unwrap_err();
        assert!(err.to_string().contains("requires a page artifact"));
    }

    #[test]
    fn test_default_services_registered() {
        let manager = ServiceManager::with_default_services();
        assert_eq!(
            manager.service_ids(),
            vec![
                "pagelens.basic-areas",
                "pagelens.chrome-render",
                "pagelens.grouping",
                "pagelens.pdf-render",
            ]
        );
    }
}
