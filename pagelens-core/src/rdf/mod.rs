use crate::entities::Iri;

pub mod model;
pub mod repository;

pub use oxigraph::model::Term;
pub use oxigraph::sparql::QueryResults;

/// Ontology terms used by the artifact model.
pub mod vocab {
    use oxigraph::model::NamedNode;

    /// Box-tree (rendering) ontology.
    pub const RENDER_NS: &str = "http://pagelens.dev/ontology/render#";
    /// Area-tree (segmentation) ontology.
    pub const SEGM_NS: &str = "http://pagelens.dev/ontology/segmentation#";
    /// Artifact catalog terms.
    pub const CORE_NS: &str = "http://pagelens.dev/ontology/core#";
    /// Base of all minted resource IRIs.
    pub const RESOURCE_NS: &str = "http://pagelens.dev/resource/";

    pub fn render(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("{RENDER_NS}{name}"))
    }

    pub fn segm(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("{SEGM_NS}{name}"))
    }

    pub fn core(name: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("{CORE_NS}{name}"))
    }
}

/// Mints IRIs for artifacts and for the boxes/areas inside them.
#[derive(Debug, Clone)]
pub struct IriFactory {
    base: String,
}

impl Default for IriFactory {
    fn default() -> Self {
        Self {
            base: vocab::RESOURCE_NS.to_owned(),
        }
    }
}

impl IriFactory {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    pub fn create_artifact_iri(&self, seq: u64) -> Iri {
        Iri::new(format!("{}art{seq}", self.base))
    }

    pub fn create_box_iri(&self, artifact: &Iri, order: usize) -> Iri {
        Iri::new(format!("{artifact}#box{order}"))
    }

    pub fn create_area_iri(&self, artifact: &Iri, order: usize) -> Iri {
        Iri::new(format!("{artifact}#area{order}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_iris_are_sequential() {
        let factory = IriFactory::default();
        assert_eq!(
            factory.create_artifact_iri(1).as_str(),
            "http://pagelens.dev/resource/art1"
        );
        assert_eq!(
            factory.create_artifact_iri(42).as_str(),
            "http://pagelens.dev/resource/art42"
        );
    }

    #[test]
    fn test_member_iris_scoped_under_artifact() {
        let factory = IriFactory::default();
        let art = factory.create_artifact_iri(1);
        assert_eq!(
            factory.create_box_iri(&art, 3).as_str(),
            "http://pagelens.dev/resource/art1#box3"
        );
        assert_eq!(
            factory.create_area_iri(&art, 0).as_str(),
            "http://pagelens.dev/resource/art1#area0"
        );
    }
}
