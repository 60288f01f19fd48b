use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context};
use oxigraph::model::vocab::rdf;
use oxigraph::model::{GraphName, GraphNameRef, Literal, NamedNode, Quad, Term};
use oxigraph::sparql::{Query, QueryResults};
use oxigraph::store::Store;
use tracing::{debug, instrument};

use crate::entities::{Artifact, ArtifactInfo, Iri};

use super::model::{build_area_model, build_box_model};
use super::{vocab, IriFactory};

/// RDF-backed artifact storage. Every artifact gets a minted IRI; its content
/// triples live in a named graph under that IRI while the catalog entry
/// (type, parent, creator) lives in the default graph.
///
/// The handle is cheap to clone and safe to share between threads; clones
/// operate on the same store and draw IRIs from the same sequence.
#[derive(Clone)]
pub struct ArtifactRepository {
    store: Store,
    factory: IriFactory,
    seq: Arc<AtomicU64>,
}

impl ArtifactRepository {
    /// Opens a fresh in-memory repository.
    pub fn create_memory() -> anyhow::Result<Self> {
        let store = Store::new().context("can't create in-memory RDF store")?;
        Ok(Self {
            store,
            factory: IriFactory::default(),
            seq: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Opens (or creates) an on-disk repository. The IRI sequence resumes
    /// after the highest artifact number already in the catalog.
    pub fn create_native(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let store = Store::open(path.as_ref()).with_context(|| {
            format!("can't open RDF store at {}", path.as_ref().display())
        })?;
        let repo = Self {
            store,
            factory: IriFactory::default(),
            seq: Arc::new(AtomicU64::new(0)),
        };
        let last = repo.last_artifact_seq()?;
        repo.seq.store(last, Ordering::SeqCst);
        debug!(last_seq = last, "opened artifact repository");
        Ok(repo)
    }

    fn last_artifact_seq(&self) -> anyhow::Result<u64> {
        let artifact_type = vocab::core("Artifact");
        let mut last = 0u64;
        for quad in self.store.quads_for_pattern(
            None,
            Some(rdf::TYPE),
            Some((&artifact_type).into()),
            Some(GraphNameRef::DefaultGraph),
        ) {
            let quad = quad.context("can't scan the artifact catalog")?;
            if let oxigraph::model::Subject::NamedNode(node) = &quad.subject {
                if let Some(seq) = node
                    .as_str()
                    .rsplit("art")
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    last = last.max(seq);
                }
            }
        }
        Ok(last)
    }

    fn next_iri(&self) -> Iri {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.factory.create_artifact_iri(seq)
    }

    /// Stores the artifact and assigns it a repository IRI.
    #[instrument(skip_all, fields(artifact_type = artifact.artifact_type()))]
    pub fn add_artifact(&self, artifact: &mut Artifact) -> anyhow::Result<Iri> {
        let iri = self.next_iri();
        artifact.set_iri(iri.clone());

        let subject =
            NamedNode::new(iri.as_str()).with_context(|| format!("invalid artifact IRI: {iri}"))?;
        let graph: GraphName = subject.clone().into();

        let content = match artifact {
            Artifact::Page(page) => build_box_model(page, &iri, &self.factory)?,
            Artifact::AreaTree(tree) => build_area_model(tree, &iri, &self.factory)?,
        };
        for triple in content {
            self.store
                .insert(&triple.in_graph(graph.clone()))
                .context("can't store a content triple")?;
        }

        let mut catalog = vec![
            Quad::new(
                subject.clone(),
                rdf::TYPE,
                vocab::core("Artifact"),
                GraphName::DefaultGraph,
            ),
            Quad::new(
                subject.clone(),
                vocab::core("artifactType"),
                Literal::from(artifact.artifact_type()),
                GraphName::DefaultGraph,
            ),
        ];
        if let Some(parent) = artifact.parent_iri() {
            catalog.push(Quad::new(
                subject.clone(),
                vocab::core("hasParentArtifact"),
                NamedNode::new(parent.as_str())
                    .with_context(|| format!("invalid parent IRI: {parent}"))?,
                GraphName::DefaultGraph,
            ));
        }
        if let Some(creator) = artifact.creator() {
            catalog.push(Quad::new(
                subject.clone(),
                vocab::core("createdBy"),
                Literal::from(creator),
                GraphName::DefaultGraph,
            ));
        }
        if let Some(params) = artifact.creator_params() {
            catalog.push(Quad::new(
                subject.clone(),
                vocab::core("creatorParams"),
                Literal::from(params.to_string()),
                GraphName::DefaultGraph,
            ));
        }
        for quad in &catalog {
            self.store
                .insert(quad)
                .context("can't store a catalog triple")?;
        }

        debug!(iri = %iri, "stored artifact");
        Ok(iri)
    }

    /// Reads the catalog entry of a stored artifact.
    pub fn get_artifact_info(&self, iri: &Iri) -> anyhow::Result<ArtifactInfo> {
        let subject =
            NamedNode::new(iri.as_str()).with_context(|| format!("invalid artifact IRI: {iri}"))?;

        let mut artifact_type = None;
        let mut parent_iri = None;
        let mut creator = None;
        let mut creator_params = None;
        let mut found = false;
        for quad in self.store.quads_for_pattern(
            Some((&subject).into()),
            None,
            None,
            Some(GraphNameRef::DefaultGraph),
        ) {
            let quad = quad.context("can't read the artifact catalog")?;
            found = true;
            match quad.predicate.as_str() {
                p if p == vocab::core("artifactType").as_str() => {
                    artifact_type = literal_value(&quad.object);
                }
                p if p == vocab::core("hasParentArtifact").as_str() => {
                    if let Term::NamedNode(node) = &quad.object {
                        parent_iri = Some(Iri::new(node.as_str()));
                    }
                }
                p if p == vocab::core("createdBy").as_str() => {
                    creator = literal_value(&quad.object);
                }
                p if p == vocab::core("creatorParams").as_str() => {
                    creator_params = literal_value(&quad.object);
                }
                _ => {}
            }
        }
        if !found {
            bail!("no artifact stored under {iri}");
        }
        Ok(ArtifactInfo {
            iri: iri.clone(),
            parent_iri,
            artifact_type: artifact_type.unwrap_or_default(),
            creator,
            creator_params,
        })
    }

    /// Lists the IRIs of all stored artifacts, oldest first.
    pub fn artifact_iris(&self) -> anyhow::Result<Vec<Iri>> {
        let artifact_type = vocab::core("Artifact");
        let mut iris = Vec::new();
        for quad in self.store.quads_for_pattern(
            None,
            Some(rdf::TYPE),
            Some((&artifact_type).into()),
            Some(GraphNameRef::DefaultGraph),
        ) {
            let quad = quad.context("can't scan the artifact catalog")?;
            if let oxigraph::model::Subject::NamedNode(node) = &quad.subject {
                iris.push(Iri::new(node.as_str()));
            }
        }
        iris.sort_by_key(|iri| {
            iri.as_str()
                .rsplit("art")
                .next()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(u64::MAX)
        });
        Ok(iris)
    }

    /// Catalog entries of all stored artifacts, oldest first.
    pub fn artifact_infos(&self) -> anyhow::Result<Vec<ArtifactInfo>> {
        self.artifact_iris()?
            .iter()
            .map(|iri| self.get_artifact_info(iri))
            .collect()
    }

    /// Evaluates a SPARQL query over the whole repository. The default graph
    /// of the query is the union of all artifact graphs, so queries see the
    /// stored content without naming individual artifacts.
    pub fn query(&self, sparql: &str) -> anyhow::Result<QueryResults> {
        let mut query = Query::parse(sparql, None).context("malformed SPARQL query")?;
        query.dataset_mut().set_default_graph_as_union();
        self.store
            .query(query)
            .context("SPARQL evaluation failed")
    }

    /// Flushes pending writes. Call once when the repository is no longer
    /// needed; for on-disk stores this persists everything.
    pub fn disconnect(&self) -> anyhow::Result<()> {
        self.store.flush().context("can't flush the RDF store")
    }
}

fn literal_value(term: &Term) -> Option<String> {
    match term {
        Term::Literal(lit) => Some(lit.value().to_owned()),
        _ => None,
    }
}
