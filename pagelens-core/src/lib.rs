//! Document-layout analysis toolkit: renders web pages and PDF documents
//! into box trees, segments them into visual areas, and stores the results
//! as RDF artifacts that can be queried with SPARQL.

pub mod batch;
pub mod entities;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod rdf;
pub mod segm;
pub mod workflow;
