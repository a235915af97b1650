//! Graph write side of the sink

pub mod cypher;

pub use cypher::{json_to_bolt, CypherTemplateWriter, Neo4jWriteAvailability};
