//! Memory engine implementations for MindThread.

pub mod graph;
pub mod text;
pub mod vector;

pub use graph::InMemoryGraph;
pub use vector::{centroid, cosine_similarity};
