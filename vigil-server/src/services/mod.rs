//! External integrations and storage services

pub mod classifier;
pub mod groq_client;
pub mod media_store;

pub use classifier::{parse_verdict, ClassifierError, ThreatClassifier};
pub use groq_client::{GroqClassifier, GroqConfig};
pub use media_store::MediaStore;
