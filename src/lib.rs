//! Core of a desktop chat client for a local Ollama server.
//!
//! [`doc_processor`] turns an uploaded PDF, DOCX or text file into a single
//! UTF-8 string. [`session::InferenceSession`] lists models and streams
//! prompt replies from the server. The two never call each other; a front
//! end extracts a document once and attaches the result to a session.

pub mod doc_processor;
pub mod llm;
pub mod session;
pub mod settings;

pub use doc_processor::{extract, DocError, ExtractedDocument, FileType};
pub use llm::{LlmError, StreamChunk};
pub use session::{ConversationContext, InferenceSession, Reply};
pub use settings::Settings;
