pub mod document;
pub mod extractor;
pub mod handlers;
pub mod normalizer;
pub mod prompts;
pub mod quality;
