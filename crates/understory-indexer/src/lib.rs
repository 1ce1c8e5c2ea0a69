//! Relationship extraction: parsing, bounded tree walks, module resolution

pub mod extractor;
pub mod languages;
pub mod parser_pool;
pub mod resolver;


pub use extractor::{
    DuplicatePolicy, ExtractError, Extraction, ExtractionLimits, ExtractionStats, Extractor,
    LanguageExtractor,
};
pub use parser_pool::{FileType, ParseRequest, ParseResult, ParserPool, create_parser_pool};
pub use resolver::{ModuleResolver, Resolution};
