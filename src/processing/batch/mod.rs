mod assembler;
mod discovery;
mod processor;

pub use assembler::{ArchiveAssembly, CompletedArchive};
pub use discovery::{Discovery, Source, SourceKind, discover};
pub use processor::BatchDriver;
