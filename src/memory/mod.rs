//! 记忆层：对话记录、会话记忆（内存 / JSON 文件）、政策检索与分词

pub mod conversation;
pub mod persistence;
pub mod rag;
pub mod session;
pub mod tokenizer;

pub use conversation::{History, Message, Role, Turn};
pub use persistence::FileSessionMemory;
pub use rag::{Chunk, Chunker, ChunkingConfig, PolicyIndex, RetrievalBackend, SearchParams, Snippet};
pub use session::{InMemorySessionMemory, SessionMemory, SessionSnapshot, DEFAULT_HISTORY_LIMIT};
