//! LLM 层：推理引擎抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, GEMINI_FLASH, GEMINI_OPENAI_BASE_URL};
pub use traits::{LlmClient, LlmError, LlmResponse};
