mod mock;
mod openai;

pub use mock::MockLlmService;
pub use openai::OpenAiLlmService;
