mod builtin;
mod error;
mod manager;
mod template;

pub use error::PmError;
pub use manager::PromptManager;
pub use template::PromptTemplate;
