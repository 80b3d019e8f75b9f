pub mod history;
pub mod payload;
pub mod prompts;
pub mod sections;
