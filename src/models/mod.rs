pub mod adk;
pub mod chat;
