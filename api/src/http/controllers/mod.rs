pub mod chat;

pub use chat as ChatController;
