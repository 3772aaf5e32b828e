//! Core of the twin chat widget: the conversation state machine, the chat
//! transport, the PDF upload pipeline and the ephemeral document cache. The
//! iced front end in `main.rs` only projects this state.

pub mod chat_api;
pub mod config;
pub mod conversation;
pub mod documents;
pub mod logging;
pub mod markdown;
pub mod toast;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;
