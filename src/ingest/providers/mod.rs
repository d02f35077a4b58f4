pub mod bot_api;
pub mod replay;
