//! Routes freshly generated images to Telegram chats.
//!
//! A marker in the saved file's name (`-lora <name>`) selects a destination
//! from a user-edited `key:chat_id` table. The image is downscaled for
//! Telegram's inline photo path and uploaded in the background.

pub mod config;
pub mod handler;
pub mod imaging;
pub mod routing;
pub mod telegram;
pub mod watcher;

pub use config::{Config, SenderSettings};
pub use handler::{on_image_saved, SavedImage};
