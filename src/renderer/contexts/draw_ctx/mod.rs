//! Responsibilities:
//! - Accumulate validated draws against one scene contract
//! - Replay them into a command buffer inside a render pass of that contract

pub mod draw_list;

pub use draw_list::{DrawCall, DrawItem, DrawList};
