//! Single source of truth for event names emitted to front ends.

pub const CHAT_TOKEN: &str = "chat:token";
pub const CHAT_THINKING: &str = "chat:thinking";
pub const CHAT_COMPLETE: &str = "chat:complete";
pub const CHAT_ERROR: &str = "chat:error";
pub const SCENE_UPDATED: &str = "scene:updated";
pub const MESSAGE_APPENDED: &str = "store:message";
pub const IN_PROGRESS_CHANGED: &str = "store:in_progress";
