pub mod color;
pub mod message;
pub mod params;

// Re-export commonly used types at the model level.
pub use color::{Color, HexColor};
pub use message::{ConversationMessage, MessageId, Sender};
pub use params::{
    AnimationParams, ColorScheme, LightingParams, MaterialParams, PatternKind, PatternMovement,
    PatternParams, VisualParameters,
};
