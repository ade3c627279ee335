//! Wire protocol shared by the preview hub and every preview surface.
//!
//! Three logical channels exist per editor session:
//! - `navigation`: coordinator ↔ all surfaces (URLs to display, project switches)
//! - `relay`: content requests/responses and forwarded surface events
//! - `broadcast_out`: editor-originated events pushed toward surfaces
//!
//! Every frame on the wire is `{"channel": ..., "tabID"?: ..., "message": {"type": ...}}`.
//! The optional `tabID` on the frame scopes delivery to one surface.

pub mod content;
pub mod error;
pub mod frame;
pub mod message;

pub use content::{Contents, PreviewRequest, PreviewResponse};
pub use error::DecodeError;
pub use frame::{
    ChannelKind, Decoded, Frame, InboundFrame, InboundMessage, decode_frame, decode_message,
};
pub use message::{
    ConsoleLevel, Direction, EditorEvent, ForwardedEvent, MessageKind, NavigationMessage,
    RelayMessage, SurfaceEvent,
};
