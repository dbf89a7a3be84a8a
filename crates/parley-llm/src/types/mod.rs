//! Vendor-neutral request/response representation
//!
//! Every adapter converts these types to and from its own wire format.

pub mod message;
pub mod options;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{FunctionCall, Message, Part, Role, ToolCall};
pub use options::{DebugSink, EmulationMode, Options, StreamCallback, VendorExtras};
pub use request::{Request, RequestBuilder};
pub use response::{ChatResponse, FinishReason, Usage, WARNING_TOOLS_EMULATED};
pub use stream::{StreamEvent, ToolCallDelta};
pub use tool::{Tool, ToolChoice};
