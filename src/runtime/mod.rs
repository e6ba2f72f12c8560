pub mod context;
pub mod frontend;
pub mod r#loop;
pub mod mode;

pub use context::RuntimeContext;
pub use frontend::{FrontendAdapter, ScrollAction, UserInputEvent};
pub use mode::RuntimeMode;
pub use r#loop::Runtime;
