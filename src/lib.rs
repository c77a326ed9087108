pub mod clock;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod instance;
pub mod logging;
pub mod machine;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

pub use error::WorkflowError;
pub use machine::{ProposedAction, RoleResolver, evaluate};
pub use service::{ActionOutcome, DocumentView, WorkflowService};
pub use types::{Action, DocumentState, TimeStamp};
