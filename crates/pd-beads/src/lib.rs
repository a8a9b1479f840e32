//! Issue-tracker collaborator client — wraps the `bd` CLI behind the
//! `IssueStore` contract the engine consumes.

pub mod command;
pub mod error;
pub mod store;
pub mod types;

pub use command::{BeadsCli, BeadsOutput};
pub use error::BeadsError;
pub use store::{create_args, BeadsStore, CreateIssue, IssueStore};
pub use types::{parse_comments_json, parse_created_issue_id, parse_show_json, IssueSnapshot};
