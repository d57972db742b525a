//! Google Workspace backends: the knowledge document and the chat log sheet

mod auth;
mod docs;
mod sheets;

pub use auth::{GoogleAuth, SCOPE_DOCS_READONLY};
pub use docs::GoogleDocsSource;
pub use sheets::GoogleSheetsLog;
