// State management module
// Handles SQLite persistence, stored payloads and file system operations

pub mod db;
pub mod payload;
pub mod storage;
pub mod store;

pub use db::{init_db, open_db, open_in_memory, DbConnection, DbError, DbResult};
pub use payload::{
    create_stored_payload, create_stored_project_payload, deserialize_project,
    parse_stored_payload, LoopDraft, StoredPayload, PAYLOAD_VERSION,
};
pub use storage::{calculate_sha256, get_app_data_dir, get_exports_dir, write_file_atomic, StorageError};
pub use store::{
    delete_project, list_projects, load_project, save_project, LoopDraftStore, PayloadStore,
    ProjectStore, StoredEntry,
};
