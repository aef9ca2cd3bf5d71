mod conversation;
mod error;
mod history;
mod paths;
mod storage;

pub use conversation::{
    export_file_name, export_json, Conversation, ConversationEvent, SessionTotals,
    FAILED_RESPONSE_TEXT,
};
pub use error::ConversationStoreError;
pub use history::{HistoryStore, HISTORY_STORAGE_KEY, HISTORY_WINDOW};
pub use paths::{storage_file_name, storage_root, STORAGE_DIR};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
